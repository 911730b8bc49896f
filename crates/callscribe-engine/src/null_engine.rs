use crate::recognizer::Recognizer;
use callscribe_core::{AsrError, NullEngineConfig};
use serde_json::json;

const DEFAULT_SILENCE_MS: u32 = 500;
const DEFAULT_SILENCE_THRESHOLD: i16 = 64;

/// Stand-in engine that recognizes no words. It reports how much audio the
/// current utterance holds and ends the utterance after a run of silence
/// that follows some voiced audio.
pub struct NullRecognizer {
    silence_samples: usize,
    silence_threshold: i16,
    utterance_samples: usize,
    silent_run: usize,
    heard_voice: bool,
    completed: Option<usize>,
    feed_count: usize,
}

impl NullRecognizer {
    pub fn new() -> Self {
        Self {
            silence_samples: 16 * DEFAULT_SILENCE_MS as usize,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            utterance_samples: 0,
            silent_run: 0,
            heard_voice: false,
            completed: None,
            feed_count: 0,
        }
    }

    pub fn feed_count(&self) -> usize {
        self.feed_count
    }

    fn describe(samples: usize) -> String {
        if samples == 0 {
            String::new()
        } else {
            format!("[null] {samples} samples")
        }
    }

    fn clear_utterance(&mut self) {
        self.utterance_samples = 0;
        self.silent_run = 0;
        self.heard_voice = false;
    }
}

impl Default for NullRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for NullRecognizer {
    fn name(&self) -> &str {
        "null"
    }

    fn initialize(&mut self, config: toml::Value, sample_rate: u32) -> Result<(), AsrError> {
        let config: NullEngineConfig = config
            .try_into()
            .map_err(|e| AsrError::InitializationFailed(format!("invalid null config: {e}")))?;
        if config.silence_ms == 0 {
            return Err(AsrError::InitializationFailed(
                "silence_ms must be non-zero".to_string(),
            ));
        }

        self.silence_samples = (sample_rate as u64 * config.silence_ms as u64 / 1000) as usize;
        self.silence_threshold = config.silence_threshold.max(0);
        tracing::debug!(
            silence_ms = config.silence_ms,
            threshold = self.silence_threshold,
            "NullRecognizer initialized"
        );
        Ok(())
    }

    fn accept_waveform(&mut self, samples: &[i16]) -> Result<bool, AsrError> {
        self.feed_count += 1;
        self.utterance_samples += samples.len();

        for &s in samples {
            if s.unsigned_abs() > self.silence_threshold as u16 {
                self.heard_voice = true;
                self.silent_run = 0;
            } else {
                self.silent_run += 1;
            }
        }

        if self.heard_voice && self.silent_run >= self.silence_samples {
            self.completed = Some(self.utterance_samples);
            self.clear_utterance();
            return Ok(true);
        }
        Ok(false)
    }

    fn result(&mut self) -> String {
        let samples = self.completed.take().unwrap_or(0);
        json!({ "text": Self::describe(samples), "result": [] }).to_string()
    }

    fn partial_result(&mut self) -> String {
        json!({ "partial": Self::describe(self.utterance_samples) }).to_string()
    }

    fn final_result(&mut self) -> String {
        let samples = if self.heard_voice { self.utterance_samples } else { 0 };
        self.clear_utterance();
        json!({ "text": Self::describe(samples), "result": [] }).to_string()
    }

    fn reset(&mut self) {
        self.clear_utterance();
        self.completed = None;
    }
}
