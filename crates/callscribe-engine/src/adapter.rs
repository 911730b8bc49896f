use crate::recognizer::Recognizer;
use callscribe_core::{AsrError, Transcript, WordTiming};
use serde::Deserialize;

#[derive(Deserialize)]
struct RawFinal {
    text: String,
    #[serde(default)]
    result: Vec<WordTiming>,
}

#[derive(Deserialize)]
struct RawPartial {
    partial: String,
}

/// Narrow boundary between a [`Recognizer`] and the session: feeds PCM and
/// decodes the engine's result encoding into [`Transcript`]s.
pub struct RecognizerAdapter {
    engine: Box<dyn Recognizer>,
    samples_accepted: u64,
    utterances: u64,
}

impl RecognizerAdapter {
    pub fn new(engine: Box<dyn Recognizer>) -> Self {
        Self {
            engine,
            samples_accepted: 0,
            utterances: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// Feed PCM; `true` means the utterance is complete and
    /// [`fetch_final`](Self::fetch_final) should be called next.
    pub fn accept(&mut self, pcm: &[i16]) -> Result<bool, AsrError> {
        let completed = self.engine.accept_waveform(pcm)?;
        self.samples_accepted += pcm.len() as u64;
        Ok(completed)
    }

    pub fn fetch_final(&mut self) -> Result<Transcript, AsrError> {
        let raw = self.engine.result();
        self.utterances += 1;
        decode_final(&raw)
    }

    pub fn fetch_partial(&mut self) -> Result<Transcript, AsrError> {
        let raw = self.engine.partial_result();
        let partial: RawPartial = serde_json::from_str(&raw)
            .map_err(|e| AsrError::ResultDecode(format!("{e}: {raw}")))?;
        Ok(Transcript::Partial {
            text: partial.partial,
        })
    }

    /// End the utterance in progress. `None` when nothing was recognized.
    pub fn flush(&mut self) -> Result<Option<Transcript>, AsrError> {
        let raw = self.engine.final_result();
        let transcript = decode_final(&raw)?;
        if transcript.text().is_empty() {
            return Ok(None);
        }
        self.utterances += 1;
        Ok(Some(transcript))
    }

    pub fn samples_accepted(&self) -> u64 {
        self.samples_accepted
    }

    pub fn utterances(&self) -> u64 {
        self.utterances
    }
}

fn decode_final(raw: &str) -> Result<Transcript, AsrError> {
    let result: RawFinal =
        serde_json::from_str(raw).map_err(|e| AsrError::ResultDecode(format!("{e}: {raw}")))?;
    Ok(Transcript::Final {
        text: result.text,
        words: result.result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays canned engine output.
    struct Scripted {
        complete_after: usize,
        calls: usize,
        final_json: String,
        partial_json: String,
        flush_json: String,
    }

    impl Scripted {
        fn new(final_json: &str, partial_json: &str) -> Self {
            Self {
                complete_after: usize::MAX,
                calls: 0,
                final_json: final_json.to_string(),
                partial_json: partial_json.to_string(),
                flush_json: r#"{"text": ""}"#.to_string(),
            }
        }
    }

    impl Recognizer for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn initialize(&mut self, _config: toml::Value, _sample_rate: u32) -> Result<(), AsrError> {
            Ok(())
        }

        fn accept_waveform(&mut self, samples: &[i16]) -> Result<bool, AsrError> {
            if samples.is_empty() {
                return Err(AsrError::ProcessingFailed("empty".to_string()));
            }
            self.calls += 1;
            Ok(self.calls >= self.complete_after)
        }

        fn result(&mut self) -> String {
            self.final_json.clone()
        }

        fn partial_result(&mut self) -> String {
            self.partial_json.clone()
        }

        fn final_result(&mut self) -> String {
            self.flush_json.clone()
        }

        fn reset(&mut self) {
            self.calls = 0;
        }
    }

    #[test]
    fn test_final_with_word_timings() {
        let engine = Scripted::new(
            r#"{"result":[{"conf":0.9,"end":0.6,"start":0.2,"word":"hello"},{"conf":1.0,"end":1.1,"start":0.7,"word":"there"}],"text":"hello there"}"#,
            r#"{"partial": ""}"#,
        );
        let mut adapter = RecognizerAdapter::new(Box::new(engine));
        let transcript = adapter.fetch_final().unwrap();
        match transcript {
            Transcript::Final { text, words } => {
                assert_eq!(text, "hello there");
                assert_eq!(words.len(), 2);
                assert_eq!(words[0].word, "hello");
                assert_eq!(words[1].start, 0.7);
                assert_eq!(words[1].conf, 1.0);
            }
            other => panic!("expected final, got {other:?}"),
        }
        assert_eq!(adapter.utterances(), 1);
    }

    #[test]
    fn test_final_without_word_timings() {
        let engine = Scripted::new(r#"{"text":"yes"}"#, r#"{"partial": ""}"#);
        let mut adapter = RecognizerAdapter::new(Box::new(engine));
        assert_eq!(
            adapter.fetch_final().unwrap(),
            Transcript::Final {
                text: "yes".to_string(),
                words: Vec::new(),
            }
        );
    }

    #[test]
    fn test_partial_decoded() {
        let engine = Scripted::new(r#"{"text":""}"#, r#"{"partial" : "good mor"}"#);
        let mut adapter = RecognizerAdapter::new(Box::new(engine));
        assert_eq!(
            adapter.fetch_partial().unwrap(),
            Transcript::Partial {
                text: "good mor".to_string(),
            }
        );
    }

    #[test]
    fn test_garbled_final_is_decode_error() {
        let engine = Scripted::new("not json", r#"{"partial": ""}"#);
        let mut adapter = RecognizerAdapter::new(Box::new(engine));
        match adapter.fetch_final() {
            Err(AsrError::ResultDecode(msg)) => assert!(msg.contains("not json")),
            other => panic!("expected ResultDecode, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_missing_field_is_decode_error() {
        let engine = Scripted::new(r#"{"text":""}"#, r#"{"text": "wrong shape"}"#);
        let mut adapter = RecognizerAdapter::new(Box::new(engine));
        assert!(matches!(adapter.fetch_partial(), Err(AsrError::ResultDecode(_))));
    }

    #[test]
    fn test_accept_counts_samples_and_reports_completion() {
        let mut engine = Scripted::new(r#"{"text":""}"#, r#"{"partial": ""}"#);
        engine.complete_after = 2;
        let mut adapter = RecognizerAdapter::new(Box::new(engine));
        assert!(!adapter.accept(&[0; 320]).unwrap());
        assert!(adapter.accept(&[0; 320]).unwrap());
        assert_eq!(adapter.samples_accepted(), 640);
    }

    #[test]
    fn test_accept_error_does_not_count_samples() {
        let engine = Scripted::new(r#"{"text":""}"#, r#"{"partial": ""}"#);
        let mut adapter = RecognizerAdapter::new(Box::new(engine));
        assert!(adapter.accept(&[]).is_err());
        assert_eq!(adapter.samples_accepted(), 0);
    }

    #[test]
    fn test_flush_empty_text_is_none() {
        let engine = Scripted::new(r#"{"text":""}"#, r#"{"partial": ""}"#);
        let mut adapter = RecognizerAdapter::new(Box::new(engine));
        assert_eq!(adapter.flush().unwrap(), None);
        assert_eq!(adapter.utterances(), 0);
    }

    #[test]
    fn test_flush_returns_pending_final() {
        let mut engine = Scripted::new(r#"{"text":""}"#, r#"{"partial": ""}"#);
        engine.flush_json = r#"{"text":"goodbye"}"#.to_string();
        let mut adapter = RecognizerAdapter::new(Box::new(engine));
        let flushed = adapter.flush().unwrap().unwrap();
        assert_eq!(flushed.text(), "goodbye");
        assert!(flushed.is_final());
        assert_eq!(adapter.utterances(), 1);
    }
}
