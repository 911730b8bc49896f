use crate::recognizer::Recognizer;
use callscribe_core::{AsrError, VoskConfig};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use vosk::{CompleteResult, DecodingState, Model};

/// Loaded models, shared read-only by every session that uses the same path.
static MODELS: OnceLock<Mutex<HashMap<String, Arc<Model>>>> = OnceLock::new();

fn load_model(path: &str) -> Result<Arc<Model>, AsrError> {
    let cache = MODELS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache
        .lock()
        .map_err(|_| AsrError::InitializationFailed("vosk model cache poisoned".to_string()))?;
    if let Some(model) = cache.get(path) {
        return Ok(Arc::clone(model));
    }
    let model = Model::new(path).ok_or_else(|| {
        AsrError::InitializationFailed(format!("failed to load vosk model from {path}"))
    })?;
    tracing::info!(model_path = %path, "vosk model loaded");
    let model = Arc::new(model);
    cache.insert(path.to_string(), Arc::clone(&model));
    Ok(model)
}

pub struct VoskRecognizer {
    // declared before `_model` so the recognizer is dropped first
    recognizer: Option<vosk::Recognizer>,
    _model: Option<Arc<Model>>,
}

impl VoskRecognizer {
    pub fn new() -> Self {
        Self {
            recognizer: None,
            _model: None,
        }
    }

    fn complete_json(result: CompleteResult<'_>) -> String {
        match result.single() {
            Some(single) => {
                let words: Vec<_> = single
                    .result
                    .iter()
                    .map(|w| json!({ "word": w.word, "start": w.start, "end": w.end, "conf": w.conf }))
                    .collect();
                json!({ "text": single.text, "result": words }).to_string()
            }
            None => json!({ "text": "" }).to_string(),
        }
    }
}

impl Default for VoskRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for VoskRecognizer {
    fn name(&self) -> &str {
        "vosk"
    }

    fn initialize(&mut self, config: toml::Value, sample_rate: u32) -> Result<(), AsrError> {
        let config: VoskConfig = config.try_into().map_err(|e| {
            AsrError::InitializationFailed(format!("missing or invalid 'model_path': {e}"))
        })?;
        let model = load_model(&config.model_path)?;
        let mut recognizer = vosk::Recognizer::new(&model, sample_rate as f32).ok_or_else(|| {
            AsrError::InitializationFailed("failed to create vosk recognizer".to_string())
        })?;
        recognizer.set_words(config.words);

        self.recognizer = Some(recognizer);
        self._model = Some(model);
        Ok(())
    }

    fn accept_waveform(&mut self, samples: &[i16]) -> Result<bool, AsrError> {
        let recognizer = self
            .recognizer
            .as_mut()
            .ok_or_else(|| AsrError::ProcessingFailed("not initialized".to_string()))?;
        match recognizer.accept_waveform(samples) {
            Ok(DecodingState::Finalized) => Ok(true),
            Ok(DecodingState::Running) => Ok(false),
            Ok(DecodingState::Failed) => {
                Err(AsrError::ProcessingFailed("vosk decoding failed".to_string()))
            }
            Err(e) => Err(AsrError::ProcessingFailed(e.to_string())),
        }
    }

    fn result(&mut self) -> String {
        match self.recognizer.as_mut() {
            Some(r) => Self::complete_json(r.result()),
            None => json!({ "text": "" }).to_string(),
        }
    }

    fn partial_result(&mut self) -> String {
        match self.recognizer.as_mut() {
            Some(r) => json!({ "partial": r.partial_result().partial }).to_string(),
            None => json!({ "partial": "" }).to_string(),
        }
    }

    fn final_result(&mut self) -> String {
        match self.recognizer.as_mut() {
            Some(r) => Self::complete_json(r.final_result()),
            None => json!({ "text": "" }).to_string(),
        }
    }

    fn reset(&mut self) {
        if let Some(r) = self.recognizer.as_mut() {
            r.reset();
        }
    }
}
