use crate::adapter::RecognizerAdapter;
use crate::recognizer::Recognizer;
use callscribe_core::AsrError;
use std::collections::HashMap;

pub struct RecognizerRegistry {
    factories: HashMap<String, fn() -> Box<dyn Recognizer>>,
}

impl RecognizerRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("null", || Box::new(crate::null_engine::NullRecognizer::new()));
        #[cfg(feature = "vosk")]
        registry.register("vosk", || Box::new(crate::vosk_engine::VoskRecognizer::new()));
        registry
    }

    pub fn register(&mut self, name: &str, factory: fn() -> Box<dyn Recognizer>) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Recognizer>, AsrError> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| AsrError::EngineNotFound(name.to_string()))
    }

    /// Create and initialize a per-session engine behind an adapter.
    pub fn build(
        &self,
        name: &str,
        config: toml::Value,
        sample_rate: u32,
    ) -> Result<RecognizerAdapter, AsrError> {
        let mut engine = self.create(name)?;
        engine.initialize(config, sample_rate)?;
        Ok(RecognizerAdapter::new(engine))
    }

    pub fn list_engines(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for RecognizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
