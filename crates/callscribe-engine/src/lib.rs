pub mod adapter;
pub mod null_engine;
pub mod recognizer;
pub mod registry;
#[cfg(feature = "vosk")]
pub mod vosk_engine;

pub use adapter::RecognizerAdapter;
pub use null_engine::NullRecognizer;
pub use recognizer::Recognizer;
pub use registry::RecognizerRegistry;
#[cfg(feature = "vosk")]
pub use vosk_engine::VoskRecognizer;
