use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    /// The chunk would expand past the reserved PCM buffer.
    #[error("input chunk of {input} bytes needs {needed} output samples, buffer holds {capacity}")]
    BufferOverflow {
        input: usize,
        needed: usize,
        capacity: usize,
    },
}

#[derive(Debug, Error)]
pub enum AsrError {
    #[error("ASR initialization failed: {0}")]
    InitializationFailed(String),

    #[error("ASR processing failed: {0}")]
    ProcessingFailed(String),

    #[error("ASR engine not found: {0}")]
    EngineNotFound(String),

    #[error("failed to decode recognizer result: {0}")]
    ResultDecode(String),
}

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("destination initialization failed: {0}")]
    InitializationFailed(String),

    #[error("failed to send transcript: {0}")]
    SendFailed(String),

    #[error("destination not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// A frame was not valid JSON or lacked a field its event type needs.
    #[error("protocol decode error: {0}")]
    ProtocolDecode(String),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Asr(#[from] AsrError),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::ProtocolDecode(err.to_string())
    }
}
