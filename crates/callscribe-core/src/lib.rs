pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AppConfig, AsrConfig, AudioConfig, DestinationRouteConfig, NullEngineConfig, ServerConfig,
    SessionConfig, VoskConfig,
};
pub use error::{AsrError, AudioError, ConfigError, DestinationError, SessionError};
pub use types::{
    CloseReason, MediaFormat, MediaPayload, SessionState, StartMetadata, StreamEvent, Transcript,
    TranscriptEvent, TranscriptMetadata, WordTiming,
};
