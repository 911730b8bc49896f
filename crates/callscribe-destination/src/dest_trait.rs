use async_trait::async_trait;
use callscribe_core::{DestinationError, TranscriptEvent, TranscriptMetadata};

/// Consumer of transcripts from every session, fed by the
/// [`DestinationHost`](crate::DestinationHost) for each route it sits on.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Plugin name as written in `[[routes]]`.
    fn name(&self) -> &str;

    /// Called once with the route's merged TOML table before any transcript.
    async fn initialize(&mut self, config: toml::Value) -> Result<(), DestinationError>;

    /// `metadata.prefix` is per route; the event is shared across routes.
    async fn send_transcript(
        &self,
        event: &TranscriptEvent,
        metadata: &TranscriptMetadata,
    ) -> Result<(), DestinationError>;

    fn is_healthy(&self) -> bool {
        true
    }

    /// Runs after the last transcript has been delivered.
    async fn shutdown(&self) -> Result<(), DestinationError> {
        Ok(())
    }
}
