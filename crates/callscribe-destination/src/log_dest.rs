use crate::dest_trait::Destination;
use async_trait::async_trait;
use callscribe_core::{DestinationError, TranscriptEvent, TranscriptMetadata};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Writes transcripts to the application log under the `transcript` target.
pub struct LogDestination {
    send_count: AtomicUsize,
}

impl LogDestination {
    pub fn new() -> Self {
        Self {
            send_count: AtomicUsize::new(0),
        }
    }

    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::Relaxed)
    }
}

impl Default for LogDestination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Destination for LogDestination {
    fn name(&self) -> &str {
        "log"
    }

    async fn initialize(&mut self, _config: toml::Value) -> Result<(), DestinationError> {
        Ok(())
    }

    async fn send_transcript(
        &self,
        event: &TranscriptEvent,
        metadata: &TranscriptMetadata,
    ) -> Result<(), DestinationError> {
        tracing::info!(
            target: "transcript",
            session_id = %metadata.session_id,
            stream_sid = metadata.stream_sid.as_deref().unwrap_or("-"),
            is_final = event.transcript.is_final(),
            at = event.timestamp,
            "{}{}",
            metadata.prefix,
            event.transcript.text()
        );
        self.send_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
