use crate::dest_trait::Destination;
use async_trait::async_trait;
use callscribe_core::{DestinationError, TranscriptEvent, TranscriptMetadata};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Line layout of the transcript file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `{prefix}{text}` per line.
    Text,
    /// One serialized [`TranscriptEvent`] per line.
    Jsonl,
}

impl FileFormat {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(FileFormat::Text),
            "jsonl" => Some(FileFormat::Jsonl),
            _ => None,
        }
    }
}

pub struct FileDestination {
    output_path: Option<PathBuf>,
    format: FileFormat,
    send_count: AtomicUsize,
}

impl FileDestination {
    pub fn new() -> Self {
        Self {
            output_path: None,
            format: FileFormat::Text,
            send_count: AtomicUsize::new(0),
        }
    }

    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::Relaxed)
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    fn render(
        &self,
        event: &TranscriptEvent,
        metadata: &TranscriptMetadata,
    ) -> Result<String, DestinationError> {
        match self.format {
            FileFormat::Text => Ok(format!("{}{}", metadata.prefix, event.transcript.text())),
            FileFormat::Jsonl => serde_json::to_string(event)
                .map_err(|e| DestinationError::SendFailed(e.to_string())),
        }
    }
}

impl Default for FileDestination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Destination for FileDestination {
    fn name(&self) -> &str {
        "file"
    }

    async fn initialize(&mut self, config: toml::Value) -> Result<(), DestinationError> {
        let path = config
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DestinationError::InitializationFailed("missing 'path' in config".to_string())
            })?;
        if let Some(format) = config.get("format").and_then(|v| v.as_str()) {
            self.format = FileFormat::parse(format).ok_or_else(|| {
                DestinationError::InitializationFailed(format!(
                    "unknown format '{format}', expected 'text' or 'jsonl'"
                ))
            })?;
        }
        self.output_path = Some(PathBuf::from(path));
        Ok(())
    }

    async fn send_transcript(
        &self,
        event: &TranscriptEvent,
        metadata: &TranscriptMetadata,
    ) -> Result<(), DestinationError> {
        let path = self
            .output_path
            .as_ref()
            .ok_or_else(|| DestinationError::SendFailed("not initialized".to_string()))?;
        let line = self.render(event, metadata)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DestinationError::SendFailed(e.to_string()))?;

        writeln!(file, "{line}").map_err(|e| DestinationError::SendFailed(e.to_string()))?;

        self.send_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.output_path.is_some()
    }

    async fn shutdown(&self) -> Result<(), DestinationError> {
        Ok(())
    }
}
