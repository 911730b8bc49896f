use serde::{Deserialize, Serialize};
use std::fmt;

// ── Inbound stream protocol ───────────────────────────────────

/// One inbound frame of the media stream protocol, tagged by `"event"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    Start {
        #[serde(default, rename = "streamSid")]
        stream_sid: Option<String>,
        #[serde(default)]
        start: Option<StartMetadata>,
    },
    Media {
        media: MediaPayload,
    },
    Stop {
        #[serde(default, rename = "streamSid")]
        stream_sid: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Stream SID announced by a `start` event, top-level field first.
    pub fn stream_sid(&self) -> Option<&str> {
        match self {
            StreamEvent::Start { stream_sid, start } => stream_sid
                .as_deref()
                .or_else(|| start.as_ref().and_then(|s| s.stream_sid.as_deref())),
            StreamEvent::Stop { stream_sid } => stream_sid.as_deref(),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Start { .. } => "start",
            StreamEvent::Media { .. } => "media",
            StreamEvent::Stop { .. } => "stop",
            StreamEvent::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    #[serde(default)]
    pub stream_sid: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaPayload {
    /// Base64 text of 8 kHz mu-law bytes.
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

// ── Transcripts ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub conf: f64,
}

/// A recognition result. Partials supersede each other within one utterance;
/// a final closes the utterance and is never revised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transcript {
    Partial {
        text: String,
    },
    Final {
        text: String,
        words: Vec<WordTiming>,
    },
}

impl Transcript {
    pub fn text(&self) -> &str {
        match self {
            Transcript::Partial { text } | Transcript::Final { text, .. } => text,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Transcript::Final { .. })
    }
}

/// A transcript handed to the consumers, tagged with its session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEvent {
    pub session_id: String,
    pub stream_sid: Option<String>,
    pub transcript: Transcript,
    /// Seconds of call audio received when the transcript was produced.
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
pub struct TranscriptMetadata {
    pub session_id: String,
    pub stream_sid: Option<String>,
    pub prefix: String,
}

// ── Session lifecycle ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Closing,
    Closed,
}

impl SessionState {
    /// States only move forward: Idle → Streaming → Closing → Closed.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        (next as u8) > (self as u8)
    }

    pub fn is_open(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Streaming)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The stream announced its end with a `stop` event.
    StreamStopped,
    /// The peer sent a close frame.
    PeerClosed,
    /// The socket ended without a close frame.
    PeerGone,
    /// The process is shutting down.
    Shutdown,
    /// The connection failed.
    TransportFailed,
}

impl CloseReason {
    /// WebSocket close code sent back to the peer.
    pub fn close_code(self) -> u16 {
        match self {
            CloseReason::StreamStopped | CloseReason::PeerClosed | CloseReason::PeerGone => 1000,
            CloseReason::Shutdown => 1001,
            CloseReason::TransportFailed => 1011,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::StreamStopped => "stream stopped",
            CloseReason::PeerClosed => "peer closed",
            CloseReason::PeerGone => "peer gone",
            CloseReason::Shutdown => "server shutdown",
            CloseReason::TransportFailed => "transport failed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
