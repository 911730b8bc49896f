use async_trait::async_trait;
use callscribe_core::SessionError;

/// One message read from the duplex socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Peer close frame with its status code, if one was given.
    Close(Option<u16>),
}

/// Duplex connection a session reads frames from.
#[async_trait]
pub trait Transport: Send {
    /// Next frame. `None` means the connection ended without a close frame.
    async fn recv(&mut self) -> Option<Result<Frame, SessionError>>;

    /// Send a close frame to the peer.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), SessionError>;
}
