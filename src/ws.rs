use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use callscribe_core::SessionError;
use callscribe_session::{Frame, Transport};

/// [`Transport`] over an upgraded axum WebSocket. Pings are answered by the
/// WebSocket layer itself.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<Frame, SessionError>> {
        let msg = self.socket.recv().await?;
        Some(match msg {
            Ok(Message::Text(text)) => Ok(Frame::Text(text.as_str().to_owned())),
            Ok(Message::Binary(data)) => Ok(Frame::Binary(data.to_vec())),
            Ok(Message::Ping(data)) => Ok(Frame::Ping(data.to_vec())),
            Ok(Message::Pong(data)) => Ok(Frame::Pong(data.to_vec())),
            Ok(Message::Close(frame)) => Ok(Frame::Close(frame.map(|f| f.code))),
            Err(e) => Err(SessionError::Transport(e.to_string())),
        })
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), SessionError> {
        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        self.socket
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }
}
