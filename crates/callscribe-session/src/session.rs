use crate::dispatcher::{Dispatcher, FrameStats};
use crate::transport::{Frame, Transport};
use callscribe_core::{CloseReason, SessionConfig};
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of one finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub session_id: String,
    pub stream_sid: Option<String>,
    pub close_reason: CloseReason,
    /// Whether a close frame was sent to the peer.
    pub close_sent: bool,
    /// Whether the peer confirmed a close we initiated.
    pub acknowledged: bool,
    pub stats: FrameStats,
}

/// Drives one connection: receives frames, hands text frames to the
/// [`Dispatcher`], and performs the close handshake.
pub struct Session<T: Transport> {
    transport: T,
    dispatcher: Dispatcher,
    shutdown: watch::Receiver<bool>,
    close_timeout: Duration,
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: T,
        dispatcher: Dispatcher,
        shutdown: watch::Receiver<bool>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            shutdown,
            close_timeout: Duration::from_millis(config.close_timeout_ms),
        }
    }

    pub async fn run(mut self) -> SessionReport {
        let session_id = self.dispatcher.session_id().to_string();
        tracing::info!(session_id = %session_id, "session opened");

        let reason = self.receive_loop().await;
        let (close_sent, acknowledged) = self.close_handshake(reason).await;
        self.dispatcher.finish();

        let report = SessionReport {
            session_id,
            stream_sid: self.dispatcher.stream_sid().map(str::to_owned),
            close_reason: reason,
            close_sent,
            acknowledged,
            stats: self.dispatcher.stats(),
        };
        tracing::info!(
            session_id = %report.session_id,
            reason = %report.close_reason,
            media = report.stats.media,
            skipped = report.stats.skipped,
            finals = report.stats.finals,
            "session closed"
        );
        report
    }

    /// Receive until a close condition is observed; returns the recorded reason.
    async fn receive_loop(&mut self) -> CloseReason {
        loop {
            if let Some(reason) = self.dispatcher.close_reason() {
                return reason;
            }

            // shutdown is polled first so a simultaneous peer close never wins
            let frame = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => {
                    self.dispatcher.begin_close(CloseReason::Shutdown);
                    continue;
                }
                frame = self.transport.recv() => frame,
            };

            match frame {
                Some(Ok(Frame::Text(text))) => {
                    if let Err(e) = self.dispatcher.dispatch(&text) {
                        tracing::warn!(
                            session_id = %self.dispatcher.session_id(),
                            "skipping frame: {e}"
                        );
                    }
                }
                Some(Ok(Frame::Close(code))) => {
                    tracing::debug!(
                        session_id = %self.dispatcher.session_id(),
                        code = ?code,
                        "peer sent close"
                    );
                    self.dispatcher.begin_close(CloseReason::PeerClosed);
                }
                Some(Ok(Frame::Binary(data))) => {
                    tracing::debug!(
                        session_id = %self.dispatcher.session_id(),
                        len = data.len(),
                        "binary frame ignored"
                    );
                }
                Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => {}
                Some(Err(e)) => {
                    tracing::error!(
                        session_id = %self.dispatcher.session_id(),
                        "transport failed: {e}"
                    );
                    self.dispatcher.begin_close(CloseReason::TransportFailed);
                }
                None => {
                    self.dispatcher.begin_close(CloseReason::PeerGone);
                }
            }
        }
    }

    /// Send the single close frame and, when we initiated the close, wait
    /// for the peer's acknowledgement. Both steps share one `close_timeout`
    /// budget. Returns `(close_sent, acknowledged)`.
    async fn close_handshake(&mut self, reason: CloseReason) -> (bool, bool) {
        if matches!(reason, CloseReason::TransportFailed | CloseReason::PeerGone) {
            return (false, false);
        }

        let deadline = tokio::time::Instant::now() + self.close_timeout;
        // a later shutdown cuts the handshake short, unless it is why we are closing
        let watch_shutdown = reason != CloseReason::Shutdown;

        let sent = tokio::select! {
            biased;
            sent = tokio::time::timeout_at(
                deadline,
                self.transport.close(reason.close_code(), reason.as_str()),
            ) => sent.ok(),
            _ = shutdown_requested(&mut self.shutdown), if watch_shutdown => None,
        };
        match sent {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::warn!(
                    session_id = %self.dispatcher.session_id(),
                    "failed to send close frame: {e}"
                );
                return (false, false);
            }
            None => {
                tracing::warn!(
                    session_id = %self.dispatcher.session_id(),
                    "close frame not sent before the deadline"
                );
                return (false, false);
            }
        }

        if reason == CloseReason::PeerClosed {
            return (true, false);
        }

        let acknowledged = tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown), if watch_shutdown => false,
            ack = tokio::time::timeout_at(deadline, wait_for_close(&mut self.transport)) => {
                ack.unwrap_or(false)
            }
        };
        if !acknowledged {
            tracing::debug!(
                session_id = %self.dispatcher.session_id(),
                "close not acknowledged"
            );
        }
        (true, acknowledged)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

/// Drain the peer until its close frame arrives. Text still in flight is
/// discarded.
async fn wait_for_close<T: Transport>(transport: &mut T) -> bool {
    loop {
        match transport.recv().await {
            Some(Ok(Frame::Close(_))) => return true,
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return false,
        }
    }
}

/// Resolves once the shutdown flag is set. Never resolves if the sender is
/// gone without having set it.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|&stop| stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
