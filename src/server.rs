use crate::ws::WsTransport;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use callscribe_audio::{Transcoder, OUTPUT_SAMPLE_RATE};
use callscribe_core::{AppConfig, CloseReason, TranscriptEvent};
use callscribe_engine::RecognizerRegistry;
use callscribe_session::{Dispatcher, Session, SessionReport, Transport};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engines: Arc<RecognizerRegistry>,
    pub engine_config: Arc<toml::Value>,
    pub transcripts: mpsc::UnboundedSender<TranscriptEvent>,
    pub shutdown: watch::Receiver<bool>,
    pub active_sessions: Arc<AtomicUsize>,
    next_session: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        engines: RecognizerRegistry,
        engine_config: toml::Value,
        transcripts: mpsc::UnboundedSender<TranscriptEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            engines: Arc::new(engines),
            engine_config: Arc::new(engine_config),
            transcripts,
            shutdown,
            active_sessions: Arc::new(AtomicUsize::new(0)),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }
}

/// Counts a live session for as long as it is held.
struct ActiveSession(Arc<AtomicUsize>);

impl ActiveSession {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn router(state: AppState) -> Router {
    let stream_path = state.config.server.stream_path.clone();
    Router::new()
        .route("/", get(index))
        .route("/voice", get(voice).post(voice))
        .route(&stream_path, get(stream_upgrade))
        .with_state(state)
}

async fn index() -> &'static str {
    "Hello World!"
}

/// TwiML telling the telephony provider to open a media stream back to us.
async fn voice(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(host) = resolve_host(state.config.server.public_host.as_deref(), &headers) else {
        tracing::warn!("voice webhook without a usable host");
        return (StatusCode::BAD_REQUEST, "missing Host header").into_response();
    };
    let body = twiml(&host, &state.config.server.stream_path);
    tracing::debug!(host = %host, "answering voice webhook");
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

/// Configured public host first, then the proxy's forwarded host, then `Host`.
fn resolve_host(public_host: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(host) = public_host.filter(|h| !h.is_empty()) {
        return Some(host.to_string());
    }
    ["x-forwarded-host", header::HOST.as_str()]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        // a forwarded list names the client-facing host first
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|host| !host.is_empty())
        .map(str::to_string)
}

fn twiml(host: &str, stream_path: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response><Connect><Stream url=\"wss://{}{}\"/></Connect></Response>",
        xml_escape(host),
        xml_escape(stream_path)
    )
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Shutdown is checked before the upgrade headers so a draining server
/// answers 503 to every stream request.
async fn stream_upgrade(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if *state.shutdown.borrow() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| run_session(socket, state)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn run_session(socket: WebSocket, state: AppState) {
    let _active = ActiveSession::enter(&state.active_sessions);
    let session_id = format!(
        "session-{}",
        state.next_session.fetch_add(1, Ordering::Relaxed)
    );
    serve_transport(WsTransport::new(socket), &state, session_id).await;
}

/// Run one session over `transport`, or refuse it with 1011 when the
/// recognizer cannot be built.
async fn serve_transport<T: Transport>(
    mut transport: T,
    state: &AppState,
    session_id: String,
) -> Option<SessionReport> {
    let recognizer = match state.engines.build(
        &state.config.asr.engine,
        (*state.engine_config).clone(),
        OUTPUT_SAMPLE_RATE,
    ) {
        Ok(recognizer) => recognizer,
        Err(e) => {
            tracing::error!(session_id = %session_id, "failed to start recognizer: {e}");
            let limit = Duration::from_millis(state.config.session.close_timeout_ms);
            refuse(&mut transport, &session_id, limit).await;
            return None;
        }
    };

    let dispatcher = Dispatcher::new(
        session_id,
        Transcoder::from_config(&state.config.audio),
        recognizer,
        state.transcripts.clone(),
    );
    let report = Session::new(
        transport,
        dispatcher,
        state.shutdown.clone(),
        &state.config.session,
    )
    .run()
    .await;
    Some(report)
}

async fn refuse<T: Transport>(transport: &mut T, session_id: &str, limit: Duration) {
    let code = CloseReason::TransportFailed.close_code();
    match tokio::time::timeout(limit, transport.close(code, "recognizer unavailable")).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(session_id = %session_id, "failed to send close frame: {e}");
        }
        Err(_) => {
            tracing::warn!(session_id = %session_id, "close frame not sent before the deadline");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use callscribe_core::SessionError;
    use callscribe_session::Frame;
    use tower::ServiceExt;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    fn test_state(public_host: Option<&str>) -> AppState {
        let mut config = AppConfig::default();
        config.server.public_host = public_host.map(str::to_string);
        state_with(config, false)
    }

    fn state_with(config: AppConfig, shutting_down: bool) -> AppState {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(shutting_down);
        AppState::new(
            Arc::new(config),
            RecognizerRegistry::new(),
            toml::Value::Table(Default::default()),
            tx,
            shutdown_rx,
        )
    }

    /// Peer that sends nothing and records close frames; optionally never
    /// lets a close frame out.
    #[derive(Default)]
    struct RecordingTransport {
        closes: Arc<std::sync::Mutex<Vec<(u16, String)>>>,
        stalled: bool,
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn recv(&mut self) -> Option<Result<Frame, SessionError>> {
            None
        }

        async fn close(&mut self, code: u16, reason: &str) -> Result<(), SessionError> {
            if self.stalled {
                std::future::pending::<()>().await;
            }
            self.closes.lock().unwrap().push((code, reason.to_string()));
            Ok(())
        }
    }

    fn unknown_engine_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.asr.engine = "missing".to_string();
        config
    }

    #[test]
    fn test_twiml_points_at_stream_path() {
        let xml = twiml("abc.ngrok.app", "/stream");
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(
            r#"<Response><Connect><Stream url="wss://abc.ngrok.app/stream"/></Connect></Response>"#
        ));
    }

    #[test]
    fn test_twiml_escapes_host() {
        let xml = twiml("a\"b<c>", "/s");
        assert!(xml.contains("wss://a&quot;b&lt;c&gt;/s"));
    }

    #[test]
    fn test_resolve_host_prefers_public_host() {
        let h = headers(&[("host", "internal:8080")]);
        assert_eq!(
            resolve_host(Some("calls.example.com"), &h).as_deref(),
            Some("calls.example.com")
        );
    }

    #[test]
    fn test_resolve_host_uses_forwarded_host() {
        let h = headers(&[
            ("host", "internal:8080"),
            ("x-forwarded-host", "edge.example.com, proxy.local"),
        ]);
        assert_eq!(resolve_host(None, &h).as_deref(), Some("edge.example.com"));
    }

    #[test]
    fn test_resolve_host_falls_back_to_host_header() {
        let h = headers(&[("host", "localhost:8080")]);
        assert_eq!(resolve_host(Some(""), &h).as_deref(), Some("localhost:8080"));
        assert_eq!(resolve_host(None, &HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_voice_returns_xml() {
        let state = test_state(Some("calls.example.com"));
        let response = voice(State(state), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("wss://calls.example.com/stream"));
    }

    #[tokio::test]
    async fn test_voice_without_host_is_bad_request() {
        let state = test_state(None);
        let response = voice(State(state), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_index_liveness() {
        assert_eq!(index().await, "Hello World!");
    }

    #[test]
    fn test_active_session_guard_counts() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = ActiveSession::enter(&counter);
        let b = ActiveSession::enter(&counter);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        drop(a);
        drop(b);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_router_builds_with_default_config() {
        let _router = router(test_state(None));
    }

    #[tokio::test]
    async fn test_stream_upgrade_refused_during_shutdown() {
        let app = router(state_with(AppConfig::default(), true));
        let request = Request::builder().uri("/stream").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stream_without_upgrade_headers_is_rejected() {
        let app = router(state_with(AppConfig::default(), false));
        let request = Request::builder().uri("/stream").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unbuildable_recognizer_closes_with_1011() {
        let state = state_with(unknown_engine_config(), false);
        let transport = RecordingTransport::default();
        let closes = Arc::clone(&transport.closes);

        let report = serve_transport(transport, &state, "session-1".to_string()).await;
        assert!(report.is_none());
        assert_eq!(
            *closes.lock().unwrap(),
            vec![(1011, "recognizer unavailable".to_string())]
        );
    }

    #[tokio::test]
    async fn test_refusal_close_is_bounded() {
        let mut config = unknown_engine_config();
        config.session.close_timeout_ms = 50;
        let state = state_with(config, false);
        let transport = RecordingTransport {
            stalled: true,
            ..Default::default()
        };
        let closes = Arc::clone(&transport.closes);

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            serve_transport(transport, &state, "session-1".to_string()),
        )
        .await
        .expect("refusal close was not bounded");
        assert!(report.is_none());
        assert!(closes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_serve_transport_runs_session() {
        let state = state_with(AppConfig::default(), false);
        let transport = RecordingTransport::default();
        let closes = Arc::clone(&transport.closes);

        let report = serve_transport(transport, &state, "session-7".to_string())
            .await
            .unwrap();
        assert_eq!(report.session_id, "session-7");
        assert_eq!(report.close_reason, CloseReason::PeerGone);
        assert!(closes.lock().unwrap().is_empty());
    }
}
