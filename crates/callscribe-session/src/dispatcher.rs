use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use callscribe_audio::{Transcoder, INPUT_SAMPLE_RATE};
use callscribe_core::{
    CloseReason, SessionError, SessionState, StartMetadata, StreamEvent, Transcript,
    TranscriptEvent,
};
use callscribe_engine::RecognizerAdapter;
use tokio::sync::mpsc;

/// Per-session frame accounting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Text frames dispatched while the session was open.
    pub frames: u64,
    /// Media frames whose audio reached the recognizer.
    pub media: u64,
    /// Frames dropped because of an error.
    pub skipped: u64,
    /// Frames that arrived after the session started closing.
    pub ignored: u64,
    pub partials: u64,
    pub finals: u64,
}

/// Per-session state machine. Owns the transcoder and recognizer exclusively
/// and handles one inbound text frame at a time, in arrival order.
pub struct Dispatcher {
    session_id: String,
    state: SessionState,
    stream_sid: Option<String>,
    close_reason: Option<CloseReason>,
    transcoder: Transcoder,
    recognizer: RecognizerAdapter,
    transcripts: mpsc::UnboundedSender<TranscriptEvent>,
    stats: FrameStats,
}

impl Dispatcher {
    pub fn new(
        session_id: impl Into<String>,
        transcoder: Transcoder,
        recognizer: RecognizerAdapter,
        transcripts: mpsc::UnboundedSender<TranscriptEvent>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Idle,
            stream_sid: None,
            close_reason: None,
            transcoder,
            recognizer,
            transcripts,
            stats: FrameStats::default(),
        }
    }

    /// Handle one text frame.
    ///
    /// An error means the frame was skipped; the session state is unchanged
    /// and the next frame can be dispatched normally.
    pub fn dispatch(&mut self, text: &str) -> Result<(), SessionError> {
        if !self.state.is_open() {
            self.stats.ignored += 1;
            tracing::trace!(session_id = %self.session_id, "frame after close ignored");
            return Ok(());
        }

        self.stats.frames += 1;
        let result = self.handle(text);
        if result.is_err() {
            self.stats.skipped += 1;
        }
        result
    }

    fn handle(&mut self, text: &str) -> Result<(), SessionError> {
        let event: StreamEvent = serde_json::from_str(text)?;
        if self.state == SessionState::Idle {
            self.advance(SessionState::Streaming);
        }

        let announced_sid = event.stream_sid().map(str::to_owned);
        match event {
            StreamEvent::Connected { protocol, version } => {
                tracing::info!(
                    session_id = %self.session_id,
                    protocol = protocol.as_deref().unwrap_or("-"),
                    version = version.as_deref().unwrap_or("-"),
                    "stream connected"
                );
            }
            StreamEvent::Start { start, .. } => {
                if announced_sid.is_some() {
                    self.stream_sid = announced_sid;
                }
                self.check_media_format(start.as_ref());
                tracing::info!(
                    session_id = %self.session_id,
                    stream_sid = self.stream_sid.as_deref().unwrap_or("-"),
                    "stream started"
                );
            }
            StreamEvent::Media { media } => self.handle_media(&media.payload)?,
            StreamEvent::Stop { .. } => {
                tracing::info!(
                    session_id = %self.session_id,
                    stream_sid = self.stream_sid.as_deref().unwrap_or("-"),
                    "stream stopped"
                );
                self.begin_close(CloseReason::StreamStopped);
            }
            StreamEvent::Unknown => {
                tracing::debug!(session_id = %self.session_id, "unknown event ignored");
            }
        }
        Ok(())
    }

    fn handle_media(&mut self, payload: &str) -> Result<(), SessionError> {
        let audio = BASE64
            .decode(payload)
            .map_err(|e| SessionError::ProtocolDecode(format!("media payload: {e}")))?;

        let pcm = self.transcoder.convert(&audio)?;
        let completed = self.recognizer.accept(pcm)?;
        self.stats.media += 1;

        let transcript = if completed {
            self.recognizer.fetch_final()?
        } else {
            self.recognizer.fetch_partial()?
        };
        self.emit(transcript);
        Ok(())
    }

    fn check_media_format(&self, meta: Option<&StartMetadata>) {
        let Some(format) = meta.and_then(|m| m.media_format.as_ref()) else {
            return;
        };
        if format.encoding != "audio/x-mulaw"
            || format.sample_rate != INPUT_SAMPLE_RATE
            || format.channels != 1
        {
            tracing::warn!(
                session_id = %self.session_id,
                encoding = %format.encoding,
                sample_rate = format.sample_rate,
                channels = format.channels,
                "unexpected media format, decoding as 8 kHz mono mu-law"
            );
        }
    }

    fn emit(&mut self, transcript: Transcript) {
        let sid = self.stream_sid.as_deref().unwrap_or("-");
        if transcript.is_final() {
            self.stats.finals += 1;
            tracing::info!(session_id = %self.session_id, stream_sid = sid, text = transcript.text(), "final");
        } else {
            self.stats.partials += 1;
            tracing::debug!(session_id = %self.session_id, stream_sid = sid, text = transcript.text(), "partial");
        }

        let event = TranscriptEvent {
            session_id: self.session_id.clone(),
            stream_sid: self.stream_sid.clone(),
            transcript,
            timestamp: self.transcoder.elapsed_secs(),
        };
        if self.transcripts.send(event).is_err() {
            tracing::trace!(session_id = %self.session_id, "transcript receiver dropped");
        }
    }

    fn advance(&mut self, next: SessionState) {
        if self.state.can_advance_to(next) {
            tracing::debug!(
                session_id = %self.session_id,
                from = ?self.state,
                to = ?next,
                "session state"
            );
            self.state = next;
        }
    }

    /// Record the close reason and move to `Closing`, flushing the pending
    /// utterance. Only the first call has any effect; returns whether this
    /// call was it.
    pub fn begin_close(&mut self, reason: CloseReason) -> bool {
        if self.close_reason.is_some() {
            return false;
        }
        self.close_reason = Some(reason);

        match self.recognizer.flush() {
            Ok(Some(transcript)) => self.emit(transcript),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, "final flush failed: {e}");
            }
        }

        self.advance(SessionState::Closing);
        tracing::info!(session_id = %self.session_id, reason = %reason, "session closing");
        true
    }

    /// Terminal transition once the close handshake is over.
    pub fn finish(&mut self) {
        if self.close_reason.is_none() {
            self.begin_close(CloseReason::PeerGone);
        }
        self.advance(SessionState::Closed);
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn recognizer(&self) -> &RecognizerAdapter {
        &self.recognizer
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callscribe_audio::encode_sample;
    use callscribe_core::AudioError;
    use callscribe_engine::RecognizerRegistry;

    fn null_config(silence_ms: i64) -> toml::Value {
        let mut t = toml::map::Map::new();
        t.insert("silence_ms".to_string(), toml::Value::Integer(silence_ms));
        toml::Value::Table(t)
    }

    fn dispatcher(silence_ms: i64) -> (Dispatcher, mpsc::UnboundedReceiver<TranscriptEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recognizer = RecognizerRegistry::new()
            .build("null", null_config(silence_ms), 16000)
            .unwrap();
        (Dispatcher::new("s1", Transcoder::default(), recognizer, tx), rx)
    }

    fn media(bytes: &[u8]) -> String {
        format!(
            r#"{{"event":"media","media":{{"payload":"{}"}}}}"#,
            BASE64.encode(bytes)
        )
    }

    fn voiced(len: usize) -> Vec<u8> {
        vec![encode_sample(6000); len]
    }

    #[test]
    fn test_first_frame_enters_streaming() {
        let (mut d, _rx) = dispatcher(500);
        assert_eq!(d.state(), SessionState::Idle);
        d.dispatch(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#)
            .unwrap();
        assert_eq!(d.state(), SessionState::Streaming);
    }

    #[test]
    fn test_unparseable_frame_keeps_idle() {
        let (mut d, _rx) = dispatcher(500);
        let err = d.dispatch("{not json").unwrap_err();
        assert!(matches!(err, SessionError::ProtocolDecode(_)));
        assert_eq!(d.state(), SessionState::Idle);
        assert_eq!(d.stats().skipped, 1);
    }

    #[test]
    fn test_start_captures_stream_sid() {
        let (mut d, _rx) = dispatcher(500);
        d.dispatch(r#"{"event":"start","start":{"streamSid":"MZ42","callSid":"CA1"}}"#)
            .unwrap();
        assert_eq!(d.stream_sid(), Some("MZ42"));
    }

    #[test]
    fn test_silent_chunk_emits_partial_without_completion() {
        let (mut d, mut rx) = dispatcher(500);
        d.dispatch(&media(&[0xFF; 160])).unwrap();

        let event = rx.try_recv().unwrap();
        assert!(!event.transcript.is_final());
        assert_eq!(event.transcript.text(), "[null] 320 samples");
        assert_eq!(d.recognizer().samples_accepted(), 320);
        assert!((event.timestamp - 0.02).abs() < 1e-9);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bad_base64_is_skipped() {
        let (mut d, mut rx) = dispatcher(500);
        d.dispatch(&media(&[0xFF; 160])).unwrap();
        rx.try_recv().unwrap();

        let err = d
            .dispatch(r#"{"event":"media","media":{"payload":"%%% not base64 %%%"}}"#)
            .unwrap_err();
        assert!(matches!(err, SessionError::ProtocolDecode(_)));
        assert_eq!(d.state(), SessionState::Streaming);
        assert!(rx.try_recv().is_err());

        d.dispatch(&media(&[0xFF; 160])).unwrap();
        assert_eq!(rx.try_recv().unwrap().transcript.text(), "[null] 640 samples");
        assert_eq!(d.stats().media, 2);
        assert_eq!(d.stats().skipped, 1);
    }

    #[test]
    fn test_oversized_chunk_is_skipped() {
        let (mut d, mut rx) = dispatcher(500);
        let err = d.dispatch(&media(&vec![0xFF; 8001])).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Audio(AudioError::BufferOverflow { .. })
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(d.recognizer().samples_accepted(), 0);
    }

    #[test]
    fn test_utterance_completion_emits_final() {
        let (mut d, mut rx) = dispatcher(40);
        d.dispatch(&media(&voiced(160))).unwrap();
        d.dispatch(&media(&[0xFF; 160])).unwrap();
        d.dispatch(&media(&[0xFF; 160])).unwrap();
        d.dispatch(&media(&[0xFF; 160])).unwrap();

        let kinds: Vec<bool> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.transcript.is_final())
            .collect();
        assert!(kinds.contains(&true));
        assert_eq!(d.stats().finals, 1);
    }

    #[test]
    fn test_stop_flushes_and_closes() {
        let (mut d, mut rx) = dispatcher(500);
        d.dispatch(r#"{"event":"start","streamSid":"MZ1"}"#).unwrap();
        d.dispatch(&media(&voiced(160))).unwrap();
        d.dispatch(r#"{"event":"stop","streamSid":"MZ1"}"#).unwrap();

        let partial = rx.try_recv().unwrap();
        assert!(!partial.transcript.is_final());
        let flushed = rx.try_recv().unwrap();
        assert!(flushed.transcript.is_final());
        assert_eq!(flushed.transcript.text(), "[null] 320 samples");
        assert_eq!(flushed.stream_sid.as_deref(), Some("MZ1"));

        assert_eq!(d.state(), SessionState::Closing);
        assert_eq!(d.close_reason(), Some(CloseReason::StreamStopped));
    }

    #[test]
    fn test_frames_after_stop_ignored() {
        let (mut d, mut rx) = dispatcher(500);
        d.dispatch(r#"{"event":"stop"}"#).unwrap();
        d.dispatch(&media(&voiced(160))).unwrap();
        d.dispatch("garbage").unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(d.stats().ignored, 2);
        assert_eq!(d.recognizer().samples_accepted(), 0);
    }

    #[test]
    fn test_close_reason_recorded_once() {
        let (mut d, _rx) = dispatcher(500);
        assert!(d.begin_close(CloseReason::Shutdown));
        assert!(!d.begin_close(CloseReason::PeerClosed));
        assert_eq!(d.close_reason(), Some(CloseReason::Shutdown));
        d.finish();
        assert_eq!(d.state(), SessionState::Closed);
    }

    #[test]
    fn test_unknown_event_ignored() {
        let (mut d, mut rx) = dispatcher(500);
        d.dispatch(r#"{"event":"mark","mark":{"name":"x"}}"#).unwrap();
        assert_eq!(d.state(), SessionState::Streaming);
        assert_eq!(d.stats().skipped, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_does_not_fail_dispatch() {
        let (mut d, rx) = dispatcher(500);
        drop(rx);
        d.dispatch(&media(&[0xFF; 160])).unwrap();
        assert_eq!(d.stats().partials, 1);
    }
}
