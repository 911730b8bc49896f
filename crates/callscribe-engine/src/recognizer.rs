use callscribe_core::AsrError;

/// An incremental speech recognizer fed 16 kHz mono PCM.
///
/// Results are returned in the engine's own JSON encoding:
/// finals as `{"text": .., "result": [{"word", "start", "end", "conf"}]}`,
/// partials as `{"partial": ..}`. [`RecognizerAdapter`](crate::RecognizerAdapter)
/// turns them into [`Transcript`](callscribe_core::Transcript)s.
///
/// Calls are made from a single task, in audio order.
pub trait Recognizer: Send {
    fn name(&self) -> &str;
    fn initialize(&mut self, config: toml::Value, sample_rate: u32) -> Result<(), AsrError>;
    /// Feed audio. Returns `true` when the current utterance has ended.
    fn accept_waveform(&mut self, samples: &[i16]) -> Result<bool, AsrError>;
    /// Result of the utterance that just ended.
    fn result(&mut self) -> String;
    /// Best guess for the utterance in progress.
    fn partial_result(&mut self) -> String;
    /// Force the utterance in progress to end and return its result.
    fn final_result(&mut self) -> String;
    fn reset(&mut self);
}
