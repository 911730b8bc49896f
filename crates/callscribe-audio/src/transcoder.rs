use crate::mulaw;
use crate::resampler::Upsampler;
use callscribe_core::{AudioConfig, AudioError};

pub const INPUT_SAMPLE_RATE: u32 = 8000;
pub const OUTPUT_SAMPLE_RATE: u32 = 16000;
pub const UPSAMPLE_FACTOR: usize = (OUTPUT_SAMPLE_RATE / INPUT_SAMPLE_RATE) as usize;

// ── PcmBuffer ─────────────────────────────────────────────────

/// Fixed-capacity 16 kHz sample store reused across conversions.
pub struct PcmBuffer {
    samples: Vec<i16>,
    len: usize,
}

impl PcmBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples[..self.len]
    }
}

// ── Transcoder ────────────────────────────────────────────────

/// Converts 8 kHz mu-law chunks into 16 kHz linear PCM, keeping filter
/// state between chunks of the same stream.
pub struct Transcoder {
    decoded: Vec<i16>,
    upsampler: Upsampler,
    output: PcmBuffer,
    samples_in: u64,
}

impl Transcoder {
    pub fn new(buffer_seconds: u32, filter_half_taps: usize) -> Self {
        let capacity = OUTPUT_SAMPLE_RATE as usize * buffer_seconds.max(1) as usize;
        Self {
            decoded: Vec::with_capacity(capacity / UPSAMPLE_FACTOR),
            upsampler: Upsampler::new(filter_half_taps),
            output: PcmBuffer::with_capacity(capacity),
            samples_in: 0,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.buffer_seconds, config.filter_half_taps)
    }

    /// Largest chunk, in mu-law bytes, one call accepts.
    pub fn max_input_len(&self) -> usize {
        self.output.capacity() / UPSAMPLE_FACTOR
    }

    /// Convert one chunk. The returned slice borrows the internal buffer and
    /// holds exactly `2 * input.len()` samples.
    ///
    /// A chunk larger than [`max_input_len`](Self::max_input_len) is rejected
    /// before any state changes.
    pub fn convert(&mut self, input: &[u8]) -> Result<&[i16], AudioError> {
        let needed = input.len() * UPSAMPLE_FACTOR;
        if needed > self.output.capacity() {
            return Err(AudioError::BufferOverflow {
                input: input.len(),
                needed,
                capacity: self.output.capacity(),
            });
        }

        mulaw::decode_into(input, &mut self.decoded);
        let produced = self
            .upsampler
            .process(&self.decoded, &mut self.output.samples);
        self.output.len = produced;
        self.samples_in += input.len() as u64;

        tracing::trace!(input = input.len(), produced, "transcoded chunk");
        Ok(self.output.as_slice())
    }

    /// Samples of the most recent conversion.
    pub fn last_output(&self) -> &[i16] {
        self.output.as_slice()
    }

    /// Total 8 kHz samples converted so far.
    pub fn samples_in(&self) -> u64 {
        self.samples_in
    }

    /// Seconds of input audio converted so far.
    pub fn elapsed_secs(&self) -> f64 {
        self.samples_in as f64 / INPUT_SAMPLE_RATE as f64
    }

    /// Fixed output delay introduced by the interpolation filter, in 16 kHz samples.
    pub fn latency_samples(&self) -> usize {
        self.upsampler.delay() * UPSAMPLE_FACTOR
    }

    pub fn reset(&mut self) {
        self.upsampler.reset();
        self.output.len = 0;
        self.samples_in = 0;
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default())
    }
}
