pub mod mulaw;
pub mod resampler;
pub mod transcoder;

pub use mulaw::{decode_sample, encode_sample, MULAW_DECODE_TABLE};
pub use resampler::Upsampler;
pub use transcoder::{
    PcmBuffer, Transcoder, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, UPSAMPLE_FACTOR,
};
