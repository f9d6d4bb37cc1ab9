//! Audio front-end: container/codec decode and resampling.
//!
//! Turns caller-supplied audio bytes (WAV, MP3, M4A and whatever else the
//! enabled symphonia codecs handle) into mono f32 samples in [-1, 1] at the
//! source rate, and converts them to the fixed analysis rate so that frame
//! counts and frequency-bin mappings downstream are deterministic across
//! input formats.
//!
//! ```text
//! bytes -> decode() -> DecodedAudio { samples, sample_rate }
//!       -> resample() -> samples @ ANALYSIS_RATE
//! ```

pub mod decode;
pub mod resample;

use thiserror::Error;

/// Fixed analysis sample rate for feature extraction, in Hz.
pub const ANALYSIS_RATE: u32 = 22_050;

/// Errors from the audio front-end.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("audio: unsupported or corrupt input: {0}")]
    Unsupported(String),

    #[error("audio: decoded stream is empty")]
    Empty,

    #[error("audio: resample failed: {0}")]
    Resample(String),
}

pub use decode::{DecodedAudio, decode};
pub use resample::resample;

/// Decodes raw bytes and converts to mono samples at [`ANALYSIS_RATE`].
///
/// Convenience wrapper over [`decode`] + [`resample`]; most callers that
/// do not need the native-rate signal go through this.
pub fn decode_to_analysis_rate(bytes: &[u8]) -> Result<Vec<f32>, AudioError> {
    let decoded = decode(bytes)?;
    resample(&decoded.samples, decoded.sample_rate, ANALYSIS_RATE)
}
