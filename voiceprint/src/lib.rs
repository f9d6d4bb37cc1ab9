//! Voice signature extraction and matching.
//!
//! # Pipeline
//!
//! 1. [`validate`]: duration, energy floor and voice-band checks on the
//!    raw waveform — cheap screening before any feature work
//! 2. [`extract`]: validated mono audio at the analysis rate -> fixed
//!    80-component normalized feature vector
//! 3. [`score`]: test vector vs stored template -> combined similarity
//!    and an accept/reject decision
//!
//! # Feature layout
//!
//! The vector concatenates four groups in a fixed order (the order *is*
//! the layout; enrollment and verification must agree on it):
//!
//! ```text
//! [ 0..52)  13 cepstral coefficients x {mean, std, max, min}
//! [52..56)  voiced-frame pitch {mean, std, max, min}
//! [56..60)  spectral centroid {mean, std}, roll-off {mean, std}
//! [60..80)  first two strong-peak bins of the 10 leading frames
//! ```
//!
//! followed by per-clip z-score normalization. [`FEATURE_VERSION`] is
//! persisted with every template; a layout change bumps it so stale
//! templates fail verification instead of silently mis-scoring.
//!
//! Everything here is a pure function of the waveform: no I/O, no clocks,
//! no hidden state, bit-identical output for identical input.

mod error;
mod features;
mod matcher;
mod spectrum;
mod validate;

pub use error::VoiceprintError;
pub use features::{FEATURE_DIM, FEATURE_VERSION, FeatureConfig, extract};
pub use matcher::{DEFAULT_THRESHOLD, MatchScore, score};
pub use validate::{ValidatorConfig, validate, voice_band_ratio};
