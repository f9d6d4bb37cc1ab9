//! Waveform quality gate ahead of feature extraction.
//!
//! Extraction is comparatively expensive, and garbage input (silence,
//! noise, clipped fragments) produces feature vectors that degrade the
//! matcher without being caught by similarity scoring alone, so clips are
//! screened here first. Pure function of the waveform; no side effects.

use crate::VoiceprintError;
use crate::spectrum::{fft, next_pow2};

/// Configures the validation thresholds.
///
/// The voice band is a deployment policy, not a contract: the narrow
/// telephony band (85-3400 Hz) is the default, and widening the upper
/// edge to 8 kHz for full-band recordings is a config edit.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Minimum clip duration in seconds (default: 2.0).
    pub min_duration_secs: f64,
    /// Maximum clip duration in seconds (default: 30.0).
    pub max_duration_secs: f64,
    /// RMS floor on a [-1, 1] signal below which the clip counts as
    /// silent (default: 1e-3).
    pub silence_rms: f64,
    /// Lower edge of the voice band in Hz (default: 85).
    pub band_low_hz: f64,
    /// Upper edge of the voice band in Hz (default: 3400).
    pub band_high_hz: f64,
    /// Minimum fraction of spectral power that must fall inside the
    /// voice band (default: 0.10).
    pub min_band_ratio: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 2.0,
            max_duration_secs: 30.0,
            silence_rms: 1e-3,
            band_low_hz: 85.0,
            band_high_hz: 3400.0,
            min_band_ratio: 0.10,
        }
    }
}

/// Validates a mono clip, short-circuiting on the first failed check:
/// duration bounds, then the silence floor, then the voice-band ratio.
pub fn validate(
    samples: &[f32],
    sample_rate: u32,
    cfg: &ValidatorConfig,
) -> Result<(), VoiceprintError> {
    let duration = samples.len() as f64 / sample_rate as f64;
    if duration < cfg.min_duration_secs || duration > cfg.max_duration_secs {
        return Err(VoiceprintError::DurationOutOfRange {
            seconds: duration,
            min: cfg.min_duration_secs,
            max: cfg.max_duration_secs,
        });
    }

    let rms = {
        let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / samples.len() as f64).sqrt()
    };
    if rms < cfg.silence_rms {
        return Err(VoiceprintError::SilentOrTooQuiet);
    }

    if voice_band_ratio(samples, sample_rate, cfg.band_low_hz, cfg.band_high_hz)
        < cfg.min_band_ratio
    {
        return Err(VoiceprintError::NoVoiceContentDetected);
    }

    Ok(())
}

/// Fraction of total spectral power falling inside [low_hz, high_hz].
///
/// One whole-signal FFT, zero-padded to a power of two; padding shifts no
/// energy between bins so the ratio is unaffected.
pub fn voice_band_ratio(samples: &[f32], sample_rate: u32, low_hz: f64, high_hz: f64) -> f64 {
    let n = next_pow2(samples.len().max(2));
    let mut buf = vec![(0.0f64, 0.0f64); n];
    for (i, &s) in samples.iter().enumerate() {
        buf[i] = (s as f64, 0.0);
    }
    fft(&mut buf);

    let half = n / 2 + 1;
    let low_bin = (low_hz * n as f64 / sample_rate as f64).floor() as usize;
    let high_bin = ((high_hz * n as f64 / sample_rate as f64).floor() as usize).min(half - 1);

    let mut total = 0.0f64;
    let mut band = 0.0f64;
    for (k, &(re, im)) in buf.iter().enumerate().take(half) {
        let power = re * re + im * im;
        total += power;
        if k >= low_bin && k <= high_bin {
            band += power;
        }
    }
    if total == 0.0 {
        return 0.0;
    }
    band / total
}
