//! Feature extraction: a validated waveform becomes a fixed-length
//! normalized vector.
//!
//! No single feature family separates speakers well on its own: cepstral
//! statistics capture timbre, pitch statistics capture vocal range,
//! centroid/roll-off capture brightness, and the formant proxy captures
//! resonance structure. The groups are concatenated in a fixed order that
//! defines the vector layout, and the whole vector is z-scored per clip so
//! recording loudness drops out while the relative relationships survive.

use crate::VoiceprintError;
use crate::spectrum::{bin_freq, dct_ii, mel_filterbank, next_pow2, stft_magnitudes};
use crate::validate::{ValidatorConfig, validate};

/// Length of the extracted vector under [`FeatureConfig::default`]:
/// 13 cepstra x 4 stats + 4 pitch stats + 4 shape stats + 10 frames x 2
/// formant bins.
pub const FEATURE_DIM: usize = 80;

/// Version tag persisted with every template. Bump whenever the layout
/// below changes so stale templates are rejected instead of mis-scored.
pub const FEATURE_VERSION: u32 = 2;

const ENERGY_FLOOR: f64 = 1e-10;

/// Configures feature extraction.
///
/// Defaults assume input already resampled to 22 050 Hz; frame counts and
/// bin mappings are then deterministic across input formats.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Analysis sample rate in Hz (default: 22050).
    pub sample_rate: u32,
    /// STFT frame length in samples (default: 2048).
    pub frame_length: usize,
    /// STFT frame shift in samples (default: 512).
    pub frame_shift: usize,
    /// Mel filterbank channels feeding the cepstral transform (default: 40).
    pub num_mels: usize,
    /// Cepstral coefficients kept per frame (default: 13).
    pub num_cepstra: usize,
    /// Candidate pitch band lower edge in Hz (default: 150).
    pub pitch_low_hz: f64,
    /// Candidate pitch band upper edge in Hz (default: 4000).
    pub pitch_high_hz: f64,
    /// Spectral roll-off energy fraction (default: 0.85).
    pub rolloff_fraction: f64,
    /// Leading frames sampled for the formant proxy (default: 10).
    pub formant_frames: usize,
    /// Validation thresholds applied before any feature work.
    pub validator: ValidatorConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            frame_length: 2048,
            frame_shift: 512,
            num_mels: 40,
            num_cepstra: 13,
            pitch_low_hz: 150.0,
            pitch_high_hz: 4000.0,
            rolloff_fraction: 0.85,
            formant_frames: 10,
            validator: ValidatorConfig::default(),
        }
    }
}

impl FeatureConfig {
    /// Output vector length for this configuration.
    pub fn dimension(&self) -> usize {
        self.num_cepstra * 4 + 4 + 4 + self.formant_frames * 2
    }
}

/// Extracts the voice signature vector from a mono clip.
///
/// Runs the validator first and propagates its rejection unchanged. The
/// result always has exactly [`FeatureConfig::dimension`] components.
/// Pure function: identical input yields bit-identical output.
pub fn extract(
    samples: &[f32],
    sample_rate: u32,
    cfg: &FeatureConfig,
) -> Result<Vec<f32>, VoiceprintError> {
    validate(samples, sample_rate, &cfg.validator)?;

    let fft_size = next_pow2(cfg.frame_length);
    let mags = stft_magnitudes(samples, cfg.frame_length, cfg.frame_shift);

    let mut features: Vec<f64> = Vec::with_capacity(cfg.dimension());

    // 1. Cepstral statistics: {mean, std, max, min} per coefficient.
    let fb = mel_filterbank(
        cfg.num_mels,
        fft_size,
        sample_rate,
        0.0,
        sample_rate as f64 / 2.0,
    );
    let mut cepstra: Vec<Vec<f64>> = Vec::with_capacity(mags.len());
    for mag in &mags {
        let mut mels = vec![0.0f64; cfg.num_mels];
        for (m, mel) in mels.iter_mut().enumerate() {
            let mut energy = 0.0;
            for (k, &w) in fb[m].iter().enumerate() {
                if w > 0.0 {
                    energy += w * mag[k] * mag[k];
                }
            }
            *mel = energy.max(ENERGY_FLOOR).ln();
        }
        cepstra.push(dct_ii(&mels, cfg.num_cepstra));
    }
    for c in 0..cfg.num_cepstra {
        let vals: Vec<f64> = cepstra.iter().map(|frame| frame[c]).collect();
        let s = Stats::of(&vals);
        features.extend([s.mean, s.std, s.max, s.min]);
    }

    // 2. Pitch statistics over voiced frames, or four zeros.
    let pitches: Vec<f64> = mags
        .iter()
        .filter_map(|mag| frame_pitch(mag, fft_size, sample_rate, cfg))
        .collect();
    if pitches.is_empty() {
        features.extend([0.0; 4]);
    } else {
        let s = Stats::of(&pitches);
        features.extend([s.mean, s.std, s.max, s.min]);
    }

    // 3. Spectral shape: centroid {mean, std}, roll-off {mean, std}.
    let centroids: Vec<f64> = mags
        .iter()
        .map(|mag| spectral_centroid(mag, fft_size, sample_rate))
        .collect();
    let rolloffs: Vec<f64> = mags
        .iter()
        .map(|mag| spectral_rolloff(mag, fft_size, sample_rate, cfg.rolloff_fraction))
        .collect();
    let sc = Stats::of(&centroids);
    let sr = Stats::of(&rolloffs);
    features.extend([sc.mean, sc.std, sr.mean, sr.std]);

    // 4. Formant proxy: first two strong-peak bin indices for each of the
    // leading frames, zero-padded to a fixed width.
    let mut formants = Vec::with_capacity(cfg.formant_frames * 2);
    for mag in mags.iter().take(cfg.formant_frames) {
        let s = Stats::of(mag);
        let threshold = s.mean + s.std;
        let mut peaks = mag
            .iter()
            .enumerate()
            .filter(|&(_, &m)| m > threshold)
            .map(|(k, _)| k as f64);
        match (peaks.next(), peaks.next()) {
            (Some(a), Some(b)) => formants.extend([a, b]),
            _ => formants.extend([0.0, 0.0]),
        }
    }
    formants.resize(cfg.formant_frames * 2, 0.0);
    features.extend_from_slice(&formants);

    debug_assert_eq!(features.len(), cfg.dimension());

    // Per-clip z-score; a zero-spread vector is left as-is rather than
    // divided by zero.
    let s = Stats::of(&features);
    if s.std != 0.0 {
        for v in &mut features {
            *v = (*v - s.mean) / s.std;
        }
    }

    Ok(features.into_iter().map(|v| v as f32).collect())
}

/// Estimated pitch of one frame: the argmax-magnitude bin inside the
/// candidate band, accepted only when it is a genuine local peak.
/// Returns `None` for unvoiced (or empty) frames.
pub(crate) fn frame_pitch(
    mag: &[f64],
    fft_size: usize,
    sample_rate: u32,
    cfg: &FeatureConfig,
) -> Option<f64> {
    let half = mag.len();
    let low = ((cfg.pitch_low_hz * fft_size as f64 / sample_rate as f64).ceil() as usize).max(1);
    let high = ((cfg.pitch_high_hz * fft_size as f64 / sample_rate as f64).floor() as usize)
        .min(half.saturating_sub(2));
    if low > high {
        return None;
    }

    let mut best = low;
    for k in low..=high {
        if mag[k] > mag[best] {
            best = k;
        }
    }
    let is_peak = mag[best] > 0.0 && mag[best] > mag[best - 1] && mag[best] >= mag[best + 1];
    is_peak.then(|| bin_freq(best, fft_size, sample_rate))
}

fn spectral_centroid(mag: &[f64], fft_size: usize, sample_rate: u32) -> f64 {
    let total: f64 = mag.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    mag.iter()
        .enumerate()
        .map(|(k, &m)| bin_freq(k, fft_size, sample_rate) * m)
        .sum::<f64>()
        / total
}

fn spectral_rolloff(mag: &[f64], fft_size: usize, sample_rate: u32, fraction: f64) -> f64 {
    let total: f64 = mag.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    let threshold = fraction * total;
    let mut cumulative = 0.0;
    for (k, &m) in mag.iter().enumerate() {
        cumulative += m;
        if cumulative >= threshold {
            return bin_freq(k, fft_size, sample_rate);
        }
    }
    bin_freq(mag.len() - 1, fft_size, sample_rate)
}

/// Population statistics of a value sequence.
struct Stats {
    mean: f64,
    std: f64,
    max: f64,
    min: f64,
}

impl Stats {
    fn of(vals: &[f64]) -> Self {
        if vals.is_empty() {
            return Self {
                mean: 0.0,
                std: 0.0,
                max: 0.0,
                min: 0.0,
            };
        }
        let n = vals.len() as f64;
        let mean = vals.iter().sum::<f64>() / n;
        let var = vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let mut max = vals[0];
        let mut min = vals[0];
        for &v in &vals[1..] {
            if v > max {
                max = v;
            }
            if v < min {
                min = v;
            }
        }
        Self {
            mean,
            std: var.sqrt(),
            max,
            min,
        }
    }
}
