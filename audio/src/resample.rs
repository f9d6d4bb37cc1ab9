//! Sample-rate conversion using rubato's FFT resampler.

use rubato::{FftFixedInOut, Resampler};

use crate::AudioError;

const CHUNK_FRAMES: usize = 1024;

/// Resamples a mono clip from `from_rate` to `to_rate`.
///
/// Same-rate input is returned unchanged. The tail chunk is zero-padded
/// through the resampler and the output is trimmed to the rounded expected
/// length, so `out.len() / to_rate` matches the input duration.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid rates {from_rate} -> {to_rate}"
        )));
    }
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let mut resampler = FftFixedInOut::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_FRAMES,
        1,
    )
    .map_err(|e| AudioError::Resample(e.to_string()))?;

    let expected =
        ((samples.len() as u64 * to_rate as u64 + from_rate as u64 / 2) / from_rate as u64) as usize;
    let delay = resampler.output_delay();

    let mut out = Vec::with_capacity(delay + expected + CHUNK_FRAMES);
    let mut pos = 0;
    let mut chunk = vec![Vec::with_capacity(CHUNK_FRAMES); 1];
    while pos < samples.len() {
        let need = resampler.input_frames_next();
        let take = need.min(samples.len() - pos);
        chunk[0].clear();
        chunk[0].extend_from_slice(&samples[pos..pos + take]);
        chunk[0].resize(need, 0.0);
        pos += take;

        let processed = resampler
            .process(&chunk, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        out.extend_from_slice(&processed[0]);
    }
    // Zero chunks push the delayed tail out of the filter.
    while out.len() < delay + expected {
        let need = resampler.input_frames_next();
        chunk[0].clear();
        chunk[0].resize(need, 0.0);
        let processed = resampler
            .process(&chunk, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        out.extend_from_slice(&processed[0]);
    }

    // Drop the filter delay so the output aligns with the input, then trim
    // to the expected duration.
    Ok(out[delay..delay + expected].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity() {
        let samples = vec![0.1f32, 0.2, 0.3];
        let out = resample(&samples, 22_050, 22_050).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn resample_preserves_duration() {
        // 1 second at 44.1kHz -> 1 second at 22.05kHz.
        let sr_in = 44_100usize;
        let samples: Vec<f32> = (0..sr_in)
            .map(|i| (440.0 * 2.0 * std::f32::consts::PI * i as f32 / sr_in as f32).sin())
            .collect();
        let out = resample(&samples, sr_in as u32, 22_050).unwrap();
        assert_eq!(out.len(), 22_050);
    }

    #[test]
    fn resample_upsample_length() {
        let samples = vec![0.0f32; 16_000];
        let out = resample(&samples, 16_000, 22_050).unwrap();
        assert_eq!(out.len(), 22_050);
    }

    #[test]
    fn resample_tone_survives() {
        // A 440Hz tone resampled 44.1k -> 22.05k should still be a strong
        // signal, not near-silence.
        let sr_in = 44_100usize;
        let samples: Vec<f32> = (0..sr_in * 2)
            .map(|i| (440.0 * 2.0 * std::f32::consts::PI * i as f32 / sr_in as f32).sin() * 0.5)
            .collect();
        let out = resample(&samples, sr_in as u32, 22_050).unwrap();
        let rms = (out.iter().map(|s| (s * s) as f64).sum::<f64>() / out.len() as f64).sqrt();
        assert!(rms > 0.2, "tone lost in resample, rms={rms}");
    }

    #[test]
    fn resample_zero_rate_rejected() {
        assert!(resample(&[0.0], 0, 22_050).is_err());
    }
}
