//! Shared spectral primitives: FFT, windowing, STFT framing, mel filterbank
//! and the cosine transform behind the cepstral features.

use std::f64::consts::PI;

pub(crate) fn next_pow2(n: usize) -> usize {
    let mut p = 1;
    while p < n {
        p <<= 1;
    }
    p
}

pub(crate) fn hann_window(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// In-place Cooley-Tukey FFT.
/// Input length must be a power of 2.
/// Uses (real, imag) tuples instead of a complex number type.
pub(crate) fn fft(x: &mut [(f64, f64)]) {
    let n = x.len();
    if n <= 1 {
        return;
    }

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            x.swap(i, j);
        }
    }

    // Butterfly operations.
    let mut size = 2;
    while size <= n {
        let half = size / 2;
        let angle = -2.0 * PI / size as f64;
        let wn = (angle.cos(), angle.sin());
        let mut start = 0;
        while start < n {
            let mut w = (1.0, 0.0);
            for k in 0..half {
                let u = x[start + k];
                let t_re = w.0 * x[start + k + half].0 - w.1 * x[start + k + half].1;
                let t_im = w.0 * x[start + k + half].1 + w.1 * x[start + k + half].0;
                x[start + k] = (u.0 + t_re, u.1 + t_im);
                x[start + k + half] = (u.0 - t_re, u.1 - t_im);
                let new_w_re = w.0 * wn.0 - w.1 * wn.1;
                let new_w_im = w.0 * wn.1 + w.1 * wn.0;
                w = (new_w_re, new_w_im);
            }
            start += size;
        }
        size <<= 1;
    }
}

/// Short-time magnitude spectra.
///
/// Hann-windowed frames of `frame_length` samples every `frame_shift`,
/// zero-padded to the FFT size. Input shorter than one frame yields a
/// single zero-padded frame so every valid clip produces at least one
/// spectrum. Returns `[num_frames][fft_size/2 + 1]` magnitudes.
pub(crate) fn stft_magnitudes(
    samples: &[f32],
    frame_length: usize,
    frame_shift: usize,
) -> Vec<Vec<f64>> {
    let fft_size = next_pow2(frame_length);
    let half = fft_size / 2 + 1;
    let window = hann_window(frame_length);

    let num_frames = if samples.len() < frame_length {
        1
    } else {
        (samples.len() - frame_length) / frame_shift + 1
    };

    let mut frames = Vec::with_capacity(num_frames);
    let mut buf = vec![(0.0f64, 0.0f64); fft_size];

    for f in 0..num_frames {
        let offset = f * frame_shift;
        for v in &mut buf {
            *v = (0.0, 0.0);
        }
        for i in 0..frame_length {
            let s = match samples.get(offset + i) {
                Some(&s) => s as f64,
                None => 0.0,
            };
            buf[i] = (s * window[i], 0.0);
        }
        fft(&mut buf);

        let mut mags = vec![0.0f64; half];
        for (k, m) in mags.iter_mut().enumerate() {
            let (re, im) = buf[k];
            *m = (re * re + im * im).sqrt();
        }
        frames.push(mags);
    }
    frames
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0)
}

/// Computes triangular mel filterbank weights.
/// Returns `[num_mels][fft_size/2 + 1]` weights.
pub(crate) fn mel_filterbank(
    num_mels: usize,
    fft_size: usize,
    sample_rate: u32,
    low_freq: f64,
    high_freq: f64,
) -> Vec<Vec<f64>> {
    let half = fft_size / 2 + 1;
    let mel_low = hz_to_mel(low_freq);
    let mel_high = hz_to_mel(high_freq);

    // Equally spaced mel points mapped back to FFT bin indices.
    let bin_indices: Vec<usize> = (0..num_mels + 2)
        .map(|i| {
            let mel = mel_low + i as f64 * (mel_high - mel_low) / (num_mels + 1) as f64;
            let hz = mel_to_hz(mel);
            let bin = (hz * fft_size as f64 / sample_rate as f64).floor() as isize;
            bin.max(0).min(half as isize - 1) as usize
        })
        .collect();

    let mut fb = Vec::with_capacity(num_mels);
    for m in 0..num_mels {
        let mut filter = vec![0.0f64; half];
        let left = bin_indices[m];
        let center = bin_indices[m + 1];
        let right = bin_indices[m + 2];

        if center > left {
            for k in left..=center {
                filter[k] = (k - left) as f64 / (center - left) as f64;
            }
        }
        if right > center {
            for k in center..=right {
                filter[k] = (right - k) as f64 / (right - center) as f64;
            }
        }
        fb.push(filter);
    }
    fb
}

/// Orthonormal DCT-II, truncated to the first `n_out` coefficients.
pub(crate) fn dct_ii(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len();
    let mut out = Vec::with_capacity(n_out);
    for k in 0..n_out {
        let mut sum = 0.0;
        for (i, &x) in input.iter().enumerate() {
            sum += x * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n as f64)).cos();
        }
        let scale = if k == 0 {
            (1.0 / n as f64).sqrt()
        } else {
            (2.0 / n as f64).sqrt()
        };
        out.push(scale * sum);
    }
    out
}

/// Center frequency of an FFT bin in Hz.
pub(crate) fn bin_freq(bin: usize, fft_size: usize, sample_rate: u32) -> f64 {
    bin as f64 * sample_rate as f64 / fft_size as f64
}
