//! Container probe and packet decode via symphonia.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::AudioError;

/// A fully decoded audio clip: mono f32 samples in [-1, 1].
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Clip duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decodes audio bytes into mono samples at the container's native rate.
///
/// The container is probed without a filename hint, so WAV, MP3 and M4A
/// inputs are all recognized by content. Multi-channel audio is downmixed
/// by averaging. Inputs symphonia cannot probe or decode map to
/// [`AudioError::Unsupported`].
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio, AudioError> {
    let mss = MediaSourceStream::new(
        Box::new(Cursor::new(bytes.to_vec())),
        Default::default(),
    );

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Unsupported(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Unsupported("no decodable audio track".into()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Unsupported(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            // End of stream surfaces as an unexpected EOF on the underlying
            // reader; everything read so far is the clip.
            Err(SymError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymError::ResetRequired) => break,
            Err(e) => return Err(AudioError::Unsupported(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();
                if sample_buf.is_none() {
                    sample_buf = Some(SampleBuffer::<f32>::new(
                        decoded.capacity() as u64,
                        spec,
                    ));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    interleaved.extend_from_slice(buf.samples());
                }
            }
            // A malformed packet is skippable; the stream may still be fine.
            Err(SymError::DecodeError(_)) => continue,
            Err(e) => return Err(AudioError::Unsupported(e.to_string())),
        }
    }

    if interleaved.is_empty() || sample_rate == 0 {
        return Err(AudioError::Empty);
    }

    let samples = downmix(&interleaved, channels);
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Averages interleaved channels into mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal PCM16 WAV encoder, test-only.
    pub(crate) fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn decode_wav_roundtrip() {
        let sr = 22_050;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (440.0 * 2.0 * std::f32::consts::PI * i as f32 / sr as f32).sin() * 0.5)
            .collect();
        let bytes = wav_bytes(&samples, sr as u32);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, sr as u32);
        assert_eq!(decoded.samples.len(), samples.len());
        // PCM16 quantization error stays well under 1e-3.
        for (a, b) in decoded.samples.iter().zip(samples.iter()) {
            assert!((a - b).abs() < 1e-3, "sample drift {a} vs {b}");
        }
    }

    #[test]
    fn decode_to_analysis_rate_converts() {
        let sr = 44_100u32;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (440.0 * 2.0 * std::f32::consts::PI * i as f32 / sr as f32).sin() * 0.5)
            .collect();
        let bytes = wav_bytes(&samples, sr);

        let decoded = decode(&bytes).unwrap();
        assert!((decoded.duration_secs() - 1.0).abs() < 1e-6);

        let out = crate::decode_to_analysis_rate(&bytes).unwrap();
        assert_eq!(out.len(), crate::ANALYSIS_RATE as usize);
    }

    #[test]
    fn decode_garbage_rejected() {
        let err = decode(b"this is not audio at all, not even close").unwrap_err();
        assert!(matches!(err, AudioError::Unsupported(_)));
    }

    #[test]
    fn decode_empty_rejected() {
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn downmix_stereo() {
        let interleaved = [1.0f32, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mono = downmix(&interleaved, 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }
}
