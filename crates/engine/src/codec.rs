//! Audio segment decoding
//!
//! Boundary with the audio-codec capability: transport-level audio bytes in,
//! normalized waveform out. Segments arrive as WAV containers; output is
//! mono f32 at the inference sample rate.

use std::io::Cursor;

use thiserror::Error;

/// Sample rate the inference backend expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Input length below which FFT resampling falls back to interpolation.
const RESAMPLE_CHUNK: usize = 1024;

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("segment decode failed: {0}")]
    Decode(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// Decode one audio segment into mono f32 samples at [`TARGET_SAMPLE_RATE`].
pub fn decode_segment(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float if spec.bits_per_sample == 32 => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| CodecError::Decode(e.to_string()))?,
        hound::SampleFormat::Int if spec.bits_per_sample <= 32 => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| CodecError::Decode(e.to_string()))?
        }
        _ => {
            return Err(CodecError::UnsupportedFormat(format!(
                "{:?} at {} bits",
                spec.sample_format, spec.bits_per_sample
            )))
        }
    };

    let mono = downmix(&samples, spec.channels as usize);

    if spec.sample_rate == TARGET_SAMPLE_RATE {
        Ok(mono)
    } else {
        Ok(Resampler::new(spec.sample_rate, TARGET_SAMPLE_RATE).resample(&mono))
    }
}

/// Average interleaved channels down to mono.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let frames = samples.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let sum: f32 = samples[frame * channels..(frame + 1) * channels].iter().sum();
        mono.push(sum / channels as f32);
    }
    mono
}

/// Sample-rate converter: FFT-based sinc resampling with a linear
/// interpolation fallback for short input or resampler failures.
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self { from_rate, to_rate }
    }

    pub fn resample(&self, input: &[f32]) -> Vec<f32> {
        if self.from_rate == self.to_rate {
            return input.to_vec();
        }

        if input.len() < RESAMPLE_CHUNK {
            return self.resample_linear(input);
        }

        match self.resample_fft(input) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("FFT resampling failed: {}, falling back to linear", e);
                self.resample_linear(input)
            }
        }
    }

    fn resample_fft(&self, input: &[f32]) -> Result<Vec<f32>, String> {
        use rubato::{FftFixedIn, Resampler as _};

        let mut resampler = FftFixedIn::<f32>::new(
            self.from_rate as usize,
            self.to_rate as usize,
            RESAMPLE_CHUNK,
            2, // sub_chunks
            1, // channels
        )
        .map_err(|e| e.to_string())?;

        let mut output = Vec::with_capacity(
            (input.len() as f64 * self.to_rate as f64 / self.from_rate as f64) as usize + RESAMPLE_CHUNK,
        );

        let mut pos = 0;
        while pos + RESAMPLE_CHUNK <= input.len() {
            let chunk = [&input[pos..pos + RESAMPLE_CHUNK]];
            let frames = resampler
                .process(&chunk[..], None)
                .map_err(|e| e.to_string())?;
            output.extend_from_slice(&frames[0]);
            pos += RESAMPLE_CHUNK;
        }

        // Tail shorter than one chunk, then flush the resampler's delay line.
        if pos < input.len() {
            let tail = [&input[pos..]];
            let frames = resampler
                .process_partial(Some(&tail[..]), None)
                .map_err(|e| e.to_string())?;
            output.extend_from_slice(&frames[0]);
        }
        let frames = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| e.to_string())?;
        output.extend_from_slice(&frames[0]);

        Ok(output)
    }

    fn resample_linear(&self, input: &[f32]) -> Vec<f32> {
        let ratio = self.to_rate as f64 / self.from_rate as f64;
        let output_len = (input.len() as f64 * ratio).ceil() as usize;
        let mut output = Vec::with_capacity(output_len);

        for i in 0..output_len {
            let src_idx = i as f64 / ratio;
            let idx_floor = src_idx.floor() as usize;
            let idx_ceil = (idx_floor + 1).min(input.len().saturating_sub(1));
            let frac = (src_idx - idx_floor as f64) as f32;

            let sample = input[idx_floor] * (1.0 - frac) + input[idx_ceil] * frac;
            output.push(sample);
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mono_16k_passthrough() {
        let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16 * 300).collect();
        let bytes = wav_bytes(TARGET_SAMPLE_RATE, 1, &samples);

        let decoded = decode_segment(&bytes).unwrap();
        assert_eq!(decoded.len(), samples.len());
        assert!((decoded[1] - samples[1] as f32 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_downmixes_stereo() {
        // Stereo frames [L, R]: mono should be the per-frame average.
        let bytes = wav_bytes(TARGET_SAMPLE_RATE, 2, &[1000, 3000, -2000, -4000]);

        let decoded = decode_segment(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!((decoded[0] - 2000.0 / 32768.0).abs() < 1e-6);
        assert!((decoded[1] + 3000.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_segment(b"definitely not a wav file").is_err());
    }

    #[test]
    fn test_resample_halves_rate() {
        let input: Vec<f32> = (0..3200).map(|i| (i as f32 * 0.01).sin()).collect();
        let output = Resampler::new(32_000, 16_000).resample(&input);

        // Allow FFT flush slack of about one chunk.
        let expected = input.len() / 2;
        assert!((output.len() as i64 - expected as i64).abs() <= RESAMPLE_CHUNK as i64);
    }

    #[test]
    fn test_resample_linear_short_input() {
        let input: Vec<f32> = (0..160).map(|i| i as f32).collect();
        let output = Resampler::new(48_000, 16_000).resample(&input);
        assert_eq!(output.len(), 54); // ceil(160 / 3)
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input = vec![0.1f32, 0.2, 0.3];
        assert_eq!(Resampler::new(16_000, 16_000).resample(&input), input);
    }
}
