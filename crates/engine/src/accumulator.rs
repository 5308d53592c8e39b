//! Audio accumulator
//!
//! Ordered storage for one session's raw audio segments. Concatenation
//! re-decodes the full sequence on every call; this mirrors the baseline
//! contract where each pass reads the complete recording so far rather
//! than an incremental diff.

use crate::codec;

#[derive(Debug)]
struct Segment {
    /// Arrival index, assigned at append time
    index: u64,
    data: Vec<u8>,
}

/// Ordered sequence of raw audio segments for one session.
#[derive(Debug, Default)]
pub struct AudioAccumulator {
    segments: Vec<Segment>,
    next_index: u64,
}

impl AudioAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw segment; returns its arrival index.
    pub fn append(&mut self, data: Vec<u8>) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.segments.push(Segment { index, data });
        index
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Release all buffered scratch storage.
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Decode and merge all segments, in arrival order, into one
    /// normalized waveform buffer.
    ///
    /// A segment that fails to decode is logged and skipped; it neither
    /// stops processing of later segments nor surfaces to the caller. If
    /// nothing decodes the buffer is empty.
    pub fn concatenate(&self) -> Vec<f32> {
        let mut merged = Vec::new();

        for segment in &self.segments {
            match codec::decode_segment(&segment.data) {
                Ok(pcm) => merged.extend_from_slice(&pcm),
                Err(e) => {
                    tracing::warn!(segment = segment.index, error = %e, "skipping undecodable audio segment");
                }
            }
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TARGET_SAMPLE_RATE;
    use std::io::Cursor;

    fn wav_segment(samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: TARGET_SAMPLE_RATE,
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
    fn test_concatenate_preserves_arrival_order() {
        let mut acc = AudioAccumulator::new();
        acc.append(wav_segment(&[100; 10]));
        acc.append(wav_segment(&[200; 20]));

        let merged = acc.concatenate();
        assert_eq!(merged.len(), 30);
        assert!((merged[0] - 100.0 / 32768.0).abs() < 1e-6);
        assert!((merged[10] - 200.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_undecodable_segment_is_skipped() {
        let mut with_bad = AudioAccumulator::new();
        with_bad.append(wav_segment(&[1; 8]));
        with_bad.append(b"corrupted".to_vec());
        with_bad.append(wav_segment(&[2; 8]));

        let mut without_bad = AudioAccumulator::new();
        without_bad.append(wav_segment(&[1; 8]));
        without_bad.append(wav_segment(&[2; 8]));

        assert_eq!(with_bad.concatenate(), without_bad.concatenate());
    }

    #[test]
    fn test_all_segments_undecodable_yields_empty_buffer() {
        let mut acc = AudioAccumulator::new();
        acc.append(b"junk".to_vec());
        acc.append(b"more junk".to_vec());
        assert!(acc.concatenate().is_empty());
    }

    #[test]
    fn test_concatenate_does_not_truncate() {
        let mut acc = AudioAccumulator::new();
        acc.append(wav_segment(&[5; 16]));

        let first = acc.concatenate();
        let second = acc.concatenate();
        assert_eq!(first, second);
        assert_eq!(acc.segment_count(), 1);
    }

    #[test]
    fn test_clear_releases_segments() {
        let mut acc = AudioAccumulator::new();
        acc.append(wav_segment(&[5; 16]));
        acc.clear();
        assert!(acc.is_empty());
        assert!(acc.concatenate().is_empty());
    }
}
