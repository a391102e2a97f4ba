//! Voice-activity segmentation seam.
//!
//! The detector itself lives outside this crate; the pipeline consumes it
//! through [`SpeechSegmenter`] only, and treats it as a best-effort
//! optimization — any failure falls back to the unsegmented audio.

use std::error::Error;

/// A half-open range of sample indices containing speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechSegment {
    pub start: usize,
    pub end: usize,
}

impl SpeechSegment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// External voice-activity detector contract.
pub trait SpeechSegmenter: Send + Sync {
    /// Partition a sample buffer into speech-only segments.
    fn segment(
        &self,
        samples: &[f32],
    ) -> Result<Vec<SpeechSegment>, Box<dyn Error + Send + Sync>>;
}

/// Concatenate the speech segments of `samples` into one buffer.
///
/// Ranges are clamped to the buffer; empty or inverted ranges contribute
/// nothing.
pub fn collect_segments(samples: &[f32], segments: &[SpeechSegment]) -> Vec<f32> {
    let mut out = Vec::new();
    for seg in segments {
        let start = seg.start.min(samples.len());
        let end = seg.end.min(samples.len());
        if start < end {
            out.extend_from_slice(&samples[start..end]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_in_order() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let collected = collect_segments(
            &samples,
            &[SpeechSegment::new(0, 2), SpeechSegment::new(5, 7)],
        );
        assert_eq!(collected, vec![0.0, 1.0, 5.0, 6.0]);
    }

    #[test]
    fn ranges_are_clamped() {
        let samples: Vec<f32> = (0..4).map(|i| i as f32).collect();
        let collected = collect_segments(
            &samples,
            &[SpeechSegment::new(2, 100), SpeechSegment::new(50, 60)],
        );
        assert_eq!(collected, vec![2.0, 3.0]);
    }

    #[test]
    fn degenerate_ranges_contribute_nothing() {
        let samples = vec![1.0f32; 8];
        let collected = collect_segments(
            &samples,
            &[SpeechSegment::new(3, 3), SpeechSegment::new(6, 4)],
        );
        assert!(collected.is_empty());
    }
}
