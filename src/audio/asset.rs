//! Decoded audio asset
//!
//! The one immutable buffer everything plays from. Created once by the
//! loader, shared read-only by every scheduled segment and the fallback
//! element.

use std::sync::Arc;

/// Immutable decoded audio: interleaved stereo f32 at a fixed sample rate.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    /// Interleaved stereo samples [L, R, L, R, ...]
    samples: Arc<[f32]>,

    /// Sample rate of `samples` (normalized to 44.1kHz by the loader)
    sample_rate: u32,
}

impl AudioAsset {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        debug_assert!(samples.len() % 2 == 0, "interleaved stereo expected");
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames.
    pub fn frames(&self) -> u64 {
        (self.samples.len() / 2) as u64
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Stereo frame at `index`; silence past the end.
    pub fn frame(&self, index: u64) -> (f32, f32) {
        if index >= self.frames() {
            return (0.0, 0.0);
        }
        let i = index as usize * 2;
        (self.samples[i], self.samples[i + 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_and_frames() {
        let asset = AudioAsset::new(vec![0.0; 44_100 * 2], 44_100);
        assert_eq!(asset.frames(), 44_100);
        assert!((asset.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_indexing() {
        let asset = AudioAsset::new(vec![0.1, -0.1, 0.2, -0.2], 44_100);
        assert_eq!(asset.frame(0), (0.1, -0.1));
        assert_eq!(asset.frame(1), (0.2, -0.2));
        // Past the end: silence, no panic
        assert_eq!(asset.frame(2), (0.0, 0.0));
    }
}
