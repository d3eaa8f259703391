//! Buffer-scheduled audio graph
//!
//! The tier-1 playback path: scheduled segments of the decoded asset, summed
//! where they overlap, shaped by the shared [`GainParam`], and optionally
//! tapped for frequency analysis.
//!
//! The graph clock is frames-rendered divided by sample rate, so whoever
//! pulls samples (the cpal callback in production, the test harness in
//! tests) advances time. Scheduling is sample-accurate: segment boundaries
//! are stored as frame indices.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::analyser::Analyser;
use crate::audio::asset::AudioAsset;
use crate::engine::gain::GainParam;
use crate::error::{Error, Result};

/// One scheduled playback of the whole asset, anchored on the graph clock.
/// Ephemeral: pruned once `end_frame` passes.
#[derive(Debug, Clone)]
struct Segment {
    start_frame: u64,
    end_frame: u64,
}

/// Mixing graph for the buffer-scheduled tier.
pub struct BufferGraph {
    asset: Arc<AudioAsset>,
    sample_rate: u32,
    frames_rendered: u64,
    gain: GainParam,
    segments: Vec<Segment>,
    /// Soft cap on concurrent segments; breaching it means the scheduler
    /// math went wrong, so scheduling fails rather than piling up sources.
    max_segments: usize,
    tap: Option<Arc<Analyser>>,
}

impl BufferGraph {
    pub fn new(asset: Arc<AudioAsset>, initial_gain: f32, max_segments: usize) -> Result<Self> {
        if asset.frames() == 0 {
            return Err(Error::GraphConstruction(
                "asset holds no audio".to_string(),
            ));
        }
        let sample_rate = asset.sample_rate();
        Ok(Self {
            asset,
            sample_rate,
            frames_rendered: 0,
            gain: GainParam::new(initial_gain),
            segments: Vec::new(),
            max_segments,
            tap: None,
        })
    }

    /// Current time on the graph clock, in seconds.
    pub fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn asset_duration(&self) -> f64 {
        self.asset.duration()
    }

    /// Schedule one full playback of the asset starting at `start` seconds.
    pub fn schedule(&mut self, start: f64) -> Result<()> {
        self.prune();
        if self.segments.len() >= self.max_segments {
            return Err(Error::GraphConstruction(format!(
                "segment budget exceeded ({} active)",
                self.segments.len()
            )));
        }
        let start_frame = self.frame_at(start);
        let segment = Segment {
            start_frame,
            end_frame: start_frame + self.asset.frames(),
        };
        debug!(start, active = self.segments.len() + 1, "segment scheduled");
        self.segments.push(segment);
        Ok(())
    }

    /// Drop segments that have fully played out.
    pub fn prune(&mut self) {
        let now = self.frames_rendered;
        self.segments.retain(|s| s.end_frame > now);
    }

    /// Segments scheduled and not yet finished.
    pub fn active_segments(&self) -> usize {
        let now = self.frames_rendered;
        self.segments.iter().filter(|s| s.end_frame > now).count()
    }

    /// Start times (seconds) of live segments, for diagnostics and tests.
    pub fn segment_starts(&self) -> Vec<f64> {
        self.segments
            .iter()
            .map(|s| s.start_frame as f64 / self.sample_rate as f64)
            .collect()
    }

    /// Truncate every segment to end at `at` seconds (typically now plus a
    /// small epsilon). Does not block; truncated tails vanish on render.
    pub fn stop_all(&mut self, at: f64) {
        let cutoff = self.frame_at(at);
        for segment in &mut self.segments {
            if segment.end_frame > cutoff {
                segment.end_frame = cutoff.max(segment.start_frame);
            }
        }
    }

    pub fn set_gain(&mut self, v: f32) {
        self.gain.set_value(v);
    }

    pub fn ramp_gain(&mut self, target: f32, duration: f64) {
        let now = self.now();
        self.gain.ramp_to(target, now, duration);
    }

    /// Gain value at the current clock time.
    pub fn gain_value(&self) -> f32 {
        self.gain.value_at(self.now())
    }

    /// Gain value once any in-flight ramp settles.
    pub fn gain_target(&self) -> f32 {
        self.gain.target()
    }

    /// Attach the analyser tap in parallel off the gain output. Existing
    /// playback is unaffected; rendered frames are forwarded from now on.
    pub fn attach_tap(&mut self, analyser: Arc<Analyser>) {
        if self.tap.is_some() {
            warn!("analyser tap already attached");
            return;
        }
        self.tap = Some(analyser);
    }

    /// Render interleaved stereo frames, advancing the graph clock.
    ///
    /// Sums overlapping segments, applies the gain curve per frame, clamps
    /// to [-1, 1], and feeds the tap. Regions with no active segment are
    /// silence.
    pub fn render(&mut self, out: &mut [f32]) {
        let frames = out.len() / 2;
        let inv_rate = 1.0 / self.sample_rate as f64;

        for i in 0..frames {
            let frame_idx = self.frames_rendered + i as u64;
            let t = frame_idx as f64 * inv_rate;
            let g = self.gain.value_at(t);

            let mut left = 0.0f32;
            let mut right = 0.0f32;
            for segment in &self.segments {
                if frame_idx >= segment.start_frame && frame_idx < segment.end_frame {
                    let (l, r) = self.asset.frame(frame_idx - segment.start_frame);
                    left += l;
                    right += r;
                }
            }

            let left = (left * g).clamp(-1.0, 1.0);
            let right = (right * g).clamp(-1.0, 1.0);
            out[i * 2] = left;
            out[i * 2 + 1] = right;

            if let Some(tap) = &self.tap {
                tap.push_frame(left, right);
            }
        }

        self.frames_rendered += frames as u64;
        self.prune();
    }

    fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }
}
