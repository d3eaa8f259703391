//! Engine configuration
//!
//! All playback tuning is fixed at construction time: the engine loops one
//! known asset and is not runtime-tunable. The demo binary may override the
//! asset URL and default volume via CLI flags.

use std::time::Duration;

/// Floor for exponential gain ramps. Multiplicative ramps are undefined at
/// zero, so every ramp endpoint is clamped to at least this value.
pub const RAMP_EPSILON: f32 = 1.0e-4;

/// Ramp length used by `set_volume` transitions.
pub const SET_VOLUME_RAMP_SECS: f64 = 0.2;

/// Pending segments are stopped this far past "now" rather than exactly at
/// it, so in-flight render blocks do not click.
pub const STOP_EPSILON_SECS: f64 = 0.1;

/// Step interval for the fallback element's linear volume fades.
pub const ELEMENT_FADE_STEP: Duration = Duration::from_millis(50);

/// Ambient engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// URL of the single ambient asset.
    pub asset_url: String,

    /// Volume applied when the host never calls `set_volume` (0.0-1.0).
    pub default_volume: f32,

    /// Overlap between consecutive loop segments, in seconds. Masks timing
    /// jitter at the seam; the asset itself must loop cleanly at its own
    /// boundary (the overlap smooths timing, not content).
    pub crossfade_overlap: f64,

    /// How far ahead of the engine clock segments are scheduled, in seconds.
    pub schedule_ahead: f64,

    /// Scheduler tick interval while playing.
    pub tick_interval: Duration,

    /// Bound on the asset fetch.
    pub fetch_timeout: Duration,

    /// Total load attempts before the ladder downgrades (retried lazily on
    /// the next `play`, never via an internal timer).
    pub max_load_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset_url: "https://hebbkx1anhila5yf.public.blob.vercel-storage.com/river-water-stream-sound-effect-330575-QnOe2wstTAXFVNVCjJ5nklnx2FUbRM.mp3".to_string(),
            default_volume: 0.25,
            crossfade_overlap: 2.0,
            schedule_ahead: 0.2,
            tick_interval: Duration::from_millis(25),
            fetch_timeout: Duration::from_secs(10),
            max_load_retries: 3,
        }
    }
}

impl EngineConfig {
    /// File-extension hint for the decoder probe, derived from the URL path.
    pub fn asset_hint_ext(&self) -> Option<String> {
        let path = self.asset_url.split(&['?', '#'][..]).next().unwrap_or("");
        let ext = path.rsplit('.').next()?;
        if ext.len() <= 4 && !ext.contains('/') {
            Some(ext.to_ascii_lowercase())
        } else {
            None
        }
    }

    /// Upper bound on concurrently scheduled segments for a given asset
    /// duration: `ceil(dur / (dur - crossfade)) + 1`.
    pub fn max_concurrent_segments(&self, asset_duration: f64) -> usize {
        let step = asset_duration - self.crossfade_overlap;
        if step <= 0.0 {
            return 2;
        }
        (asset_duration / step).ceil() as usize + 1
    }
}
