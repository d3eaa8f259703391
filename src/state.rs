//! Shared engine state
//!
//! One process-wide instance per engine, mutated only through the public API
//! and read by the scheduler and tier logic. Atomics for the hot flags, a
//! mutex for the rest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::tier::Tier;

/// Point-in-time snapshot of the engine, serializable for debug surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub playing: bool,
    pub desired_playing: bool,
    pub engaged: bool,
    pub tier: Tier,
    pub volume: f32,
}

/// State shared between the public API, the scheduler, and the ladder.
pub struct SharedState {
    /// Host intent: should sound be flowing?
    desired_playing: AtomicBool,

    /// Whether the platform-required user gesture has occurred.
    engaged: AtomicBool,

    /// Whether playback is actually running on some tier.
    playing: AtomicBool,

    /// Host intent: target volume (0.0-1.0).
    desired_volume: Mutex<f32>,

    /// Current capability tier. Moves forward only.
    tier: Mutex<Tier>,
}

impl SharedState {
    pub fn new(default_volume: f32) -> Self {
        Self {
            desired_playing: AtomicBool::new(false),
            engaged: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            desired_volume: Mutex::new(default_volume.clamp(0.0, 1.0)),
            tier: Mutex::new(Tier::BufferScheduled),
        }
    }

    pub fn desired_playing(&self) -> bool {
        self.desired_playing.load(Ordering::SeqCst)
    }

    pub fn set_desired_playing(&self, v: bool) {
        self.desired_playing.store(v, Ordering::SeqCst);
    }

    pub fn engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }

    pub fn set_engaged(&self) {
        self.engaged.store(true, Ordering::SeqCst);
    }

    pub fn playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn set_playing(&self, v: bool) {
        self.playing.store(v, Ordering::SeqCst);
    }

    pub fn desired_volume(&self) -> f32 {
        *self.desired_volume.lock().unwrap()
    }

    pub fn set_desired_volume(&self, v: f32) {
        *self.desired_volume.lock().unwrap() = v.clamp(0.0, 1.0);
    }

    pub fn tier(&self) -> Tier {
        *self.tier.lock().unwrap()
    }

    /// Downgrade the capability tier. Backward transitions are ignored: a
    /// fresh engine instance is the only way back to `BufferScheduled`.
    pub fn downgrade(&self, to: Tier) -> Tier {
        let mut tier = self.tier.lock().unwrap();
        if to > *tier {
            debug!(from = %*tier, to = %to, "capability tier downgraded");
            *tier = to;
        } else if to < *tier {
            warn!(from = %*tier, to = %to, "ignoring backward tier transition");
        }
        *tier
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            playing: self.playing(),
            desired_playing: self.desired_playing(),
            engaged: self.engaged(),
            tier: self.tier(),
            volume: self.desired_volume(),
        }
    }
}
