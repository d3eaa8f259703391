//! Host integration policy
//!
//! The engine itself is policy-free; this module carries the conventions a
//! host typically wants around it: a persisted mute preference (defaulting
//! to muted, so first-time visitors hear nothing until they opt in), and a
//! route policy that ducks the ambience on screens with their own audio.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::AmbientEngine;

/// Fade lengths for route transitions: quick out when entering a silenced
/// route, slow back in when leaving.
const ROUTE_FADE_OUT: Duration = Duration::from_millis(500);
const ROUTE_FADE_IN: Duration = Duration::from_secs(1);

/// Leaving a silenced route waits this long before fading back in, so
/// rapid navigation does not flutter the volume.
const ROUTE_DEBOUNCE: Duration = Duration::from_millis(200);

/// Fade length for mute toggles.
const MUTE_FADE: Duration = Duration::from_millis(300);

/// Storage key (file stem) for the persisted mute preference.
pub const MUTE_PREF_KEY: &str = "audio-muted";

/// Persisted mute preference. Absent or unreadable state means muted:
/// first contact must opt in explicitly.
pub struct MutePreference {
    path: PathBuf,
}

impl MutePreference {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> bool {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<bool>(raw.trim()) {
                Ok(muted) => muted,
                Err(e) => {
                    warn!(error = %e, "mute preference unreadable, defaulting to muted");
                    true
                }
            },
            Err(_) => true,
        }
    }

    pub fn store(&self, muted: bool) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, serde_json::to_string(&muted).unwrap_or_default())
        {
            warn!(error = %e, "failed to persist mute preference");
        }
    }
}

/// Flip the persisted mute state and fade accordingly. Unmuting counts as
/// an engagement gesture.
pub async fn toggle_mute(engine: &AmbientEngine, pref: &MutePreference, muted: bool) {
    pref.store(muted);
    if muted {
        engine.fade_out(MUTE_FADE);
    } else {
        engine.enable_user_interaction().await;
        engine.fade_in(MUTE_FADE).await;
    }
}

/// Fades the ambience out on routes that carry their own audio and back in
/// when leaving them.
pub struct RoutePolicy {
    silenced_prefixes: Vec<String>,
    /// Bumped on every route change so a stale debounce never fades in.
    epoch: Arc<AtomicU64>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new(vec!["/music".to_string()])
    }
}

impl RoutePolicy {
    pub fn new(silenced_prefixes: Vec<String>) -> Self {
        Self {
            silenced_prefixes,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether the ambience should be silent on `path`.
    pub fn is_silenced(&self, path: &str) -> bool {
        self.silenced_prefixes
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{prefix}/")))
    }

    /// React to the host navigating to `path`. Entering a silenced route
    /// (or being muted) fades out promptly; leaving fades back in after a
    /// short debounce.
    pub fn on_route_change(&self, engine: &AmbientEngine, path: &str, muted: bool) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        if muted || self.is_silenced(path) {
            debug!(path, muted, "route silenced, fading out");
            engine.fade_out(ROUTE_FADE_OUT);
            return;
        }

        debug!(path, "route audible, fading in after debounce");
        let engine = engine.clone();
        let epoch_slot = Arc::clone(&self.epoch);
        tokio::spawn(async move {
            tokio::time::sleep(ROUTE_DEBOUNCE).await;
            if epoch_slot.load(Ordering::SeqCst) != epoch {
                return;
            }
            engine.fade_in(ROUTE_FADE_IN).await;
        });
    }
}
