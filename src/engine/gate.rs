//! Engagement gate
//!
//! Platform autoplay policy only allows sound after a deliberate user
//! gesture. The host wires [`EngagementSignal::notify`] to its gesture
//! sources (click, keypress, touch, scroll, or a CLI launch) and
//! unregisters them once [`EngagementSignal::fired`] reports true; the
//! gesture is one-shot for the process lifetime.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::engine::core::AmbientEngine;

/// One-shot adapter between host gesture sources and the engine.
pub struct EngagementSignal {
    engine: AmbientEngine,
    fired: AtomicBool,
}

impl EngagementSignal {
    pub fn new(engine: AmbientEngine) -> Self {
        Self {
            engine,
            fired: AtomicBool::new(false),
        }
    }

    /// Report a user gesture. The first call unlocks the engine; later
    /// calls are cheap no-ops so hosts need not serialize their sources.
    pub async fn notify(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("engagement gesture observed");
        self.engine.enable_user_interaction().await;
    }

    /// Whether a gesture has been observed; hosts use this to unregister
    /// their listeners.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
