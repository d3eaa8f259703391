//! Capability fallback ladder
//!
//! Three tiers, downgraded forward-only within one engine instance:
//! buffer-scheduled graph, single looping fallback element, silence. The
//! ladder consolidates what were historically near-duplicate playback
//! implementations into one tagged state machine; each live tier exposes
//! the same capability surface ([`TierOutput`]) so fades and volume behave
//! consistently across tiers.

use std::fmt;

use serde::Serialize;

use crate::error::Result;

/// Playback capability tier. Ordering matters: downgrades only move to
/// greater variants, and a fresh engine is the only path back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Lookahead-scheduled segments through the buffer graph.
    BufferScheduled,
    /// One continuously looping output element.
    ElementFallback,
    /// Terminal for the session; `play()` stays a silent no-op.
    Silent,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::BufferScheduled => "buffer_scheduled",
            Tier::ElementFallback => "element_fallback",
            Tier::Silent => "silent",
        };
        f.write_str(name)
    }
}

/// Capability surface every audible tier implements.
///
/// The buffer tier routes `set_volume` through the shared gain ramp; the
/// element tier sets a linear volume property. Both honor the same desired
/// volume so fades read the same to the listener.
pub trait TierOutput: Send + Sync {
    /// Begin (or resume) producing sound. Errors feed the ladder, never the
    /// public API.
    fn play(&self) -> Result<()>;

    /// Stop producing sound. Must not block.
    fn stop(&self);

    /// Apply a volume intent in [0, 1].
    fn set_volume(&self, v: f32);

    /// Whether the output has died since `play`. Polled by the engine so a
    /// mid-playback failure downgrades without waiting for the next call.
    fn has_error(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::BufferScheduled < Tier::ElementFallback);
        assert!(Tier::ElementFallback < Tier::Silent);
    }

    #[test]
    fn test_tier_serializes_snake_case() {
        let json = serde_json::to_string(&Tier::ElementFallback).unwrap();
        assert_eq!(json, "\"element_fallback\"");
    }
}
