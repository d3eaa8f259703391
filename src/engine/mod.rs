//! Playback engine
//!
//! [`core`] orchestrates intent against the capability ladder, [`graph`]
//! renders the buffer-scheduled tier, [`scheduler`] keeps the loop fed,
//! and [`gate`] adapts host gestures to the autoplay policy.

pub mod core;
pub mod gain;
pub mod gate;
pub mod graph;
pub(crate) mod scheduler;
pub mod tier;

pub use self::core::AmbientEngine;
pub use gate::EngagementSignal;
pub use tier::{Tier, TierOutput};
