//! # riverloop
//!
//! Background-ambience playback engine: one fixed remote asset, looped
//! seamlessly forever underneath a host application.
//!
//! **Purpose:** Fetch and decode a single ambient recording, loop it without
//! audible seams using lookahead segment scheduling with a crossfade overlap,
//! and route every audible transition through one shared gain parameter with
//! exponential ramps.
//!
//! **Architecture:** tokio-driven scheduler + symphonia/rubato decode path +
//! cpal output behind a backend trait, with a three-tier capability ladder
//! (buffer-scheduled graph, looping fallback element, silence).
//!
//! The engine is an explicitly constructed handle ([`AmbientEngine`]); hosts
//! wire their own gesture sources, mute persistence, and route policy around
//! it. No sequence of public API calls returns an error or panics; the only
//! user-visible failure mode is silence.

pub mod analyser;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod policy;
pub mod state;

pub use analyser::Analyser;
pub use config::EngineConfig;
pub use engine::AmbientEngine;
pub use engine::tier::Tier;
pub use error::{Error, Result};
pub use state::EngineStatus;
