//! Audio output backends
//!
//! The engine speaks to hardware through [`AudioBackend`], which opens the
//! two audible tiers: a buffer graph pulled by a device callback, and a
//! self-contained looping element. Production uses cpal; tests inject a
//! backend that renders on demand.

use std::sync::{Arc, Mutex};

use crate::audio::asset::AudioAsset;
use crate::engine::graph::BufferGraph;
use crate::engine::tier::TierOutput;
use crate::error::Result;

pub mod device;

pub use device::CpalBackend;

/// Control handle for the device stream driving a buffer graph.
pub trait StreamControl: Send + Sync {
    /// Ask a suspended stream to start (or keep) running. Platforms that
    /// gate output on user engagement resume here.
    fn resume(&self) -> Result<()>;

    /// Whether the stream has reported an unrecoverable error. Polled by
    /// the scheduler each tick.
    fn has_error(&self) -> bool;
}

/// A live buffer-scheduled graph and the stream pulling from it.
#[derive(Clone)]
pub struct GraphConn {
    pub graph: Arc<Mutex<BufferGraph>>,
    pub stream: Arc<dyn StreamControl>,
}

/// Factory for tier outputs. Methods are synchronous and may block on
/// device negotiation; the engine calls them from a blocking task.
pub trait AudioBackend: Send + Sync {
    /// Open the buffer-scheduled graph tier for `asset`.
    fn open_graph(
        &self,
        asset: Arc<AudioAsset>,
        initial_gain: f32,
        max_segments: usize,
    ) -> Result<GraphConn>;

    /// Open the looping fallback element. `asset` is the decoded audio when
    /// available; backends that cannot play without it report an error and
    /// the ladder proceeds to silent.
    fn open_element(
        &self,
        asset: Option<Arc<AudioAsset>>,
        volume: f32,
    ) -> Result<Arc<dyn TierOutput>>;
}
