//! Lookahead loop scheduler
//!
//! Keeps the graph supplied with overlapping segments slightly ahead of real
//! time so callback jitter never reaches the seam. Each tick (25ms while
//! playing) fills the lookahead window: segments are anchored at
//! `next_start`, which advances by `asset_duration - crossfade_overlap` so
//! consecutive loops overlap by the crossfade.
//!
//! The scheduler never surfaces failures to callers. A device error flag or
//! a scheduling failure aborts the tick loop and emits a ladder signal; the
//! engine downgrades and carries on.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::graph::BufferGraph;
use crate::output::StreamControl;

/// Signals from background tasks back to the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LadderSignal {
    /// The buffer graph or its device stopped working mid-flight.
    GraphFailed,
    /// The fallback element stopped working mid-flight.
    ElementFailed,
}

/// Handle to a running tick loop. Cancelling is fire-and-forget.
pub(crate) struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub(crate) fn cancel(&self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }
}

/// Spawn the tick loop for one playback run.
///
/// `next_start` is recomputed from the graph clock here, never resumed from
/// stale state: stopping and restarting always re-anchors at "now".
pub(crate) fn spawn(
    graph: Arc<Mutex<BufferGraph>>,
    stream: Arc<dyn StreamControl>,
    config: &EngineConfig,
    ladder_tx: mpsc::UnboundedSender<LadderSignal>,
) -> SchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let tick_interval = config.tick_interval;
    let schedule_ahead = config.schedule_ahead;
    let crossfade = config.crossfade_overlap;

    let task = tokio::spawn(async move {
        let (mut next_start, step) = {
            let g = graph.lock().unwrap();
            let duration = g.asset_duration();
            let mut step = duration - crossfade;
            if step <= 0.0 {
                // Asset shorter than the crossfade: loop back-to-back
                // instead of piling every copy onto the same instant.
                warn!(duration, crossfade, "asset shorter than crossfade overlap");
                step = duration;
            }
            (g.now(), step)
        };

        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    if stream.has_error() {
                        warn!("output stream reported an error, requesting fallback");
                        let _ = ladder_tx.send(LadderSignal::GraphFailed);
                        break;
                    }

                    let mut g = graph.lock().unwrap();
                    g.prune();
                    let horizon = g.now() + schedule_ahead;
                    while next_start < horizon {
                        if let Err(e) = g.schedule(next_start) {
                            warn!(error = %e, "segment scheduling failed, requesting fallback");
                            drop(g);
                            let _ = ladder_tx.send(LadderSignal::GraphFailed);
                            return;
                        }
                        next_start += step;
                    }
                }
            }
        }

        debug!("scheduler stopped");
    });

    SchedulerHandle {
        shutdown: shutdown_tx,
        task,
    }
}
