//! Ambient engine orchestration
//!
//! Owns the capability ladder, the asset loader, and the fade/intent logic
//! on top of whichever tier is live. The public surface is intent-based:
//! callers say what they want (playing, a volume, a fade) and the engine
//! reconciles that against engagement gating and the current tier. Playback
//! failures never surface to callers; they feed the ladder instead.
//!
//! Construction requires a tokio runtime: the ladder listener is spawned at
//! build time and the scheduler per playback run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::analyser::Analyser;
use crate::audio::{AssetFetcher, AssetLoader, HttpFetcher};
use crate::config::{
    EngineConfig, ELEMENT_FADE_STEP, RAMP_EPSILON, SET_VOLUME_RAMP_SECS, STOP_EPSILON_SECS,
};
use crate::engine::scheduler::{self, LadderSignal, SchedulerHandle};
use crate::engine::tier::{Tier, TierOutput};
use crate::output::{AudioBackend, GraphConn};
use crate::state::{EngineStatus, SharedState};

struct Inner {
    config: EngineConfig,
    backend: Arc<dyn AudioBackend>,
    state: SharedState,
    loader: tokio::sync::Mutex<AssetLoader>,
    graph: Mutex<Option<GraphConn>>,
    element: Mutex<Option<Arc<dyn TierOutput>>>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    analyser: Mutex<Option<Arc<Analyser>>>,
    /// Generation counter for fades. Any volume-affecting call bumps it,
    /// orphaning the completion tasks of earlier fades (last write wins).
    fade_epoch: AtomicU64,
    /// Fade-in to apply once playback actually starts, covering the
    /// deferred-start case where `fade_in` precedes user engagement.
    pending_fade_in: Mutex<Option<Duration>>,
    ladder_tx: mpsc::UnboundedSender<LadderSignal>,
}

impl Inner {
    fn bump_epoch(&self) -> u64 {
        self.fade_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn epoch(&self) -> u64 {
        self.fade_epoch.load(Ordering::SeqCst)
    }

    fn graph_conn(&self) -> Option<GraphConn> {
        self.graph.lock().unwrap().clone()
    }

    fn current_element(&self) -> Option<Arc<dyn TierOutput>> {
        self.element.lock().unwrap().clone()
    }

    fn cancel_scheduler(&self) {
        if let Some(handle) = self.scheduler.lock().unwrap().take() {
            handle.cancel();
        }
    }

    /// Stop sound on whatever tier is live. Keeps tier and desired state
    /// untouched; callers decide those.
    fn halt_playback(&self) {
        self.state.set_playing(false);
        self.cancel_scheduler();
        *self.pending_fade_in.lock().unwrap() = None;

        if let Some(conn) = self.graph_conn() {
            let mut graph = conn.graph.lock().unwrap();
            let cutoff = graph.now() + STOP_EPSILON_SECS;
            graph.stop_all(cutoff);
        }
        if let Some(element) = self.current_element() {
            element.stop();
        }
    }
}

/// Looping ambient playback engine. Cheap to clone; all clones share one
/// underlying engine.
#[derive(Clone)]
pub struct AmbientEngine {
    inner: Arc<Inner>,
}

impl AmbientEngine {
    /// Build an engine fetching the configured asset over HTTP.
    pub fn new(config: EngineConfig, backend: Arc<dyn AudioBackend>) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(config.asset_url.clone()));
        Self::with_fetcher(config, backend, fetcher)
    }

    /// Build an engine with an injected fetcher.
    pub fn with_fetcher(
        config: EngineConfig,
        backend: Arc<dyn AudioBackend>,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Self {
        let (ladder_tx, mut ladder_rx) = mpsc::unbounded_channel();
        let loader = AssetLoader::new(fetcher, &config);
        let state = SharedState::new(config.default_volume);

        let inner = Arc::new(Inner {
            config,
            backend,
            state,
            loader: tokio::sync::Mutex::new(loader),
            graph: Mutex::new(None),
            element: Mutex::new(None),
            scheduler: Mutex::new(None),
            analyser: Mutex::new(None),
            fade_epoch: AtomicU64::new(0),
            pending_fade_in: Mutex::new(None),
            ladder_tx,
        });

        // Ladder listener: background failures arrive here so the public
        // API stays infallible. Weak reference so the engine can drop.
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(signal) = ladder_rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                let engine = AmbientEngine { inner };
                match signal {
                    LadderSignal::GraphFailed => engine.downgrade_to_element().await,
                    LadderSignal::ElementFailed => engine.downgrade_to_silent(),
                }
            }
        });

        AmbientEngine { inner }
    }

    /// Express the intent to play. Before user engagement this only records
    /// the intent; sound starts on `enable_user_interaction`.
    pub async fn play(&self) {
        self.inner.state.set_desired_playing(true);
        if !self.inner.state.engaged() {
            debug!("play deferred until user engagement");
            return;
        }
        self.start().await;
    }

    /// Stop playback immediately (within the stop epsilon) and clear the
    /// playing intent. Idempotent.
    pub fn stop(&self) {
        self.inner.state.set_desired_playing(false);
        self.inner.bump_epoch();
        self.inner.halt_playback();
    }

    /// Suspend playback. Equivalent to `stop`; `resume` starts again.
    pub fn pause(&self) {
        self.stop();
    }

    /// Resume after a `pause` or `stop`.
    pub async fn resume(&self) {
        self.play().await;
    }

    /// Set the desired volume. On the buffer tier this ramps smoothly over
    /// a short interval; the element tier jumps.
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.inner.state.set_desired_volume(volume);
        self.inner.bump_epoch();
        *self.inner.pending_fade_in.lock().unwrap() = None;

        match self.inner.state.tier() {
            Tier::BufferScheduled => {
                if let Some(conn) = self.inner.graph_conn() {
                    conn.graph
                        .lock()
                        .unwrap()
                        .ramp_gain(volume, SET_VOLUME_RAMP_SECS);
                }
            }
            Tier::ElementFallback => {
                if let Some(element) = self.inner.current_element() {
                    element.set_volume(volume);
                }
            }
            Tier::Silent => {}
        }
    }

    /// Start playback rising from silence to the desired volume over
    /// `duration`. Before engagement the fade is remembered and applied
    /// when playback actually starts.
    pub async fn fade_in(&self, duration: Duration) {
        self.inner.state.set_desired_playing(true);
        self.inner.bump_epoch();
        *self.inner.pending_fade_in.lock().unwrap() = Some(duration);

        if !self.inner.state.engaged() {
            debug!("fade-in deferred until user engagement");
            return;
        }
        self.start().await;
    }

    /// Fade to silence over `duration`, then stop and clear the playing
    /// intent. A later fade or volume call supersedes the pending stop.
    pub fn fade_out(&self, duration: Duration) {
        let epoch = self.inner.bump_epoch();
        *self.inner.pending_fade_in.lock().unwrap() = None;

        if !self.inner.state.playing() {
            self.inner.state.set_desired_playing(false);
            return;
        }

        if let Some(conn) = self.inner.graph_conn() {
            conn.graph
                .lock()
                .unwrap()
                .ramp_gain(RAMP_EPSILON, duration.as_secs_f64());
        } else if let Some(element) = self.inner.current_element() {
            let from = self.inner.state.desired_volume();
            self.spawn_element_fade(element, from, 0.0, duration, epoch);
        }

        // Completion: stop once the fade has played out, unless something
        // newer took over the volume in the meantime.
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let Some(inner) = weak.upgrade() else { return };
            if inner.epoch() != epoch {
                return;
            }
            inner.state.set_desired_playing(false);
            inner.halt_playback();

            // Leave the gain back at the desired level so a plain `play`
            // later is audible.
            let desired = inner.state.desired_volume();
            if let Some(conn) = inner.graph_conn() {
                conn.graph.lock().unwrap().set_gain(desired);
            }
            if let Some(element) = inner.current_element() {
                element.set_volume(desired);
            }
        });
    }

    /// Record the one-time user engagement and start playback if it was
    /// requested while the engine was still gated.
    pub async fn enable_user_interaction(&self) {
        if !self.inner.state.engaged() {
            info!("user engagement recorded");
            self.inner.state.set_engaged();
        }

        if let Some(conn) = self.inner.graph_conn() {
            if let Err(e) = conn.stream.resume() {
                warn!(error = %e, "output stream resume failed");
            }
        }

        if self.inner.state.desired_playing() && !self.inner.state.playing() {
            self.start().await;
        }
    }

    /// Whether sound is actually flowing right now, on any audible tier.
    pub fn is_currently_playing(&self) -> bool {
        self.inner.state.playing()
    }

    /// Frequency analyser tapping post-gain output. Only available while
    /// the buffer graph tier is live; repeated calls return the same
    /// instance.
    pub fn analyser(&self) -> Option<Arc<Analyser>> {
        let mut slot = self.inner.analyser.lock().unwrap();
        if let Some(analyser) = slot.as_ref() {
            return Some(Arc::clone(analyser));
        }

        let conn = self.inner.graph_conn()?;
        let analyser = Analyser::new();
        conn.graph.lock().unwrap().attach_tap(Arc::clone(&analyser));
        *slot = Some(Arc::clone(&analyser));
        Some(analyser)
    }

    /// Point-in-time snapshot for debug surfaces.
    pub fn status(&self) -> EngineStatus {
        self.inner.state.status()
    }

    /// Start (or restart) playback on the current tier.
    async fn start(&self) {
        if self.inner.state.playing() {
            // Already audible; honor any freshly requested fade.
            self.apply_pending_fade();
            return;
        }
        match self.inner.state.tier() {
            Tier::BufferScheduled => self.start_buffer().await,
            Tier::ElementFallback => self.start_element().await,
            Tier::Silent => debug!("play ignored on silent tier"),
        }
    }

    async fn start_buffer(&self) {
        let conn = match self.inner.graph_conn() {
            Some(conn) => conn,
            None => match self.open_graph().await {
                Some(conn) => conn,
                None => return,
            },
        };

        if self.inner.pending_fade_in.lock().unwrap().is_none() {
            let desired = self.inner.state.desired_volume();
            conn.graph.lock().unwrap().set_gain(desired);
        }

        let handle = scheduler::spawn(
            Arc::clone(&conn.graph),
            Arc::clone(&conn.stream),
            &self.inner.config,
            self.inner.ladder_tx.clone(),
        );
        if let Some(old) = self.inner.scheduler.lock().unwrap().replace(handle) {
            old.cancel();
        }

        if let Err(e) = conn.stream.resume() {
            warn!(error = %e, "output stream resume failed");
        }

        self.inner.state.set_playing(true);
        self.apply_pending_fade();
    }

    /// Load the asset and open the device graph, downgrading on failure.
    async fn open_graph(&self) -> Option<GraphConn> {
        let asset = {
            let mut loader = self.inner.loader.lock().await;
            match loader.load().await {
                Ok(asset) => asset,
                Err(e) => {
                    if loader.exhausted() {
                        drop(loader);
                        warn!(error = %e, "asset load abandoned, falling back");
                        self.downgrade_to_element().await;
                    } else {
                        warn!(error = %e, "asset load failed, will retry on next play");
                    }
                    return None;
                }
            }
        };

        let backend = Arc::clone(&self.inner.backend);
        let gain = self.inner.state.desired_volume();
        let max_segments = self.inner.config.max_concurrent_segments(asset.duration());

        let opened = tokio::task::spawn_blocking(move || {
            backend.open_graph(asset, gain, max_segments)
        })
        .await;

        match opened {
            Ok(Ok(conn)) => {
                if let Some(analyser) = self.inner.analyser.lock().unwrap().as_ref() {
                    conn.graph.lock().unwrap().attach_tap(Arc::clone(analyser));
                }
                *self.inner.graph.lock().unwrap() = Some(conn.clone());
                Some(conn)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "buffer graph unavailable, falling back");
                self.downgrade_to_element().await;
                None
            }
            Err(e) => {
                warn!(error = %e, "graph setup task failed, falling back");
                self.downgrade_to_element().await;
                None
            }
        }
    }

    async fn start_element(&self) {
        let element = match self.inner.current_element() {
            Some(element) => element,
            None => match self.open_element().await {
                Some(element) => element,
                None => return,
            },
        };

        if self.inner.pending_fade_in.lock().unwrap().is_none() {
            element.set_volume(self.inner.state.desired_volume());
        }

        if let Err(e) = element.play() {
            warn!(error = %e, "fallback element failed to play, going silent");
            self.downgrade_to_silent();
            return;
        }

        self.inner.state.set_playing(true);
        self.spawn_element_watchdog(Arc::clone(&element));
        self.apply_pending_fade();
    }

    /// Poll the element for mid-playback death, mirroring how the
    /// scheduler polls the device stream. Exits once the element tier is
    /// no longer the one playing.
    fn spawn_element_watchdog(&self, element: Arc<dyn TierOutput>) {
        let weak = Arc::downgrade(&self.inner);
        let tick = self.inner.config.tick_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { return };
                if !inner.state.playing() || inner.state.tier() != Tier::ElementFallback {
                    return;
                }
                if element.has_error() {
                    warn!("fallback element reported an error, requesting silence");
                    let _ = inner.ladder_tx.send(LadderSignal::ElementFailed);
                    return;
                }
            }
        });
    }

    async fn open_element(&self) -> Option<Arc<dyn TierOutput>> {
        // The cpal element plays the decoded asset, so when no load ever
        // succeeded it has nothing to open and the ladder ends at silent.
        // A backend that streams the URL itself can ignore the None.
        let asset = self.inner.loader.lock().await.cached();
        let backend = Arc::clone(&self.inner.backend);
        let volume = self.inner.state.desired_volume();

        let opened =
            tokio::task::spawn_blocking(move || backend.open_element(asset, volume)).await;

        match opened {
            Ok(Ok(element)) => {
                *self.inner.element.lock().unwrap() = Some(Arc::clone(&element));
                Some(element)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "fallback element unavailable, going silent");
                self.downgrade_to_silent();
                None
            }
            Err(e) => {
                warn!(error = %e, "element setup task failed, going silent");
                self.downgrade_to_silent();
                None
            }
        }
    }

    /// Tear down the buffer tier and continue on the fallback element if
    /// playback is still wanted.
    async fn downgrade_to_element(&self) {
        self.inner.cancel_scheduler();
        self.inner.state.set_playing(false);
        // Dropping the connection shuts the device stream down. The
        // analyser rode that graph, so it goes too; a handle kept by a
        // visualizer would otherwise read a frozen spectrum as live.
        *self.inner.graph.lock().unwrap() = None;
        *self.inner.analyser.lock().unwrap() = None;

        if self.inner.state.downgrade(Tier::ElementFallback) != Tier::ElementFallback {
            return;
        }

        if self.inner.state.desired_playing() && self.inner.state.engaged() {
            self.start_element().await;
        }
    }

    fn downgrade_to_silent(&self) {
        self.inner.cancel_scheduler();
        self.inner.state.set_playing(false);
        *self.inner.graph.lock().unwrap() = None;
        *self.inner.analyser.lock().unwrap() = None;
        *self.inner.element.lock().unwrap() = None;
        self.inner.state.downgrade(Tier::Silent);
    }

    /// Apply a remembered fade-in now that playback is audible.
    fn apply_pending_fade(&self) {
        let Some(duration) = self.inner.pending_fade_in.lock().unwrap().take() else {
            return;
        };
        let desired = self.inner.state.desired_volume();

        if let Some(conn) = self.inner.graph_conn() {
            let mut graph = conn.graph.lock().unwrap();
            graph.set_gain(RAMP_EPSILON);
            graph.ramp_gain(desired, duration.as_secs_f64());
        } else if let Some(element) = self.inner.current_element() {
            element.set_volume(0.0);
            let epoch = self.inner.epoch();
            self.spawn_element_fade(element, 0.0, desired, duration, epoch);
        }
    }

    /// Linear stepped fade for the element tier, which has no ramp
    /// automation of its own. Aborts when the epoch moves on.
    fn spawn_element_fade(
        &self,
        element: Arc<dyn TierOutput>,
        from: f32,
        to: f32,
        duration: Duration,
        epoch: u64,
    ) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let steps = (duration.as_millis() / ELEMENT_FADE_STEP.as_millis()).max(1) as u32;
            for step in 1..=steps {
                tokio::time::sleep(ELEMENT_FADE_STEP).await;
                let Some(inner) = weak.upgrade() else { return };
                if inner.epoch() != epoch {
                    return;
                }
                let v = from + (to - from) * (step as f32 / steps as f32);
                element.set_volume(v);
            }
        });
    }
}
