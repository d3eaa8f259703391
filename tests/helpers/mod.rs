//! Shared test harness: an injectable backend whose graph is rendered by
//! the test instead of a device callback, plus canned asset fetchers.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use riverloop::audio::asset::AudioAsset;
use riverloop::audio::AssetFetcher;
use riverloop::engine::graph::BufferGraph;
use riverloop::engine::TierOutput;
use riverloop::error::{Error, Result};
use riverloop::output::{AudioBackend, GraphConn, StreamControl};
use riverloop::{AmbientEngine, EngineConfig};

/// Stream stand-in; the test renders the graph itself.
#[derive(Default)]
pub struct TestStream {
    pub error: AtomicBool,
    pub resumes: AtomicU32,
}

impl StreamControl for TestStream {
    fn resume(&self) -> Result<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn has_error(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }
}

/// Recording fallback element.
#[derive(Default)]
pub struct TestElement {
    pub playing: AtomicBool,
    pub volume: Mutex<f32>,
    pub plays: AtomicU32,
    pub fail_play: AtomicBool,
    pub error: AtomicBool,
}

impl TierOutput for TestElement {
    fn play(&self) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(Error::ElementPlayback("refused by test".to_string()));
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    fn set_volume(&self, v: f32) {
        *self.volume.lock().unwrap() = v;
    }

    fn has_error(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }
}

impl TestElement {
    pub fn volume(&self) -> f32 {
        *self.volume.lock().unwrap()
    }
}

/// Backend with switchable failures. Exposes the opened graph so tests can
/// drive the clock by rendering.
pub struct TestBackend {
    pub fail_graph: AtomicBool,
    pub fail_element: AtomicBool,
    /// Mimic the native backend, which cannot open an element without a
    /// decoded asset.
    pub element_requires_asset: AtomicBool,
    pub stream: Arc<TestStream>,
    pub element: Arc<TestElement>,
    pub last_graph: Mutex<Option<Arc<Mutex<BufferGraph>>>>,
}

impl Default for TestBackend {
    fn default() -> Self {
        Self {
            fail_graph: AtomicBool::new(false),
            fail_element: AtomicBool::new(false),
            element_requires_asset: AtomicBool::new(false),
            stream: Arc::new(TestStream::default()),
            element: Arc::new(TestElement::default()),
            last_graph: Mutex::new(None),
        }
    }
}

impl TestBackend {
    pub fn graph(&self) -> Arc<Mutex<BufferGraph>> {
        self.last_graph
            .lock()
            .unwrap()
            .clone()
            .expect("no graph opened yet")
    }

    /// Advance the graph clock by rendering, as the device callback would.
    pub fn render_secs(&self, secs: f64) {
        let graph = self.graph();
        let frames = (secs * 44_100.0) as usize;
        let mut buf = vec![0.0f32; 2048 * 2];
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(2048);
            graph.lock().unwrap().render(&mut buf[..n * 2]);
            remaining -= n;
        }
    }
}

impl AudioBackend for TestBackend {
    fn open_graph(
        &self,
        asset: Arc<AudioAsset>,
        initial_gain: f32,
        max_segments: usize,
    ) -> Result<GraphConn> {
        if self.fail_graph.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnavailable("refused by test".to_string()));
        }
        let graph = Arc::new(Mutex::new(BufferGraph::new(
            asset,
            initial_gain,
            max_segments,
        )?));
        *self.last_graph.lock().unwrap() = Some(Arc::clone(&graph));
        Ok(GraphConn {
            graph,
            stream: Arc::clone(&self.stream) as Arc<dyn StreamControl>,
        })
    }

    fn open_element(
        &self,
        asset: Option<Arc<AudioAsset>>,
        volume: f32,
    ) -> Result<Arc<dyn TierOutput>> {
        if self.fail_element.load(Ordering::SeqCst) {
            return Err(Error::ElementPlayback("refused by test".to_string()));
        }
        if self.element_requires_asset.load(Ordering::SeqCst) && asset.is_none() {
            return Err(Error::ElementPlayback(
                "no decoded asset for fallback element".to_string(),
            ));
        }
        self.element.set_volume(volume);
        Ok(Arc::clone(&self.element) as Arc<dyn TierOutput>)
    }
}

/// Fetcher serving a fixed payload.
pub struct StaticFetcher {
    pub bytes: Vec<u8>,
    pub calls: AtomicU32,
}

impl StaticFetcher {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            calls: AtomicU32::new(0),
        }
    }
}

impl AssetFetcher for StaticFetcher {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self.bytes.clone();
        Box::pin(async move { Ok(bytes) })
    }
}

/// Fetcher that always fails.
pub struct FailingFetcher;

impl AssetFetcher for FailingFetcher {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async { Err(Error::Http("connection refused".to_string())) })
    }
}

/// WAV payload of `secs` of quiet stereo tone at the engine's native rate,
/// so no resampling muddies clock math.
pub fn wav_bytes(secs: f64) -> Vec<u8> {
    let rate = 44_100u32;
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = (secs * rate as f64) as usize;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / rate as f32;
            let sample = ((std::f32::consts::TAU * 220.0 * t).sin() * 3000.0) as i16;
            writer.write_sample(sample).unwrap();
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Engine wired to a [`TestBackend`] serving a `secs`-long asset.
pub fn test_engine(secs: f64) -> (AmbientEngine, Arc<TestBackend>) {
    let backend = Arc::new(TestBackend::default());
    let fetcher = Arc::new(StaticFetcher::new(wav_bytes(secs)));
    let config = EngineConfig {
        asset_url: "https://example.com/loop.wav".to_string(),
        ..EngineConfig::default()
    };
    let engine = AmbientEngine::with_fetcher(config, Arc::clone(&backend) as _, fetcher as _);
    (engine, backend)
}

/// Engine whose asset can never load.
pub fn failing_engine() -> (AmbientEngine, Arc<TestBackend>) {
    let backend = Arc::new(TestBackend::default());
    let config = EngineConfig {
        asset_url: "https://example.com/loop.wav".to_string(),
        ..EngineConfig::default()
    };
    let engine =
        AmbientEngine::with_fetcher(config, Arc::clone(&backend) as _, Arc::new(FailingFetcher));
    (engine, backend)
}

/// Let spawned tasks (scheduler ticks, fades) make progress under paused
/// virtual time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
