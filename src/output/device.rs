//! cpal-backed output devices
//!
//! cpal streams are not `Send`, so each stream lives on a dedicated thread
//! that owns it for its whole life. The opener handshakes the build result
//! back over a channel; afterwards the thread just services resume and
//! shutdown commands while the device callback pulls samples.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use tracing::{debug, error, info, warn};

use crate::audio::asset::AudioAsset;
use crate::engine::graph::BufferGraph;
use crate::engine::tier::TierOutput;
use crate::error::{Error, Result};
use crate::output::{AudioBackend, GraphConn, StreamControl};

enum StreamCommand {
    Resume,
    Shutdown,
}

/// Handle to a stream thread. Dropping it shuts the stream down.
struct StreamHandle {
    commands: mpsc::Sender<StreamCommand>,
    error_flag: Arc<AtomicBool>,
}

impl StreamControl for StreamHandle {
    fn resume(&self) -> Result<()> {
        self.commands
            .send(StreamCommand::Resume)
            .map_err(|_| Error::DeviceUnavailable("stream thread has exited".to_string()))
    }

    fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(StreamCommand::Shutdown);
    }
}

/// Pick a playback configuration, preferring 44.1kHz stereo f32 to match
/// the internal sample format.
fn get_best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::DeviceUnavailable(format!("failed to get device configs: {e}")))?;

    let preferred = supported.find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= 44_100
            && config.max_sample_rate().0 >= 44_100
            && config.sample_format() == SampleFormat::F32
    });

    if let Some(config) = preferred {
        let sample_format = config.sample_format();
        let config = config.with_sample_rate(cpal::SampleRate(44_100)).config();
        return Ok((config, sample_format));
    }

    let config = device
        .default_output_config()
        .map_err(|e| Error::DeviceUnavailable(format!("failed to get default config: {e}")))?;
    let sample_format = config.sample_format();
    Ok((config.config(), sample_format))
}

/// Spawn a thread that owns a cpal stream fed by `render`, which fills
/// interleaved stereo f32 frames. Blocks until the stream is live or the
/// build failed.
fn spawn_stream_thread<F>(render: F) -> Result<Arc<StreamHandle>>
where
    F: FnMut(&mut [f32]) + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
    let (cmd_tx, cmd_rx) = mpsc::channel::<StreamCommand>();
    let error_flag = Arc::new(AtomicBool::new(false));
    let thread_error_flag = Arc::clone(&error_flag);

    thread::Builder::new()
        .name("riverloop-output".to_string())
        .spawn(move || {
            let stream = match build_stream(render, thread_error_flag) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(Error::DeviceUnavailable(format!(
                    "failed to start stream: {e}"
                ))));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Hold the stream alive until shutdown; resume requests come
            // through here because the stream itself cannot leave this
            // thread.
            while let Ok(command) = cmd_rx.recv() {
                match command {
                    StreamCommand::Resume => {
                        if let Err(e) = stream.play() {
                            warn!("stream resume failed: {e}");
                        }
                    }
                    StreamCommand::Shutdown => break,
                }
            }
            debug!("output stream thread exiting");
        })
        .map_err(|e| Error::DeviceUnavailable(format!("failed to spawn stream thread: {e}")))?;

    ready_rx
        .recv()
        .map_err(|_| Error::DeviceUnavailable("stream thread died during setup".to_string()))??;

    Ok(Arc::new(StreamHandle {
        commands: cmd_tx,
        error_flag,
    }))
}

fn build_stream<F>(render: F, error_flag: Arc<AtomicBool>) -> Result<cpal::Stream>
where
    F: FnMut(&mut [f32]) + Send + 'static,
{
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::DeviceUnavailable("no default output device".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());
    let (config, sample_format) = get_best_config(&device)?;

    info!(
        device = %name,
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        format = ?sample_format,
        "opening output stream"
    );

    let channels = config.channels as usize;
    let render = Arc::new(Mutex::new(render));

    let stream = match sample_format {
        SampleFormat::F32 => {
            let render = Arc::clone(&render);
            let error_flag = Arc::clone(&error_flag);
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut render = render.lock().unwrap();
                    let frames = data.len() / channels;
                    let mut stereo = vec![0.0f32; frames * 2];
                    (*render)(&mut stereo);
                    for (i, frame) in data.chunks_mut(channels).enumerate() {
                        write_frame(frame, stereo[i * 2], stereo[i * 2 + 1]);
                    }
                },
                move |err| {
                    error!("audio stream error: {err}");
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
        }
        SampleFormat::I16 => {
            let render = Arc::clone(&render);
            let error_flag = Arc::clone(&error_flag);
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mut render = render.lock().unwrap();
                    let frames = data.len() / channels;
                    let mut stereo = vec![0.0f32; frames * 2];
                    (*render)(&mut stereo);
                    for (i, frame) in data.chunks_mut(channels).enumerate() {
                        let left =
                            (stereo[i * 2].clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        let right =
                            (stereo[i * 2 + 1].clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        frame[0] = left;
                        if channels > 1 {
                            frame[1] = right;
                        }
                        for extra in frame.iter_mut().skip(2) {
                            *extra = 0;
                        }
                    }
                },
                move |err| {
                    error!("audio stream error: {err}");
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
        }
        other => {
            return Err(Error::DeviceUnavailable(format!(
                "unsupported sample format: {other:?}"
            )));
        }
    }
    .map_err(|e| Error::DeviceUnavailable(format!("failed to build stream: {e}")))?;

    Ok(stream)
}

fn write_frame(frame: &mut [f32], left: f32, right: f32) {
    if frame.len() == 1 {
        frame[0] = (left + right) * 0.5;
        return;
    }
    frame[0] = left;
    frame[1] = right;
    for extra in frame.iter_mut().skip(2) {
        *extra = 0.0;
    }
}

/// Production backend speaking to the default cpal host.
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn open_graph(
        &self,
        asset: Arc<AudioAsset>,
        initial_gain: f32,
        max_segments: usize,
    ) -> Result<GraphConn> {
        let graph = Arc::new(Mutex::new(BufferGraph::new(
            asset,
            initial_gain,
            max_segments,
        )?));

        let callback_graph = Arc::clone(&graph);
        let stream = spawn_stream_thread(move |out: &mut [f32]| {
            callback_graph.lock().unwrap().render(out);
        })?;

        Ok(GraphConn { graph, stream })
    }

    fn open_element(
        &self,
        asset: Option<Arc<AudioAsset>>,
        volume: f32,
    ) -> Result<Arc<dyn TierOutput>> {
        let asset = asset.ok_or_else(|| {
            Error::ElementPlayback("no decoded asset for fallback element".to_string())
        })?;
        Ok(Arc::new(CpalLoopElement::new(asset, volume)))
    }
}

/// Fallback element: one endlessly looping voice with a linear volume
/// property. Opens its stream lazily on the first `play`.
struct CpalLoopElement {
    asset: Arc<AudioAsset>,
    paused: Arc<AtomicBool>,
    volume: Arc<Mutex<f32>>,
    stream: Mutex<Option<Arc<StreamHandle>>>,
}

impl CpalLoopElement {
    fn new(asset: Arc<AudioAsset>, volume: f32) -> Self {
        Self {
            asset,
            paused: Arc::new(AtomicBool::new(true)),
            volume: Arc::new(Mutex::new(volume.clamp(0.0, 1.0))),
            stream: Mutex::new(None),
        }
    }
}

impl TierOutput for CpalLoopElement {
    fn play(&self) -> Result<()> {
        let mut stream = self.stream.lock().unwrap();
        self.paused.store(false, Ordering::SeqCst);

        if let Some(handle) = stream.as_ref() {
            if handle.has_error() {
                return Err(Error::ElementPlayback(
                    "fallback stream reported an error".to_string(),
                ));
            }
            return handle.resume();
        }

        let asset = Arc::clone(&self.asset);
        let paused = Arc::clone(&self.paused);
        let volume = Arc::clone(&self.volume);
        let mut position = 0u64;
        let total = asset.frames();

        let handle = spawn_stream_thread(move |out: &mut [f32]| {
            if paused.load(Ordering::SeqCst) || total == 0 {
                out.fill(0.0);
                return;
            }
            let v = *volume.lock().unwrap();
            for frame in out.chunks_mut(2) {
                let (l, r) = asset.frame(position);
                frame[0] = l * v;
                frame[1] = r * v;
                position = (position + 1) % total;
            }
        })
        .map_err(|e| Error::ElementPlayback(format!("fallback stream failed: {e}")))?;

        *stream = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn set_volume(&self, v: f32) {
        *self.volume.lock().unwrap() = v.clamp(0.0, 1.0);
    }

    fn has_error(&self) -> bool {
        self.stream
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| handle.has_error())
    }
}
