//! Frequency-analysis tap
//!
//! Non-destructive observer hung in parallel off the gain output. The render
//! path pushes post-gain frames into an SPSC ring; consumers (a visualizer,
//! typically) poll [`Analyser::byte_frequency_data`] at their own frame rate
//! and pair it with `is_currently_playing()` to pick live versus idle
//! rendering.
//!
//! The surface mirrors the common analyser shape: fixed FFT size, half as
//! many output bins, per-bin magnitudes smoothed over time and mapped from
//! a decibel range onto 0..=255.

use std::sync::Mutex;

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Samples per analysis window.
pub const FFT_SIZE: usize = 2048;

/// Temporal smoothing factor applied to bin magnitudes.
const SMOOTHING: f32 = 0.8;

/// Decibel range mapped onto the byte output.
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Lazily created frequency analyser. All handles returned by the engine
/// point at one instance.
pub struct Analyser {
    producer: Mutex<HeapProd<f32>>,
    consumer: Mutex<HeapCons<f32>>,
    /// Most recent `FFT_SIZE` mono samples.
    window: Mutex<Vec<f32>>,
    /// Smoothed magnitude per bin.
    smoothed: Mutex<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl Analyser {
    pub fn new() -> Arc<Self> {
        let ring = HeapRb::<f32>::new(FFT_SIZE * 4);
        let (producer, consumer) = ring.split();
        let fft = FftPlanner::new().plan_fft_forward(FFT_SIZE);
        Arc::new(Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            window: Mutex::new(vec![0.0; FFT_SIZE]),
            smoothed: Mutex::new(vec![0.0; FFT_SIZE / 2]),
            fft,
        })
    }

    /// Number of frequency bins produced.
    pub fn frequency_bin_count(&self) -> usize {
        FFT_SIZE / 2
    }

    /// Called from the render path with one post-gain stereo frame.
    /// Uses try_lock and drops samples rather than ever blocking rendering;
    /// a visualizer that polls keeps the ring drained anyway.
    pub(crate) fn push_frame(&self, left: f32, right: f32) {
        if let Ok(mut producer) = self.producer.try_lock() {
            let _ = producer.try_push((left + right) * 0.5);
        }
    }

    /// Fill `out` with smoothed spectrum magnitudes on a 0..=255 scale.
    /// `out` is truncated or zero-padded against `frequency_bin_count()`.
    pub fn byte_frequency_data(&self, out: &mut [u8]) {
        self.drain_into_window();

        let window = self.window.lock().unwrap();
        let mut buffer: Vec<Complex<f32>> = window
            .iter()
            .enumerate()
            .map(|(i, &sample)| {
                // Hann window against spectral leakage
                let w = 0.5
                    * (1.0
                        - (std::f32::consts::TAU * i as f32 / (FFT_SIZE - 1) as f32).cos());
                Complex::new(sample * w, 0.0)
            })
            .collect();
        drop(window);

        self.fft.process(&mut buffer);

        let mut smoothed = self.smoothed.lock().unwrap();
        let scale = 2.0 / FFT_SIZE as f32;
        for (bin, value) in smoothed.iter_mut().enumerate() {
            let magnitude = buffer[bin].norm() * scale;
            *value = SMOOTHING * *value + (1.0 - SMOOTHING) * magnitude;
        }

        for (i, byte) in out.iter_mut().enumerate() {
            *byte = match smoothed.get(i) {
                Some(&magnitude) => {
                    let db = 20.0 * magnitude.max(1e-10).log10();
                    let normalized = (db - MIN_DB) / (MAX_DB - MIN_DB);
                    (normalized.clamp(0.0, 1.0) * 255.0) as u8
                }
                None => 0,
            };
        }
    }

    /// Pull everything the render path produced since the last poll into
    /// the rolling window, keeping the newest `FFT_SIZE` samples.
    fn drain_into_window(&self) {
        let mut consumer = self.consumer.lock().unwrap();
        let mut fresh: Vec<f32> = Vec::new();
        while let Some(sample) = consumer.try_pop() {
            fresh.push(sample);
        }
        drop(consumer);

        if fresh.is_empty() {
            return;
        }

        let mut window = self.window.lock().unwrap();
        if fresh.len() >= FFT_SIZE {
            window.copy_from_slice(&fresh[fresh.len() - FFT_SIZE..]);
        } else {
            window.rotate_left(fresh.len());
            let tail = FFT_SIZE - fresh.len();
            window[tail..].copy_from_slice(&fresh);
        }
    }
}
