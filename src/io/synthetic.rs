//! Synthetic endpoints for running the bridge without audio hardware.
//!
//! - [`SineSource`] - A [`StreamSource`] producing a sine wave on a clock that
//!   runs fast or slow by a configurable number of ppm, with jittered timestamps
//! - [`ClockedSink`] - A consumer thread draining the pipeline at its own
//!   (also drifting) rate, the way a sound card would

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info};

use crate::error::SourceError;
use crate::pipeline::Pipeline;

use super::stream::StreamSource;

/// Sleeps so that frames leave at `rate` frames per second of wall time.
struct Pacer {
    start: Instant,
    rate: f64,
}

impl Pacer {
    fn new(rate: f64) -> Self {
        Self {
            start: Instant::now(),
            rate,
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Time left until frame number `frame` is due.
    fn until(&self, frame: u64) -> Duration {
        let due = Duration::from_secs_f64(frame as f64 / self.rate);
        due.saturating_sub(self.start.elapsed())
    }
}

/// Converts a clock error in parts per million into a rate.
pub fn drifted_rate(nominal: f64, drift_ppm: f64) -> f64 {
    nominal * (1.0 + drift_ppm * 1e-6)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SineParams {
    pub channels: usize,
    pub nominal_rate: f64,
    pub frequency: f64,
    pub amplitude: f32,
    /// How far the source clock is off, in ppm of `nominal_rate`.
    pub drift_ppm: f64,
    /// Maximum timestamp error, in seconds.
    pub jitter_secs: f64,
    pub block_frames: usize,
    /// Wait in real time for each block to become due.
    pub paced: bool,
}

impl Default for SineParams {
    fn default() -> Self {
        Self {
            channels: 1,
            nominal_rate: 8000.0,
            frequency: 440.0,
            amplitude: 0.5,
            drift_ppm: 0.0,
            jitter_secs: 0.0,
            block_frames: 80,
            paced: true,
        }
    }
}

pub struct SineSource {
    params: SineParams,
    actual_rate: f64,
    phase: f64,
    frames: u64,
    pacer: Option<Pacer>,
    rng: StdRng,
}

impl SineSource {
    pub fn new(params: SineParams) -> Self {
        Self {
            actual_rate: drifted_rate(params.nominal_rate, params.drift_ppm),
            params,
            phase: 0.0,
            frames: 0,
            pacer: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(params: SineParams, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(params)
        }
    }

    /// The rate frames are really produced at.
    pub fn actual_rate(&self) -> f64 {
        self.actual_rate
    }

    fn fill(&mut self, dest: &mut Vec<f32>) {
        let channels = self.params.channels;
        let step = TAU * self.params.frequency / self.params.nominal_rate;

        dest.clear();
        dest.reserve(self.params.block_frames * channels);
        for _ in 0..self.params.block_frames {
            let value = self.phase.sin() as f32 * self.params.amplitude;
            dest.extend(std::iter::repeat_n(value, channels));
            self.phase = (self.phase + step) % TAU;
        }
    }

    fn jitter(&mut self) -> f64 {
        if self.params.jitter_secs > 0.0 {
            self.rng
                .gen_range(-self.params.jitter_secs..=self.params.jitter_secs)
        } else {
            0.0
        }
    }
}

impl StreamSource for SineSource {
    fn channels(&self) -> usize {
        self.params.channels
    }

    fn pull(&mut self, dest: &mut Vec<f32>, timeout: Duration) -> Result<Option<f64>, SourceError> {
        let ideal = self.frames as f64 / self.actual_rate;
        let timestamp = if self.params.paced {
            let pacer = self.pacer.get_or_insert_with(|| Pacer::new(self.actual_rate));
            let wait = pacer.until(self.frames);
            if wait > timeout {
                thread::sleep(timeout);
                return Err(SourceError::Timeout(timeout));
            }
            thread::sleep(wait);
            pacer.elapsed_secs()
        } else {
            ideal
        };

        self.fill(dest);
        self.frames += self.params.block_frames as u64;
        Ok(Some((timestamp + self.jitter()).max(0.0)))
    }
}

/// A consumer thread pulling fixed blocks from a pipeline on its own clock.
pub struct ClockedSink {
    shutdown: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    peak: Arc<AtomicU32>,
    handle: Option<JoinHandle<()>>,
}

impl ClockedSink {
    /// Starts draining `block_frames` frames at `rate` frames per second.
    pub fn spawn(pipeline: Arc<Pipeline>, rate: f64, block_frames: usize) -> Result<Self> {
        anyhow::ensure!(rate > 0.0 && block_frames > 0, "Invalid sink clock");

        let shutdown = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let handle = {
            let shutdown = shutdown.clone();
            let frames = frames.clone();
            let peak = peak.clone();
            let channels = pipeline.config().channels;

            thread::Builder::new()
                .name("clocked-sink".into())
                .spawn(move || {
                    let mut block = vec![0.0f32; block_frames * channels];
                    let pacer = Pacer::new(rate);
                    let mut delivered = 0u64;

                    while !shutdown.load(Ordering::Relaxed) {
                        thread::sleep(pacer.until(delivered));
                        pipeline.pull_frames(&mut block);
                        delivered += block_frames as u64;

                        let block_peak = block.iter().fold(0.0f32, |m, s| m.max(s.abs()));
                        peak.store(block_peak.to_bits(), Ordering::Relaxed);
                        frames.store(delivered, Ordering::Relaxed);
                    }
                    debug!("ClockedSink: thread exiting after {} frames", delivered);
                })
                .context("Failed to spawn sink thread")?
        };

        info!("ClockedSink: draining {} frames every {:.2} ms", block_frames, 1000.0 * block_frames as f64 / rate);
        Ok(Self {
            shutdown,
            frames,
            peak,
            handle: Some(handle),
        })
    }

    /// Frames handed to the sink so far (real or silence).
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Peak absolute sample value of the last block.
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("ClockedSink: thread panicked");
            }
        }
    }
}

impl Drop for ClockedSink {
    fn drop(&mut self) {
        self.stop();
    }
}
