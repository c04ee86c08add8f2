use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::atomic::AtomicCell;
use tracing::{debug, error, info, warn};

use crate::audio::FrameBuffer;
use crate::config::{ConversionTrigger, MAX_RATE_DEVIATION, OverflowPolicy, PipelineConfig};
use crate::control::{RateEstimator, RatioController};
use crate::error::{ConversionError, PipelineError, SourceError};
use crate::resample::{ConversionResult, Converter, ConverterConfig};

use super::state::PipelineState;
use super::stats::{PipelineStats, StatsSnapshot};

/// Converter and controller, only touched by the conversion step.
struct Engine {
    converter: Converter,
    controller: RatioController,
}

/// Adaptive rate-matching pipeline between a producer and a consumer that
/// run on independent clocks.
///
/// Share it between the producer and consumer threads with an `Arc`. Neither
/// side ever blocks on data or room: the producer truncates or evicts, the
/// consumer gets silence.
///
/// Locks are always taken in the order `engine`, `input`, `output`. The
/// estimator lock is never held together with any of them.
pub struct Pipeline {
    config: PipelineConfig,
    state: AtomicCell<PipelineState>,
    engine: Mutex<Option<Engine>>,
    input: Mutex<FrameBuffer>,
    output: Mutex<FrameBuffer>,
    estimator: Mutex<Option<RateEstimator>>,
    /// Latest producer rate estimate as f64 bits, 0.0 when there is none.
    rate_estimate: AtomicU64,
    last_error: Mutex<Option<String>>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let channels = config.channels;

        Ok(Self {
            config,
            state: AtomicCell::new(PipelineState::Uninitialized),
            engine: Mutex::new(None),
            input: Mutex::new(FrameBuffer::new(0, channels)),
            output: Mutex::new(FrameBuffer::new(0, channels)),
            estimator: Mutex::new(None),
            rate_estimate: AtomicU64::new(0f64.to_bits()),
            last_error: Mutex::new(None),
            stats: PipelineStats::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state.load()
    }

    /// Allocates buffers and converter and starts filling.
    ///
    /// Calling it on a filling or running pipeline starts over from empty
    /// buffers. A stopped pipeline cannot be restarted.
    pub fn start(&self) -> Result<(), PipelineError> {
        if self.state() == PipelineState::Stopped {
            return Err(PipelineError::Stopped);
        }

        let config = &self.config;
        let converter = match Converter::new(
            config.nominal_ratio(),
            ConverterConfig::new(
                config.channels,
                config.quality,
                config.converter_chunk_frames(),
            ),
        ) {
            Ok(converter) => converter,
            Err(e) => {
                self.halt(format!("converter construction failed: {e}"));
                return Err(e.into());
            }
        };
        let controller = RatioController::new(
            config.input_rate,
            config.output_rate,
            config.output_block_frames(),
            config.controller,
        );

        {
            let mut engine = self.engine.lock().unwrap();
            let mut input = self.input.lock().unwrap();
            let mut output = self.output.lock().unwrap();

            *input = FrameBuffer::new(config.input_capacity_frames(), config.channels);
            *output = FrameBuffer::new(config.output_capacity_frames(), config.channels);
            *engine = Some(Engine {
                converter,
                controller,
            });
        }

        *self.estimator.lock().unwrap() = config.estimate_input_rate.then(|| {
            RateEstimator::new(config.input_rate, config.estimator_time_constant_secs)
        });
        self.rate_estimate
            .store(0f64.to_bits(), Ordering::Release);
        self.stats.reset(config.nominal_ratio());

        let previous = self.state.swap(PipelineState::Filling);
        info!(
            "Pipeline: {:?} -> Filling ({} -> {} Hz, {} channels, buffers {} / {} frames)",
            previous,
            config.input_rate,
            config.output_rate,
            config.channels,
            config.input_capacity_frames(),
            config.output_capacity_frames()
        );
        Ok(())
    }

    /// Producer tick: admits `frames` (interleaved) into the input buffer.
    ///
    /// `timestamp` is the capture time of the first frame and is only used
    /// when the producer rate is being estimated. Returns how many of the
    /// delivered frames ended up in the buffer.
    pub fn push_frames(&self, frames: &[f32], timestamp: Option<f64>) -> Result<usize, PipelineError> {
        match self.state() {
            PipelineState::Uninitialized => return Err(PipelineError::NotStarted),
            PipelineState::Stopped => return Err(PipelineError::Stopped),
            _ => {}
        }

        let channels = self.config.channels;
        if frames.len() % channels != 0 {
            return Err(PipelineError::PartialFrame {
                len: frames.len(),
                channels,
            });
        }
        let count = frames.len() / channels;
        if count == 0 {
            return Ok(0);
        }

        if let Some(timestamp) = timestamp {
            self.observe_rate(timestamp, count);
        }

        let stored = {
            let mut input = self.input.lock().unwrap();
            match self.config.overflow {
                OverflowPolicy::Truncate => {
                    let stored = input.append(frames, count);
                    self.stats.record_input(stored, count - stored, 0);
                    stored
                }
                OverflowPolicy::DropOldest => {
                    let stored = count.min(input.capacity());
                    let evicted = input.append_evicting(frames);
                    self.stats.record_input(stored, 0, evicted);
                    stored
                }
            }
        };

        if self.config.trigger == ConversionTrigger::Producer {
            self.step().map_err(|e| self.fail_conversion(e))?;
        }
        Ok(stored)
    }

    /// Consumer tick: fills all of `dest` with output frames, padding with
    /// silence when there are not enough.
    ///
    /// Never blocks and never fails. Returns the number of real frames
    /// written. A conversion failure on this path stops the pipeline and is
    /// kept in [`last_error`](Self::last_error).
    pub fn pull_frames(&self, dest: &mut [f32]) -> usize {
        let channels = self.config.channels;
        let count = dest.len() / channels;
        dest[count * channels..].fill(0.0);

        if !self.state().is_active() {
            dest.fill(0.0);
            return 0;
        }

        let real = self.output.lock().unwrap().consume(dest, count);
        self.stats.record_output(real, count - real);

        if self.config.trigger == ConversionTrigger::Consumer {
            if let Err(e) = self.step() {
                self.fail_conversion(e);
            }
        }
        real
    }

    /// Stops the pipeline for good and releases its buffers and converter.
    pub fn stop(&self) {
        let previous = self.state.swap(PipelineState::Stopped);
        if previous == PipelineState::Stopped {
            return;
        }

        {
            let mut engine = self.engine.lock().unwrap();
            let mut input = self.input.lock().unwrap();
            let mut output = self.output.lock().unwrap();
            *engine = None;
            *input = FrameBuffer::new(0, self.config.channels);
            *output = FrameBuffer::new(0, self.config.channels);
        }
        *self.estimator.lock().unwrap() = None;

        info!("Pipeline: {:?} -> Stopped", previous);
    }

    /// Reports a producer-side failure (timeout, disconnect). The pipeline
    /// stops; reconnecting is up to the caller.
    pub fn fail(&self, err: SourceError) {
        error!("Pipeline: producer failed: {}", err);
        self.halt(err.to_string());
    }

    /// Message of the error that stopped the pipeline, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Most recently applied conversion ratio.
    pub fn ratio(&self) -> f64 {
        self.stats.ratio()
    }

    /// Current producer rate estimate, when estimation is enabled and has
    /// seen at least two timestamps.
    pub fn rate_estimate(&self) -> Option<f64> {
        let rate = f64::from_bits(self.rate_estimate.load(Ordering::Acquire));
        (rate > 0.0).then_some(rate)
    }

    pub fn input_occupancy(&self) -> usize {
        self.input.lock().unwrap().occupied()
    }

    pub fn output_occupancy(&self) -> usize {
        self.output.lock().unwrap().occupied()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn observe_rate(&self, timestamp: f64, frames: usize) {
        let mut estimator = self.estimator.lock().unwrap();
        let Some(estimator) = estimator.as_mut() else {
            return;
        };

        if let Some(rate) = estimator.observe_block(timestamp, frames) {
            self.rate_estimate
                .store(rate.to_bits(), Ordering::Release);
        }
        self.stats.record_anomalies(estimator.anomalies());
    }

    /// Producer rate the controller should assume right now.
    fn input_rate(&self) -> f64 {
        let nominal = self.config.input_rate;
        match self.rate_estimate() {
            Some(rate) => rate.clamp(
                nominal * (1.0 - MAX_RATE_DEVIATION),
                nominal * (1.0 + MAX_RATE_DEVIATION),
            ),
            None => nominal,
        }
    }

    /// One conversion and control step: convert, then retune from the
    /// resulting output occupancy.
    fn step(&self) -> Result<ConversionResult, ConversionError> {
        let mut engine = self.engine.lock().unwrap();
        let Some(engine) = engine.as_mut() else {
            return Ok(ConversionResult::default());
        };
        let mut input = self.input.lock().unwrap();
        let mut output = self.output.lock().unwrap();
        let input_rate = self.input_rate();

        match self.state() {
            PipelineState::Running => {}
            PipelineState::Filling => {
                if input.fill_fraction() < self.config.fill_fraction {
                    return Ok(ConversionResult::default());
                }
                if self.config.estimate_input_rate && self.rate_estimate().is_none() {
                    return Ok(ConversionResult::default());
                }
                if self
                    .state
                    .compare_exchange(PipelineState::Filling, PipelineState::Running)
                    .is_err()
                {
                    return Ok(ConversionResult::default());
                }

                engine.controller.reset(input_rate);
                info!(
                    "Pipeline: Filling -> Running (input {:.1}% full, input rate {:.3} Hz, ratio {:.6})",
                    100.0 * input.fill_fraction(),
                    input_rate,
                    engine.controller.ratio()
                );
            }
            _ => return Ok(ConversionResult::default()),
        }

        let result = engine
            .converter
            .convert(&mut input, &mut output, engine.controller.ratio())?;
        let ratio = engine
            .controller
            .update(output.occupied(), output.capacity(), input_rate);

        self.stats.record_tick(
            result.consumed,
            result.produced,
            ratio,
            output.fill_fraction(),
            engine.controller.zone(),
        );

        if result.consumed == 0 && input.is_full() {
            debug!("Pipeline: input full but nothing converted (output {} free)", output.free());
        }
        Ok(result)
    }

    fn fail_conversion(&self, err: ConversionError) -> PipelineError {
        error!("Pipeline: conversion failed (code {}): {}", err.code(), err);
        self.halt(format!("conversion failed: {err}"));
        PipelineError::Conversion(err)
    }

    fn halt(&self, message: String) {
        {
            let mut last_error = self.last_error.lock().unwrap();
            if last_error.is_none() {
                *last_error = Some(message);
            } else {
                warn!("Pipeline: already failed, ignoring: {}", message);
            }
        }
        self.stop();
    }
}
