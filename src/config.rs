//! Pipeline configuration.
//!
//! Everything is plain data with serde defaults, so a JSON file only needs to
//! name what differs from the defaults. Buffer and block sizes are derived
//! from durations: `frames = seconds * rate`.

use serde::{Deserialize, Serialize};

use crate::control::{ControllerTuning, rate_estimator::DEFAULT_TIME_CONSTANT_SECS};
use crate::error::ConfigError;
use crate::resample::Quality;
use crate::resample::converter::DEFAULT_MAX_RELATIVE_RATIO;

pub const DEFAULT_BUFFER_DURATION_SECS: f64 = 2.0;
pub const DEFAULT_BLOCK_DURATION_SECS: f64 = 0.01;
pub const DEFAULT_FILL_FRACTION: f64 = 0.5;

/// How far an estimated producer rate may stray from the configured one.
pub const MAX_RATE_DEVIATION: f64 = 0.25;

/// Output frames a resampler may emit for one chunk beyond `chunk * ratio`.
const CHUNK_OUTPUT_SLACK: usize = 8;

/// Which side of the pipeline runs the convert-and-retune step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionTrigger {
    /// After every consumer drain (output-driven).
    #[default]
    Consumer,
    /// After every producer delivery (input-driven).
    Producer,
}

/// What the producer side does when the input buffer is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Keep the newest frames, evicting the oldest.
    #[default]
    DropOldest,
    /// Keep what is buffered and discard the excess of the delivery.
    Truncate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Nominal producer rate in frames per second.
    #[serde(alias = "inputRate")]
    pub input_rate: f64,
    /// Consumer rate in frames per second.
    #[serde(alias = "outputRate")]
    pub output_rate: f64,
    #[serde(alias = "channelCount")]
    pub channels: usize,
    #[serde(alias = "bufferDurationSeconds")]
    pub buffer_duration_secs: f64,
    /// Overrides `buffer_duration_secs` for the input buffer.
    pub input_buffer_duration_secs: Option<f64>,
    /// Overrides `buffer_duration_secs` for the output buffer.
    pub output_buffer_duration_secs: Option<f64>,
    #[serde(alias = "blockDurationSeconds")]
    pub block_duration_secs: f64,
    pub quality: Quality,
    /// Input frames per converter step. Defaults to one input block.
    pub converter_chunk_frames: Option<usize>,
    /// Input fill fraction at which conversion starts.
    pub fill_fraction: f64,
    pub trigger: ConversionTrigger,
    pub overflow: OverflowPolicy,
    /// Estimate the producer rate from timestamps instead of trusting `input_rate`.
    pub estimate_input_rate: bool,
    pub estimator_time_constant_secs: f64,
    pub controller: ControllerTuning,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_rate: 48000.0,
            output_rate: 48000.0,
            channels: 2,
            buffer_duration_secs: DEFAULT_BUFFER_DURATION_SECS,
            input_buffer_duration_secs: None,
            output_buffer_duration_secs: None,
            block_duration_secs: DEFAULT_BLOCK_DURATION_SECS,
            quality: Quality::default(),
            converter_chunk_frames: None,
            fill_fraction: DEFAULT_FILL_FRACTION,
            trigger: ConversionTrigger::default(),
            overflow: OverflowPolicy::default(),
            estimate_input_rate: false,
            estimator_time_constant_secs: DEFAULT_TIME_CONSTANT_SECS,
            controller: ControllerTuning::default(),
        }
    }
}

fn frames(seconds: f64, rate: f64) -> usize {
    (seconds * rate).round() as usize
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

impl PipelineConfig {
    pub fn new(input_rate: f64, output_rate: f64, channels: usize) -> Self {
        Self {
            input_rate,
            output_rate,
            channels,
            ..Default::default()
        }
    }

    pub fn nominal_ratio(&self) -> f64 {
        self.output_rate / self.input_rate
    }

    pub fn input_capacity_frames(&self) -> usize {
        let seconds = self
            .input_buffer_duration_secs
            .unwrap_or(self.buffer_duration_secs);
        frames(seconds, self.input_rate)
    }

    pub fn output_capacity_frames(&self) -> usize {
        let seconds = self
            .output_buffer_duration_secs
            .unwrap_or(self.buffer_duration_secs);
        frames(seconds, self.output_rate)
    }

    pub fn input_block_frames(&self) -> usize {
        frames(self.block_duration_secs, self.input_rate).max(1)
    }

    pub fn output_block_frames(&self) -> usize {
        frames(self.block_duration_secs, self.output_rate).max(1)
    }

    pub fn converter_chunk_frames(&self) -> usize {
        self.converter_chunk_frames
            .unwrap_or_else(|| self.input_block_frames())
    }

    /// Lowest and highest ratio the controller can reach, relative to
    /// [`nominal_ratio`](Self::nominal_ratio).
    pub fn ratio_span(&self) -> (f64, f64) {
        let rate = if self.estimate_input_rate {
            MAX_RATE_DEVIATION
        } else {
            0.0
        };
        let deviation = self.controller.max_deviation;
        ((1.0 - deviation) / (1.0 + rate), (1.0 + deviation) / (1.0 - rate))
    }

    /// Most output frames one converter chunk can produce.
    pub fn max_chunk_output_frames(&self) -> usize {
        let (_, high) = self.ratio_span();
        let frames = self.converter_chunk_frames() as f64 * self.nominal_ratio() * high;
        frames.ceil() as usize + CHUNK_OUTPUT_SLACK
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("input_rate", self.input_rate)?;
        check_positive("output_rate", self.output_rate)?;
        if self.channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        check_positive("buffer_duration_secs", self.buffer_duration_secs)?;
        if let Some(seconds) = self.input_buffer_duration_secs {
            check_positive("input_buffer_duration_secs", seconds)?;
        }
        if let Some(seconds) = self.output_buffer_duration_secs {
            check_positive("output_buffer_duration_secs", seconds)?;
        }
        check_positive("block_duration_secs", self.block_duration_secs)?;
        check_positive(
            "estimator_time_constant_secs",
            self.estimator_time_constant_secs,
        )?;

        if !(self.fill_fraction > 0.0 && self.fill_fraction < 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "fill_fraction",
                value: self.fill_fraction,
                min: 0.0,
                max: 1.0,
            });
        }

        let input_capacity = self.input_capacity_frames();
        if input_capacity == 0 {
            return Err(ConfigError::EmptyBuffer {
                name: "input buffer",
            });
        }
        if self.output_capacity_frames() == 0 {
            return Err(ConfigError::EmptyBuffer {
                name: "output buffer",
            });
        }

        let chunk = self.converter_chunk_frames();
        if chunk == 0 || chunk > input_capacity {
            return Err(ConfigError::OutOfRange {
                name: "converter_chunk_frames",
                value: chunk as f64,
                min: 1.0,
                max: input_capacity as f64,
            });
        }

        self.controller.validate()?;

        // Ratios on the boundary can fail the converter's check by rounding.
        let (low, high) = self.ratio_span();
        let limit = DEFAULT_MAX_RELATIVE_RATIO;
        if low <= 1.0 / limit || high >= limit {
            return Err(ConfigError::RatioReach {
                max_deviation: self.controller.max_deviation,
                low,
                high,
                limit,
            });
        }

        let needed = 2 * self.max_chunk_output_frames();
        let capacity = self.output_capacity_frames();
        if capacity < needed {
            return Err(ConfigError::OutputTooSmall { capacity, needed });
        }
        Ok(())
    }
}
