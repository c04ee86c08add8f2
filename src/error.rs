//! Error types for the rate bridge.
//!
//! Only structural problems are errors. Buffer underflow, overflow and bad
//! timestamps are absorbed by the pipeline and show up in its statistics.

use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be positive and finite, got {value}")]
    /// A rate or duration was zero, negative, NaN or infinite.
    NotPositive { name: &'static str, value: f64 },

    #[error("channel count must be at least 1")]
    /// No channels.
    NoChannels,

    #[error("{name} = {value} is outside {min}..={max}")]
    /// A fraction or smoothing coefficient outside its range.
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("occupancy thresholds must satisfy very_low <= low < 0.5 < high <= very_high, got {0:?}")]
    /// The controller zones overlap or are not ordered.
    Thresholds([f64; 4]),

    #[error("{name} rounds to zero frames")]
    /// A duration too short to hold a single frame at the given rate.
    EmptyBuffer { name: &'static str },

    #[error("max_deviation {max_deviation} can drive the ratio to {low:.3}..{high:.3} of nominal, outside the converter's {limit}x retune range")]
    /// The controller bounds, widened by the estimated-rate clamp, reach
    /// ratios the converter refuses.
    RatioReach {
        max_deviation: f64,
        low: f64,
        high: f64,
        limit: f64,
    },

    #[error("output buffer holds {capacity} frames, needs at least {needed} for two converter chunks")]
    /// The output buffer cannot take a chunk's output while half full.
    OutputTooSmall { capacity: usize, needed: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ConversionError {
    #[error("failed to construct resampler: {0}")]
    /// The resampler rejected its parameters.
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("resampler failed: {0}")]
    /// The resampler reported an error while processing or retuning.
    Process(#[from] rubato::ResampleError),

    #[error("channel mismatch: converter has {expected} channels, buffer has {actual}")]
    /// A buffer with the wrong channel count was handed to the converter.
    ChannelMismatch { expected: usize, actual: usize },

    #[error("invalid conversion ratio {0}")]
    /// Zero, negative, or non-finite ratio.
    InvalidRatio(f64),
}

impl ConversionError {
    /// Stable numeric code for the failure kind.
    pub fn code(&self) -> i32 {
        match self {
            Self::Construction(_) => 1,
            Self::Process(_) => 2,
            Self::ChannelMismatch { .. } => 3,
            Self::InvalidRatio(_) => 4,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("source pull timed out after {0:?}")]
    /// A blocking pull returned nothing within its timeout.
    Timeout(Duration),

    #[error("source disconnected")]
    /// The upstream end went away.
    Disconnected,

    #[error("source failed: {0}")]
    /// Anything else the source wants to report.
    Failed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("producer failed: {0}")]
    Source(#[from] SourceError),

    #[error("frame slice of {len} samples is not a multiple of {channels} channels")]
    /// Producer handed in a partial frame.
    PartialFrame { len: usize, channels: usize },

    #[error("pipeline has not been started")]
    NotStarted,

    #[error("pipeline is stopped")]
    Stopped,
}
