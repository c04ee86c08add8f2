//! Adaptive sample-rate matching between a producer and a consumer that run
//! on independent, drifting clocks.
//!
//! Frames enter an input [`FrameBuffer`](audio::FrameBuffer), pass through a
//! variable-ratio [`Converter`](resample::Converter) and wait in an output
//! buffer for the consumer. A [`RatioController`](control::RatioController)
//! retunes the conversion ratio every step to keep the output buffer half
//! full, optionally seeded by a [`RateEstimator`](control::RateEstimator)
//! measuring the true producer rate.
//!
//! [`Pipeline`](pipeline::Pipeline) ties these together behind two
//! non-blocking calls, `push_frames` and `pull_frames`.

pub mod audio;
pub mod bridge;
pub mod config;
pub mod control;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod resample;
