//! The adaptive rate-matching pipeline.
//!
//! - [`Pipeline`] - Owns both frame buffers, the converter and the ratio
//!   controller; producer and consumer threads call into it directly
//! - [`PipelineState`] - Lifecycle (`Uninitialized -> Filling -> Running -> Stopped`)
//! - [`StatsSnapshot`] - Counters for the conditions the pipeline absorbs silently

pub mod pipeline;
pub mod state;
pub mod stats;

pub use pipeline::Pipeline;
pub use state::PipelineState;
pub use stats::{PipelineStats, StatsSnapshot};
