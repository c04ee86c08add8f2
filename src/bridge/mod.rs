//! Runner wiring a producer and a consumer through a pipeline.
//!
//! - [`BridgeConfig`] - JSON configuration: pipeline, source, sink, run time
//! - [`Bridge`] - Starts both endpoints, logs periodic statistics and stops
//!   them again

mod bridge;
pub mod config;

pub use bridge::Bridge;
pub use config::{BridgeConfig, SinkConfig, SourceConfig};
