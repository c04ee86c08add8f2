//! Producers and consumers that drive a [`Pipeline`](crate::pipeline::Pipeline).
//!
//! - [`StreamReader`] - Runs a blocking [`StreamSource`] on its own thread
//! - [`SineSource`] / [`ClockedSink`] - Synthetic endpoints with drifting clocks
//! - `DeviceInput` / `DeviceOutput` - Sound card capture and playback via cpal
//!   (feature `device`)

#[cfg(feature = "device")]
pub mod audio;
pub mod stream;
pub mod synthetic;

#[cfg(feature = "device")]
pub use audio::{DeviceInput, DeviceOutput};
pub use stream::{ChannelSource, StreamReader, StreamSource, TimedBlock};
pub use synthetic::{ClockedSink, SineParams, SineSource, drifted_rate};
