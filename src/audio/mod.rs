//! Audio data types.
//!
//! # Data Types
//! - [`AudioSample`] - Trait for device sample types (i16, f32, etc.)
//!
//! # Buffers
//! - [`buffers::FrameBuffer`] - Bounded interleaved frame store used on both
//!   sides of the converter

pub mod buffers;
pub mod sample;

pub use buffers::FrameBuffer;
pub use sample::{AudioSample, extend_normalized, write_denormalized};
