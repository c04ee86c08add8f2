//! Audio buffer implementations.
//!
//! - [`FrameBuffer`] - Fixed-capacity interleaved frame store with truncating,
//!   drop-oldest and zero-padding semantics

pub mod frame_buffer;

pub use frame_buffer::FrameBuffer;
