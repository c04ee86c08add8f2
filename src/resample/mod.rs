//! Sample-rate conversion between frame buffers, backed by rubato.

pub mod converter;

pub use converter::{ConversionResult, Converter, ConverterConfig, Quality};
