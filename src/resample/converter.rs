//! Streaming sample-rate converter between two [`FrameBuffer`]s.
//!
//! Wraps a rubato fixed-input resampler. Each call moves whole chunks from the
//! input buffer to the output buffer for as long as the input holds a full
//! chunk and the output has room for everything the chunk can produce. The
//! resampler keeps its interpolation history between calls, so a stream is
//! continuous across ticks and across ratio changes.

use rubato::{
    FastFixedIn, PolynomialDegree, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::audio::FrameBuffer;
use crate::error::ConversionError;

/// How far the ratio may be retuned away from the one the converter was built with.
pub const DEFAULT_MAX_RELATIVE_RATIO: f64 = 2.0;

/// Interpolation quality, from cheapest to best.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Repeats the nearest input sample.
    ZeroOrderHold,
    /// Straight line between neighbouring samples.
    Linear,
    /// Short windowed sinc (32 taps).
    SincFastest,
    /// 128-tap windowed sinc.
    #[default]
    SincMedium,
    /// 256-tap windowed sinc with cubic interpolation of the filter table.
    SincBest,
}

impl Quality {
    fn sinc_params(self) -> Option<SincInterpolationParameters> {
        match self {
            Self::ZeroOrderHold | Self::Linear => None,
            Self::SincFastest => Some(SincInterpolationParameters {
                sinc_len: 32,
                f_cutoff: 0.9,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 64,
                window: WindowFunction::Blackman2,
            }),
            Self::SincMedium => Some(SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 128,
                window: WindowFunction::BlackmanHarris2,
            }),
            Self::SincBest => Some(SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            }),
        }
    }

    fn polynomial_degree(self) -> PolynomialDegree {
        match self {
            Self::ZeroOrderHold => PolynomialDegree::Nearest,
            _ => PolynomialDegree::Linear,
        }
    }
}

/// Enum wrapper over the rubato resamplers we use (the trait is not object safe).
enum Backend {
    Poly(FastFixedIn<f32>),
    Sinc(SincFixedIn<f32>),
}

impl Backend {
    fn new(
        quality: Quality,
        ratio: f64,
        max_relative_ratio: f64,
        chunk_frames: usize,
        channels: usize,
    ) -> Result<Self, rubato::ResamplerConstructionError> {
        match quality.sinc_params() {
            Some(params) => Ok(Self::Sinc(SincFixedIn::new(
                ratio,
                max_relative_ratio,
                params,
                chunk_frames,
                channels,
            )?)),
            None => Ok(Self::Poly(FastFixedIn::new(
                ratio,
                max_relative_ratio,
                quality.polynomial_degree(),
                chunk_frames,
                channels,
            )?)),
        }
    }

    fn process(
        &mut self,
        input: &[Vec<f32>],
        output: &mut [Vec<f32>],
    ) -> Result<(usize, usize), rubato::ResampleError> {
        match self {
            Self::Poly(r) => r.process_into_buffer(input, output, None),
            Self::Sinc(r) => r.process_into_buffer(input, output, None),
        }
    }

    fn input_frames_next(&self) -> usize {
        match self {
            Self::Poly(r) => r.input_frames_next(),
            Self::Sinc(r) => r.input_frames_next(),
        }
    }

    fn output_frames_next(&self) -> usize {
        match self {
            Self::Poly(r) => r.output_frames_next(),
            Self::Sinc(r) => r.output_frames_next(),
        }
    }

    fn output_frames_max(&self) -> usize {
        match self {
            Self::Poly(r) => r.output_frames_max(),
            Self::Sinc(r) => r.output_frames_max(),
        }
    }

    fn set_resample_ratio(&mut self, ratio: f64, ramp: bool) -> Result<(), rubato::ResampleError> {
        match self {
            Self::Poly(r) => r.set_resample_ratio(ratio, ramp),
            Self::Sinc(r) => r.set_resample_ratio(ratio, ramp),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConverterConfig {
    pub channels: usize,
    pub quality: Quality,
    /// Input frames handed to the resampler per step.
    pub chunk_frames: usize,
    pub max_relative_ratio: f64,
}

impl ConverterConfig {
    pub fn new(channels: usize, quality: Quality, chunk_frames: usize) -> Self {
        Self {
            channels,
            quality,
            chunk_frames,
            max_relative_ratio: DEFAULT_MAX_RELATIVE_RATIO,
        }
    }
}

/// Frames moved by one [`Converter::convert`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionResult {
    pub consumed: usize,
    pub produced: usize,
}

pub struct Converter {
    backend: Backend,
    config: ConverterConfig,
    nominal_ratio: f64,
    ratio: f64,
    interleaved_in: Vec<f32>,
    interleaved_out: Vec<f32>,
    planes_in: Vec<Vec<f32>>,
    planes_out: Vec<Vec<f32>>,
}

impl Converter {
    /// Builds a converter for `nominal_ratio` (output rate / input rate).
    pub fn new(nominal_ratio: f64, config: ConverterConfig) -> Result<Self, ConversionError> {
        if !nominal_ratio.is_finite() || nominal_ratio <= 0.0 {
            return Err(ConversionError::InvalidRatio(nominal_ratio));
        }
        if config.channels == 0 {
            return Err(ConversionError::ChannelMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let backend = Backend::new(
            config.quality,
            nominal_ratio,
            config.max_relative_ratio,
            config.chunk_frames,
            config.channels,
        )?;
        let max_out = backend.output_frames_max();

        debug!(
            "Converter: {:?} ratio {:.6}, {} channels, chunk {} frames, up to {} out",
            config.quality, nominal_ratio, config.channels, config.chunk_frames, max_out
        );

        Ok(Self {
            backend,
            config,
            nominal_ratio,
            ratio: nominal_ratio,
            interleaved_in: vec![0.0; config.chunk_frames * config.channels],
            interleaved_out: vec![0.0; max_out * config.channels],
            planes_in: vec![vec![0.0; config.chunk_frames]; config.channels],
            planes_out: vec![vec![0.0; max_out]; config.channels],
        })
    }

    pub fn channels(&self) -> usize {
        self.config.channels
    }

    pub fn nominal_ratio(&self) -> f64 {
        self.nominal_ratio
    }

    /// The ratio most recently handed to the resampler.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Converts as much of `input` into `output` as fits, at `ratio`.
    ///
    /// Does nothing when the input is empty or the output is full. Partial
    /// chunks stay in `input` until the next call.
    pub fn convert(
        &mut self,
        input: &mut FrameBuffer,
        output: &mut FrameBuffer,
        ratio: f64,
    ) -> Result<ConversionResult, ConversionError> {
        self.check_channels(input)?;
        self.check_channels(output)?;
        self.check_ratio(ratio)?;

        let mut result = ConversionResult::default();
        if input.is_empty() || output.is_full() {
            return Ok(result);
        }

        if ratio != self.ratio {
            self.backend.set_resample_ratio(ratio, true)?;
            trace!("Converter: ratio {:.6} -> {:.6}", self.ratio, ratio);
            self.ratio = ratio;
        }

        loop {
            let needed = self.backend.input_frames_next();
            if input.occupied() < needed || output.free() < self.backend.output_frames_next() {
                break;
            }

            let taken = input.consume_into(&mut self.interleaved_in, needed);
            self.deinterleave(taken);

            let (read, written) = self.backend.process(&self.planes_in, &mut self.planes_out)?;
            debug_assert_eq!(read, taken);

            self.interleave(written);
            let stored = output.append(&self.interleaved_out, written);

            result.consumed += taken;
            result.produced += stored;
        }

        Ok(result)
    }

    /// Drops all interpolation history and returns to the nominal ratio.
    ///
    /// Only meant for pipeline restarts; mid-stream it causes a discontinuity.
    pub fn reset(&mut self) -> Result<(), ConversionError> {
        self.backend = Backend::new(
            self.config.quality,
            self.nominal_ratio,
            self.config.max_relative_ratio,
            self.config.chunk_frames,
            self.config.channels,
        )?;
        self.ratio = self.nominal_ratio;
        Ok(())
    }

    fn check_channels(&self, buffer: &FrameBuffer) -> Result<(), ConversionError> {
        if buffer.channels() != self.config.channels {
            return Err(ConversionError::ChannelMismatch {
                expected: self.config.channels,
                actual: buffer.channels(),
            });
        }
        Ok(())
    }

    fn check_ratio(&self, ratio: f64) -> Result<(), ConversionError> {
        let relative = ratio / self.nominal_ratio;
        let max = self.config.max_relative_ratio;
        if !ratio.is_finite() || ratio <= 0.0 || relative > max || relative < 1.0 / max {
            return Err(ConversionError::InvalidRatio(ratio));
        }
        Ok(())
    }

    fn deinterleave(&mut self, frames: usize) {
        let channels = self.config.channels;
        for (ch, plane) in self.planes_in.iter_mut().enumerate() {
            for (i, sample) in plane[..frames].iter_mut().enumerate() {
                *sample = self.interleaved_in[i * channels + ch];
            }
        }
    }

    fn interleave(&mut self, frames: usize) {
        let channels = self.config.channels;
        for (ch, plane) in self.planes_out.iter().enumerate() {
            for (i, &sample) in plane[..frames].iter().enumerate() {
                self.interleaved_out[i * channels + ch] = sample;
            }
        }
    }
}
