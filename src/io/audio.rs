//! Sound card endpoints using cpal.
//!
//! - [`DeviceInput`] - Pushes frames captured on the default input device
//! - [`DeviceOutput`] - Feeds the default output device from the pipeline
//!
//! Both run the device at the rate and channel count the pipeline was
//! configured with. The input side timestamps each callback with the
//! device's capture clock so the producer rate can be estimated.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, StreamConfig, StreamInstant, SupportedBufferSize};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioSample, extend_normalized, write_denormalized};
use crate::error::SourceError;
use crate::pipeline::Pipeline;

const MIN_BUFFER_MS: u32 = 3;

fn stream_config(
    channels: usize,
    rate: f64,
    block_frames: usize,
    supported: &SupportedBufferSize,
) -> StreamConfig {
    let sample_rate = rate.round() as u32;
    let min_buffer_size = sample_rate * MIN_BUFFER_MS / 1000;

    StreamConfig {
        channels: channels as u16,
        sample_rate,
        buffer_size: match supported {
            SupportedBufferSize::Range { min, max } => {
                let size = (block_frames as u32)
                    .max(min_buffer_size)
                    .clamp(*min, *max);
                debug!("Using buffer size: {} (min={}, max={})", size, min, max);
                BufferSize::Fixed(size)
            }
            SupportedBufferSize::Unknown => {
                warn!("Supported buffer size range unknown, using default");
                BufferSize::Default
            }
        },
    }
}

/// Captures from the default input device into a pipeline.
pub struct DeviceInput<Sample> {
    pipeline: Arc<Pipeline>,
    stream: Mutex<Option<cpal::Stream>>,
    _sample: PhantomData<Sample>,
}

impl<Sample: AudioSample + cpal::SizedSample> DeviceInput<Sample> {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            stream: Mutex::new(None),
            _sample: PhantomData,
        }
    }

    pub fn enable(&self) -> Result<()> {
        let mut stream_guard = self.stream.lock().unwrap();
        if stream_guard.is_some() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_input_device()
            .context("No default input device available")?;
        let supported = device
            .default_input_config()
            .context("Failed to query input device config")?;
        debug!("Input config: {supported:#?}");

        let pipeline_config = self.pipeline.config();
        let config = stream_config(
            pipeline_config.channels,
            pipeline_config.input_rate,
            pipeline_config.input_block_frames(),
            supported.buffer_size(),
        );

        let pipeline = self.pipeline.clone();
        let failing = self.pipeline.clone();
        let mut origin: Option<StreamInstant> = None;
        let mut scratch = Vec::new();

        let stream = device.build_input_stream(
            &config,
            move |data: &[Sample], info: &cpal::InputCallbackInfo| {
                let capture = info.timestamp().capture;
                let origin = *origin.get_or_insert(capture);
                let timestamp = capture
                    .duration_since(&origin)
                    .map(|elapsed| elapsed.as_secs_f64());

                scratch.clear();
                extend_normalized(&mut scratch, data);
                if let Err(e) = pipeline.push_frames(&scratch, timestamp) {
                    debug!("DeviceInput: dropped callback: {}", e);
                }
            },
            move |err| {
                error!("An error occurred on the input audio stream: {}", err);
                failing.fail(SourceError::Failed(err.to_string()));
            },
            None,
        )?;
        stream.play()?;
        info!("DeviceInput: capturing at {} Hz", config.sample_rate);
        *stream_guard = Some(stream);
        Ok(())
    }

    pub fn disable(&self) {
        if self.stream.lock().unwrap().take().is_some() {
            info!("DeviceInput: capture stopped");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.stream.lock().unwrap().is_some()
    }
}

/// Plays pipeline output on the default output device.
pub struct DeviceOutput<Sample> {
    pipeline: Arc<Pipeline>,
    stream: Mutex<Option<cpal::Stream>>,
    _sample: PhantomData<Sample>,
}

impl<Sample: AudioSample + cpal::SizedSample> DeviceOutput<Sample> {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            stream: Mutex::new(None),
            _sample: PhantomData,
        }
    }

    pub fn enable(&self) -> Result<()> {
        let mut stream_guard = self.stream.lock().unwrap();
        if stream_guard.is_some() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_output_device()
            .context("No default output device available")?;
        let supported = device
            .default_output_config()
            .context("Failed to query output device config")?;
        debug!("Output config: {supported:#?}");

        let pipeline_config = self.pipeline.config();
        let config = stream_config(
            pipeline_config.channels,
            pipeline_config.output_rate,
            pipeline_config.output_block_frames(),
            supported.buffer_size(),
        );

        let pipeline = self.pipeline.clone();
        let mut scratch = Vec::new();

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [Sample], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                pipeline.pull_frames(&mut scratch);
                write_denormalized(data, &scratch);
            },
            |err| error!("An error occurred on the output audio stream: {}", err),
            None,
        )?;
        stream.play()?;
        info!("DeviceOutput: playing at {} Hz", config.sample_rate);
        *stream_guard = Some(stream);
        Ok(())
    }

    pub fn disable(&self) {
        if self.stream.lock().unwrap().take().is_some() {
            info!("DeviceOutput: playback stopped");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.stream.lock().unwrap().is_some()
    }
}
