use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::io::{ClockedSink, SineParams, SineSource, StreamReader, drifted_rate};
use crate::pipeline::{Pipeline, PipelineState, StatsSnapshot};

#[cfg(feature = "device")]
use crate::io::{DeviceInput, DeviceOutput};

use super::config::{BridgeConfig, SinkConfig, SourceConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

enum Producer {
    Stream(StreamReader),
    #[cfg(feature = "device")]
    Device(DeviceInput<f32>),
}

impl Producer {
    fn stop(&mut self) {
        match self {
            Self::Stream(reader) => reader.stop(),
            #[cfg(feature = "device")]
            Self::Device(input) => input.disable(),
        }
    }
}

enum Consumer {
    Clocked(ClockedSink),
    #[cfg(feature = "device")]
    Device(DeviceOutput<f32>),
}

impl Consumer {
    fn stop(&mut self) {
        match self {
            Self::Clocked(sink) => sink.stop(),
            #[cfg(feature = "device")]
            Self::Device(output) => output.disable(),
        }
    }
}

/// Connects a configured producer and consumer through a [`Pipeline`] and
/// reports on it until told to stop.
pub struct Bridge {
    config: BridgeConfig,
    pipeline: Arc<Pipeline>,
    shutdown: Arc<AtomicBool>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let pipeline =
            Pipeline::new(config.pipeline.clone()).context("Failed to create pipeline")?;

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Flag that ends [`run`](Self::run) when set from another thread.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Runs until `run_secs` elapses, the shutdown flag is set or the
    /// pipeline stops on its own. Returns the final statistics, or the
    /// error that stopped the pipeline.
    pub fn run(&self) -> Result<StatsSnapshot> {
        self.pipeline.start().context("Failed to start pipeline")?;

        let mut consumer = self.start_consumer()?;
        let mut producer = match self.start_producer() {
            Ok(producer) => producer,
            Err(e) => {
                consumer.stop();
                self.pipeline.stop();
                return Err(e);
            }
        };

        let started = Instant::now();
        let deadline = self
            .config
            .run_secs
            .map(|secs| started + Duration::from_secs_f64(secs));
        let mut next_report = started + self.config.report_interval();
        let mut reached_running = false;

        loop {
            thread::sleep(POLL_INTERVAL);
            let now = Instant::now();

            let state = self.pipeline.state();
            if state == PipelineState::Stopped {
                warn!("Bridge: pipeline stopped unexpectedly");
                break;
            }
            if !reached_running && state == PipelineState::Running {
                reached_running = true;
                info!("Bridge: running after {:.2} s", started.elapsed().as_secs_f64());
            }
            if now >= next_report {
                self.report();
                next_report += self.config.report_interval();
            }
            if deadline.is_some_and(|deadline| now >= deadline) {
                info!("Bridge: run time elapsed");
                break;
            }
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Bridge: shutdown requested");
                break;
            }
        }

        producer.stop();
        consumer.stop();
        let snapshot = self.pipeline.stats();
        self.pipeline.stop();

        if let Some(message) = self.pipeline.last_error() {
            bail!("Pipeline failed: {}", message);
        }
        Ok(snapshot)
    }

    fn report(&self) {
        let stats = self.pipeline.stats();
        let rate = self
            .pipeline
            .rate_estimate()
            .map_or_else(|| "-".to_string(), |rate| format!("{rate:.3} Hz"));

        info!(
            "Bridge: {:?}, ratio {:.6}, output {:.1}% ({:?}), input rate {}, in {} / out {} frames, padded {}, truncated {}, evicted {}, anomalies {}",
            self.pipeline.state(),
            stats.ratio,
            100.0 * stats.output_fill,
            stats.zone,
            rate,
            stats.frames_in,
            stats.frames_out,
            stats.frames_padded,
            stats.frames_truncated,
            stats.frames_evicted,
            stats.estimator_anomalies
        );
    }

    fn start_producer(&self) -> Result<Producer> {
        let pipeline_config = self.pipeline.config();

        match &self.config.source {
            SourceConfig::Synthetic {
                frequency,
                drift_ppm,
                jitter_ms,
                block_frames,
            } => {
                let source = SineSource::new(SineParams {
                    channels: pipeline_config.channels,
                    nominal_rate: pipeline_config.input_rate,
                    frequency: *frequency,
                    drift_ppm: *drift_ppm,
                    jitter_secs: jitter_ms / 1000.0,
                    block_frames: block_frames.unwrap_or(pipeline_config.input_block_frames()),
                    ..Default::default()
                });
                info!(
                    "Bridge: synthetic source at {:.3} Hz ({:+} ppm)",
                    source.actual_rate(),
                    drift_ppm
                );
                let reader = StreamReader::spawn(
                    source,
                    self.pipeline.clone(),
                    self.config.pull_timeout(),
                )?;
                Ok(Producer::Stream(reader))
            }
            #[cfg(feature = "device")]
            SourceConfig::Device => {
                let input = DeviceInput::new(self.pipeline.clone());
                input.enable()?;
                Ok(Producer::Device(input))
            }
            #[cfg(not(feature = "device"))]
            SourceConfig::Device => bail!("Device source requires the `device` feature"),
        }
    }

    fn start_consumer(&self) -> Result<Consumer> {
        let pipeline_config = self.pipeline.config();

        match &self.config.sink {
            SinkConfig::Clocked { drift_ppm } => {
                let rate = drifted_rate(pipeline_config.output_rate, *drift_ppm);
                let sink = ClockedSink::spawn(
                    self.pipeline.clone(),
                    rate,
                    pipeline_config.output_block_frames(),
                )?;
                Ok(Consumer::Clocked(sink))
            }
            #[cfg(feature = "device")]
            SinkConfig::Device => {
                let output = DeviceOutput::new(self.pipeline.clone());
                output.enable()?;
                Ok(Consumer::Device(output))
            }
            #[cfg(not(feature = "device"))]
            SinkConfig::Device => bail!("Device sink requires the `device` feature"),
        }
    }
}
