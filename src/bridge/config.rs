//! Configuration for the bridge runner.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;

/// Where producer frames come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Synthetic {
        #[serde(default = "default_frequency")]
        frequency: f64,
        /// Producer clock error in ppm.
        #[serde(default)]
        drift_ppm: f64,
        /// Maximum timestamp jitter in milliseconds.
        #[serde(default)]
        jitter_ms: f64,
        /// Frames per delivery. Defaults to one input block.
        #[serde(default)]
        block_frames: Option<usize>,
    },
    /// Default capture device (needs the `device` feature).
    Device,
}

/// Where converted frames go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Clocked {
        /// Consumer clock error in ppm.
        #[serde(default)]
        drift_ppm: f64,
    },
    /// Default playback device (needs the `device` feature).
    Device,
}

fn default_frequency() -> f64 {
    440.0
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Synthetic {
            frequency: default_frequency(),
            drift_ppm: 0.0,
            jitter_ms: 0.0,
            block_frames: None,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::Clocked { drift_ppm: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub sink: SinkConfig,
    /// Stop after this many seconds. Runs until the pipeline stops otherwise.
    pub run_secs: Option<f64>,
    pub report_interval_secs: f64,
    pub pull_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                estimate_input_rate: true,
                ..PipelineConfig::new(8000.0, 48000.0, 1)
            },
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
            run_secs: None,
            report_interval_secs: 1.0,
            pull_timeout_ms: 500,
        }
    }
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("Failed to parse bridge config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline
            .validate()
            .context("Invalid pipeline configuration")?;
        anyhow::ensure!(
            self.report_interval_secs > 0.0,
            "report_interval_secs must be positive, got {}",
            self.report_interval_secs
        );
        anyhow::ensure!(self.pull_timeout_ms > 0, "pull_timeout_ms must be positive");
        if let Some(run_secs) = self.run_secs {
            anyhow::ensure!(run_secs > 0.0, "run_secs must be positive, got {}", run_secs);
        }
        if let SourceConfig::Synthetic { frequency, block_frames, .. } = &self.source {
            anyhow::ensure!(*frequency > 0.0, "Sine frequency must be positive");
            anyhow::ensure!(*block_frames != Some(0), "block_frames must be positive");
        }
        Ok(())
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs_f64(self.report_interval_secs)
    }
}
