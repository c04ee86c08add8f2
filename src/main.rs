use anyhow::Result;
use tracing::{error, info};

use rate_bridge::bridge::{Bridge, BridgeConfig};

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            BridgeConfig::load(path)?
        }
        None => {
            info!("No configuration file given, using defaults");
            BridgeConfig::default()
        }
    };

    let pipeline = &config.pipeline;
    info!(
        "Starting rate bridge: {} Hz -> {} Hz, {} channel(s), {:?} quality",
        pipeline.input_rate, pipeline.output_rate, pipeline.channels, pipeline.quality
    );

    let stats = Bridge::new(config)?.run()?;
    info!(
        "Finished: {} frames in, {} frames out, {} padded, final ratio {:.6}",
        stats.frames_in, stats.frames_out, stats.frames_padded, stats.ratio
    );
    Ok(())
}
