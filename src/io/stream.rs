//! Producers without a callback of their own.
//!
//! A [`StreamSource`] hands out frames when asked and may block while doing
//! so. [`StreamReader`] runs one on a dedicated thread and pushes what it
//! pulls into a [`Pipeline`]. A failed pull or a rejected push stops the pipeline;
//! reconnecting is left to whoever owns the source.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info};

use crate::error::{PipelineError, SourceError};
use crate::pipeline::Pipeline;

/// A source of interleaved frames read by blocking pulls.
pub trait StreamSource: Send {
    fn channels(&self) -> usize;

    /// Replaces the contents of `dest` with the next whole frames.
    ///
    /// Blocks for at most `timeout`. Returns the timestamp of the first frame
    /// in seconds, if the source has one.
    fn pull(&mut self, dest: &mut Vec<f32>, timeout: Duration) -> Result<Option<f64>, SourceError>;
}

/// A block of interleaved frames sent through a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedBlock {
    pub samples: Vec<f32>,
    pub timestamp: Option<f64>,
}

/// A [`StreamSource`] fed by another thread over a crossbeam channel.
pub struct ChannelSource {
    receiver: Receiver<TimedBlock>,
    channels: usize,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<TimedBlock>, channels: usize) -> Self {
        Self { receiver, channels }
    }
}

impl StreamSource for ChannelSource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn pull(&mut self, dest: &mut Vec<f32>, timeout: Duration) -> Result<Option<f64>, SourceError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(block) => {
                *dest = block.samples;
                Ok(block.timestamp)
            }
            Err(RecvTimeoutError::Timeout) => Err(SourceError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected),
        }
    }
}

/// Drives a [`StreamSource`] into a [`Pipeline`] on its own thread.
pub struct StreamReader {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamReader {
    pub fn spawn<S: StreamSource + 'static>(
        mut source: S,
        pipeline: Arc<Pipeline>,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(
            source.channels() == pipeline.config().channels,
            "Source has {} channels but the pipeline expects {}",
            source.channels(),
            pipeline.config().channels
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("stream-reader".into())
            .spawn(move || {
                let mut block = Vec::new();
                while !thread_shutdown.load(Ordering::Relaxed) {
                    let timestamp = match source.pull(&mut block, timeout) {
                        Ok(timestamp) => timestamp,
                        Err(e) => {
                            if !thread_shutdown.load(Ordering::Relaxed) {
                                pipeline.fail(e);
                            }
                            break;
                        }
                    };

                    match pipeline.push_frames(&block, timestamp) {
                        Ok(_) => {}
                        Err(PipelineError::Stopped) => break,
                        Err(e) => {
                            error!("StreamReader: push failed: {}", e);
                            pipeline.fail(SourceError::Failed(format!("push rejected: {e}")));
                            break;
                        }
                    }
                }
                debug!("StreamReader: thread exiting");
            })
            .context("Failed to spawn stream reader thread")?;

        info!("StreamReader: started (pull timeout {:?})", timeout);
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Asks the thread to exit after its current pull and waits for it.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("StreamReader: thread panicked");
            }
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.stop();
    }
}
