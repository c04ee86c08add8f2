//! Lock-free counters describing what the pipeline absorbed.
//!
//! Truncation, eviction, zero padding and skipped timestamps are normal
//! operating conditions; these counters are the only place they surface.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::atomic::AtomicCell;

use crate::control::OccupancyZone;

const EMA_ALPHA: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    /// Producer frames stored in the input buffer.
    pub frames_in: u64,
    /// Producer frames discarded because the input buffer was full.
    pub frames_truncated: u64,
    /// Buffered frames evicted to admit newer ones.
    pub frames_evicted: u64,
    /// Real frames handed to the consumer.
    pub frames_out: u64,
    /// Frames of silence handed to the consumer on underflow.
    pub frames_padded: u64,
    pub converter_consumed: u64,
    pub converter_produced: u64,
    pub control_ticks: u64,
    pub estimator_anomalies: u64,
    pub ratio: f64,
    /// Smoothed output fill fraction (0.0 to 1.0).
    pub output_fill: f64,
    pub zone: OccupancyZone,
}

pub struct PipelineStats {
    frames_in: AtomicU64,
    frames_truncated: AtomicU64,
    frames_evicted: AtomicU64,
    frames_out: AtomicU64,
    frames_padded: AtomicU64,
    converter_consumed: AtomicU64,
    converter_produced: AtomicU64,
    control_ticks: AtomicU64,
    estimator_anomalies: AtomicU64,
    ratio: AtomicU64,
    output_fill_ema: AtomicU64,
    zone: AtomicCell<OccupancyZone>,
}

impl PipelineStats {
    pub(crate) fn new() -> Self {
        Self {
            frames_in: AtomicU64::new(0),
            frames_truncated: AtomicU64::new(0),
            frames_evicted: AtomicU64::new(0),
            frames_out: AtomicU64::new(0),
            frames_padded: AtomicU64::new(0),
            converter_consumed: AtomicU64::new(0),
            converter_produced: AtomicU64::new(0),
            control_ticks: AtomicU64::new(0),
            estimator_anomalies: AtomicU64::new(0),
            ratio: AtomicU64::new(0f64.to_bits()),
            output_fill_ema: AtomicU64::new(0f64.to_bits()),
            zone: AtomicCell::new(OccupancyZone::Normal),
        }
    }

    pub(crate) fn reset(&self, ratio: f64) {
        for counter in [
            &self.frames_in,
            &self.frames_truncated,
            &self.frames_evicted,
            &self.frames_out,
            &self.frames_padded,
            &self.converter_consumed,
            &self.converter_produced,
            &self.control_ticks,
            &self.estimator_anomalies,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.ratio.store(ratio.to_bits(), Ordering::Release);
        self.output_fill_ema
            .store(0f64.to_bits(), Ordering::Release);
        self.zone.store(OccupancyZone::Normal);
    }

    /// Current ratio as last published by the control step.
    pub fn ratio(&self) -> f64 {
        f64::from_bits(self.ratio.load(Ordering::Acquire))
    }

    pub fn output_fill(&self) -> f64 {
        f64::from_bits(self.output_fill_ema.load(Ordering::Acquire))
    }

    pub(crate) fn record_input(&self, stored: usize, truncated: usize, evicted: usize) {
        self.frames_in.fetch_add(stored as u64, Ordering::Relaxed);
        self.frames_truncated
            .fetch_add(truncated as u64, Ordering::Relaxed);
        self.frames_evicted
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_output(&self, real: usize, padded: usize) {
        self.frames_out.fetch_add(real as u64, Ordering::Relaxed);
        self.frames_padded
            .fetch_add(padded as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_anomalies(&self, total: u64) {
        self.estimator_anomalies.store(total, Ordering::Relaxed);
    }

    pub(crate) fn record_tick(
        &self,
        consumed: usize,
        produced: usize,
        ratio: f64,
        output_fill: f64,
        zone: OccupancyZone,
    ) {
        self.converter_consumed
            .fetch_add(consumed as u64, Ordering::Relaxed);
        self.converter_produced
            .fetch_add(produced as u64, Ordering::Relaxed);
        let ticks = self.control_ticks.fetch_add(1, Ordering::Relaxed);

        self.ratio.store(ratio.to_bits(), Ordering::Release);

        let ema = if ticks == 0 {
            output_fill
        } else {
            (1.0 - EMA_ALPHA) * self.output_fill() + EMA_ALPHA * output_fill
        };
        self.output_fill_ema
            .store(ema.to_bits(), Ordering::Release);
        self.zone.store(zone);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_truncated: self.frames_truncated.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            frames_padded: self.frames_padded.load(Ordering::Relaxed),
            converter_consumed: self.converter_consumed.load(Ordering::Relaxed),
            converter_produced: self.converter_produced.load(Ordering::Relaxed),
            control_ticks: self.control_ticks.load(Ordering::Relaxed),
            estimator_anomalies: self.estimator_anomalies.load(Ordering::Relaxed),
            ratio: self.ratio(),
            output_fill: self.output_fill(),
            zone: self.zone.load(),
        }
    }
}
