//! Online estimate of a producer's real sample rate from arrival timestamps.
//!
//! The mean inter-frame interval is smoothed with an exponential moving
//! average whose per-frame coefficient is `1 / (time_constant * nominal_rate)`,
//! so the estimate follows slow clock drift while ignoring arrival jitter.
//! Until enough frames have been seen for the EMA to mean anything, the
//! weight falls back to the cumulative average (`frames / total`), which makes
//! the first estimates equal to "frames received / time elapsed".

use tracing::{debug, trace};

pub const DEFAULT_TIME_CONSTANT_SECS: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct RateEstimator {
    alpha: f64,
    last_timestamp: Option<f64>,
    /// Frames covered by the interval that ends at the next timestamp.
    pending_frames: usize,
    mean_interval: Option<f64>,
    frames_seen: u64,
    anomalies: u64,
}

impl RateEstimator {
    pub fn new(nominal_rate: f64, time_constant_secs: f64) -> Self {
        let alpha = 1.0 / (time_constant_secs * nominal_rate);
        let alpha = if alpha.is_finite() && alpha > 0.0 {
            alpha.min(1.0)
        } else {
            1.0
        };

        Self {
            alpha,
            last_timestamp: None,
            pending_frames: 0,
            mean_interval: None,
            frames_seen: 0,
            anomalies: 0,
        }
    }

    /// Records the arrival of a single frame.
    pub fn observe(&mut self, timestamp: f64) -> Option<f64> {
        self.observe_block(timestamp, 1)
    }

    /// Records a block of `frames` frames whose first frame is stamped `timestamp`.
    ///
    /// Returns the current estimate, or `None` until two timestamps are known.
    /// Non-monotonic and non-finite timestamps are counted and skipped; the
    /// frames they carried are folded into the next valid interval.
    pub fn observe_block(&mut self, timestamp: f64, frames: usize) -> Option<f64> {
        if frames == 0 {
            return self.rate();
        }

        let Some(last) = self.last_timestamp else {
            if timestamp.is_finite() {
                self.last_timestamp = Some(timestamp);
                self.pending_frames = frames;
            } else {
                self.anomalies += 1;
            }
            return None;
        };

        let delta = timestamp - last;
        if !delta.is_finite() || delta <= 0.0 {
            self.anomalies += 1;
            self.pending_frames += frames;
            trace!("RateEstimator: skipped interval {delta} at {timestamp}");
            return self.rate();
        }

        let spanned = self.pending_frames;
        let interval = delta / spanned as f64;
        self.frames_seen += spanned as u64;

        let ema_weight = 1.0 - (1.0 - self.alpha).powi(spanned.min(i32::MAX as usize) as i32);
        let cumulative_weight = spanned as f64 / self.frames_seen as f64;
        let weight = ema_weight.max(cumulative_weight);

        let mean = match self.mean_interval {
            Some(mean) => mean + weight * (interval - mean),
            None => {
                debug!("RateEstimator: first estimate {:.3} Hz", 1.0 / interval);
                interval
            }
        };

        self.mean_interval = Some(mean);
        self.last_timestamp = Some(timestamp);
        self.pending_frames = frames;
        self.rate()
    }

    /// Current estimate in frames per second.
    pub fn rate(&self) -> Option<f64> {
        self.mean_interval
            .filter(|mean| mean.is_finite() && *mean > 0.0)
            .map(|mean| 1.0 / mean)
    }

    /// Number of skipped timestamps since the last reset.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    pub fn reset(&mut self) {
        self.last_timestamp = None;
        self.pending_frames = 0;
        self.mean_interval = None;
        self.frames_seen = 0;
        self.anomalies = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_first_observation_only_seeds() {
        let mut estimator = RateEstimator::new(100.0, DEFAULT_TIME_CONSTANT_SECS);
        assert_eq!(estimator.observe(5.0), None);
        assert_eq!(estimator.rate(), None);
        assert!(estimator.observe(5.01).is_some());
    }

    #[test]
    fn test_converges_on_exact_100hz() {
        let mut estimator = RateEstimator::new(100.0, DEFAULT_TIME_CONSTANT_SECS);
        let mut rate = None;
        for i in 0..1000 {
            rate = estimator.observe(12.5 + i as f64 * 0.01);
        }

        let rate = rate.unwrap();
        assert!((rate - 100.0).abs() / 100.0 < 1e-3, "rate {rate}");
    }

    #[test]
    fn test_ignores_arrival_jitter() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut estimator = RateEstimator::new(100.0, DEFAULT_TIME_CONSTANT_SECS);
        let mut rate = None;
        for i in 0..5000 {
            let jitter = rng.gen_range(-0.004..0.004);
            rate = estimator.observe(i as f64 * 0.01 + jitter);
        }

        let rate = rate.unwrap();
        assert!((rate - 100.0).abs() / 100.0 < 1e-3, "rate {rate}");
    }

    #[test]
    fn test_tracks_drift_away_from_nominal() {
        let mut estimator = RateEstimator::new(100.0, 1.0);
        let true_rate = 100.5;
        let mut rate = None;
        for i in 0..3000 {
            rate = estimator.observe(i as f64 / true_rate);
        }

        let rate = rate.unwrap();
        assert!((rate - true_rate).abs() / true_rate < 5e-4, "rate {rate}");
    }

    #[test]
    fn test_block_observations() {
        let mut estimator = RateEstimator::new(48000.0, 10.0);
        let mut rate = None;
        for block in 0..500 {
            let timestamp = block as f64 * 480.0 / 47_990.0;
            rate = estimator.observe_block(timestamp, 480);
        }

        let rate = rate.unwrap();
        assert!((rate - 47_990.0).abs() < 1.0, "rate {rate}");
    }

    #[test]
    fn test_pathological_timestamps_are_skipped() {
        let mut estimator = RateEstimator::new(100.0, DEFAULT_TIME_CONSTANT_SECS);
        estimator.observe(1.00);
        estimator.observe(1.01);

        for timestamp in [1.01, 0.5, f64::NAN, f64::INFINITY] {
            let rate = estimator.observe(timestamp).unwrap();
            assert!(rate.is_finite() && rate > 0.0);
        }
        assert_eq!(estimator.anomalies(), 4);

        // The skipped frames are folded into the next valid interval.
        let rate = estimator.observe(1.06).unwrap();
        assert!((rate - 100.0).abs() < 1e-6, "rate {rate}");
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut estimator = RateEstimator::new(100.0, DEFAULT_TIME_CONSTANT_SECS);
        estimator.observe(0.0);
        estimator.observe(0.01);
        estimator.observe(-1.0);

        estimator.reset();
        assert_eq!(estimator.rate(), None);
        assert_eq!(estimator.anomalies(), 0);
        assert_eq!(estimator.observe(3.0), None);
    }
}
