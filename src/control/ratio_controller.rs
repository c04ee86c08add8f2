//! Feedback control of the conversion ratio from output-buffer occupancy.
//!
//! Every tick the controller extrapolates a ratio that would bring the output
//! buffer back to half full within one block:
//!
//! ```text
//! estimate = nominal + (capacity / 2 - occupancy) / block
//! ```
//!
//! clamped to `nominal * (1 ± max_deviation)`. The ratio is then smoothed
//! toward a target with a coefficient that depends on the occupancy zone:
//!
//! ```text
//!   0%        very_low    low    high    very_high       100%
//!   |  fast    |   slow    | settle |   slow   |   fast    |
//!   | →estimate|→estimate  |→nominal|→estimate | →estimate |
//! ```
//!
//! The settle zone pulls the ratio back to nominal so noise in the estimate
//! cannot leave it permanently offset.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Zone thresholds (fractions of capacity) and per-zone smoothing coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerTuning {
    pub very_low: f64,
    pub low: f64,
    pub high: f64,
    pub very_high: f64,
    /// Smoothing toward the estimate outside `very_low..=very_high`.
    pub fast_smoothing: f64,
    /// Smoothing toward the estimate in the low and high zones.
    pub slow_smoothing: f64,
    /// Smoothing toward nominal in the normal zone.
    pub settle_smoothing: f64,
    /// Largest allowed relative deviation from the nominal ratio.
    pub max_deviation: f64,
}

impl Default for ControllerTuning {
    fn default() -> Self {
        Self {
            very_low: 0.40,
            low: 0.48,
            high: 0.52,
            very_high: 0.60,
            fast_smoothing: 0.1,
            slow_smoothing: 0.01,
            settle_smoothing: 0.1,
            max_deviation: 0.2,
        }
    }
}

impl ControllerTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [self.very_low, self.low, self.high, self.very_high];
        let ordered = 0.0 <= self.very_low
            && self.very_low <= self.low
            && self.low < 0.5
            && 0.5 < self.high
            && self.high <= self.very_high
            && self.very_high <= 1.0;
        if !ordered {
            return Err(ConfigError::Thresholds(thresholds));
        }

        for (name, value) in [
            ("fast_smoothing", self.fast_smoothing),
            ("slow_smoothing", self.slow_smoothing),
            ("settle_smoothing", self.settle_smoothing),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::OutOfRange {
                    name,
                    value,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }

        if !(self.max_deviation > 0.0 && self.max_deviation < 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "max_deviation",
                value: self.max_deviation,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyZone {
    VeryLow,
    Low,
    Normal,
    High,
    VeryHigh,
}

impl OccupancyZone {
    /// Classifies a fill fraction. The emergency zones take precedence.
    pub fn classify(fill: f64, tuning: &ControllerTuning) -> Self {
        if fill < tuning.very_low {
            Self::VeryLow
        } else if fill > tuning.very_high {
            Self::VeryHigh
        } else if fill < tuning.low {
            Self::Low
        } else if fill > tuning.high {
            Self::High
        } else {
            Self::Normal
        }
    }
}

#[derive(Debug, Clone)]
pub struct RatioController {
    output_rate: f64,
    block_frames: f64,
    tuning: ControllerTuning,
    nominal: f64,
    ratio: f64,
    zone: OccupancyZone,
}

impl RatioController {
    /// `block_frames` is the number of output frames moved per control tick.
    pub fn new(input_rate: f64, output_rate: f64, block_frames: usize, tuning: ControllerTuning) -> Self {
        let nominal = output_rate / input_rate;
        Self {
            output_rate,
            block_frames: block_frames.max(1) as f64,
            tuning,
            nominal,
            ratio: nominal,
            zone: OccupancyZone::Normal,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn nominal(&self) -> f64 {
        self.nominal
    }

    /// Zone seen by the last update.
    pub fn zone(&self) -> OccupancyZone {
        self.zone
    }

    pub fn tuning(&self) -> &ControllerTuning {
        &self.tuning
    }

    /// Allowed ratio range around the current nominal ratio.
    pub fn bounds(&self) -> (f64, f64) {
        (
            self.nominal * (1.0 - self.tuning.max_deviation),
            self.nominal * (1.0 + self.tuning.max_deviation),
        )
    }

    /// Returns to steady state for a (re)started stream.
    pub fn reset(&mut self, input_rate: f64) {
        self.set_input_rate(input_rate);
        self.ratio = self.nominal;
        self.zone = OccupancyZone::Normal;
    }

    /// Runs one control tick and returns the new ratio.
    ///
    /// `input_rate` is the best current knowledge of the producer rate; a
    /// non-positive or non-finite value keeps the previous nominal ratio.
    pub fn update(&mut self, occupancy: usize, capacity: usize, input_rate: f64) -> f64 {
        self.set_input_rate(input_rate);
        if capacity == 0 {
            return self.ratio;
        }

        let (min, max) = self.bounds();
        let capacity = capacity as f64;
        let occupancy = occupancy as f64;

        let estimate =
            (self.nominal + (0.5 * capacity - occupancy) / self.block_frames).clamp(min, max);

        let zone = OccupancyZone::classify(occupancy / capacity, &self.tuning);
        let (target, lambda) = match zone {
            OccupancyZone::VeryLow | OccupancyZone::VeryHigh => {
                (estimate, self.tuning.fast_smoothing)
            }
            OccupancyZone::Low | OccupancyZone::High => (estimate, self.tuning.slow_smoothing),
            OccupancyZone::Normal => (self.nominal, self.tuning.settle_smoothing),
        };

        self.ratio = ((1.0 - lambda) * self.ratio + lambda * target).clamp(min, max);

        if zone != self.zone {
            debug!(
                "RatioController: {:?} -> {:?} at {:.1}% full, ratio {:.6} (nominal {:.6})",
                self.zone,
                zone,
                100.0 * occupancy / capacity,
                self.ratio,
                self.nominal
            );
            self.zone = zone;
        }

        self.ratio
    }

    fn set_input_rate(&mut self, input_rate: f64) {
        if input_rate.is_finite() && input_rate > 0.0 {
            self.nominal = self.output_rate / input_rate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FrameBuffer;
    use crate::resample::{Converter, ConverterConfig, Quality};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn controller(block: usize) -> RatioController {
        RatioController::new(8000.0, 48000.0, block, ControllerTuning::default())
    }

    #[test]
    fn test_zone_classification() {
        let tuning = ControllerTuning::default();
        let cases = [
            (0.0, OccupancyZone::VeryLow),
            (0.39, OccupancyZone::VeryLow),
            (0.45, OccupancyZone::Low),
            (0.50, OccupancyZone::Normal),
            (0.48, OccupancyZone::Normal),
            (0.52, OccupancyZone::Normal),
            (0.55, OccupancyZone::High),
            (0.61, OccupancyZone::VeryHigh),
            (1.0, OccupancyZone::VeryHigh),
        ];
        for (fill, zone) in cases {
            assert_eq!(OccupancyZone::classify(fill, &tuning), zone, "fill {fill}");
        }
    }

    #[test]
    fn test_ratio_never_leaves_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut controller = controller(80);
        let (min, max) = controller.bounds();
        assert!((min - 4.8).abs() < 1e-12 && (max - 7.2).abs() < 1e-12);

        for _ in 0..20_000 {
            let occupancy = rng.gen_range(0..=4800);
            let ratio = controller.update(occupancy, 4800, 8000.0);
            assert!(ratio >= min && ratio <= max, "ratio {ratio}");
        }

        // Sitting at an extreme for a long time saturates at the bound, not beyond.
        for _ in 0..1_000 {
            controller.update(0, 4800, 8000.0);
        }
        assert!((controller.ratio() - 7.2).abs() < 1e-9);
        for _ in 0..1_000 {
            controller.update(4800, 4800, 8000.0);
        }
        assert!((controller.ratio() - 4.8).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_follow_estimated_input_rate() {
        let mut controller = controller(80);
        for _ in 0..1_000 {
            controller.update(0, 4800, 8100.0);
        }
        let (min, max) = controller.bounds();
        assert!((controller.nominal() - 48000.0 / 8100.0).abs() < 1e-12);
        assert!(controller.ratio() <= max && controller.ratio() >= min);
    }

    #[test]
    fn test_emergency_zone_reacts_faster() {
        let mut emergency = controller(80);
        let mut chase = controller(80);

        let fast = emergency.update(1000, 4800, 8000.0) - 6.0;
        let slow = chase.update(2200, 4800, 8000.0) - 6.0;

        assert_eq!(emergency.zone(), OccupancyZone::VeryLow);
        assert_eq!(chase.zone(), OccupancyZone::Low);
        assert!(fast > 0.0 && slow > 0.0);
        assert!(fast > 5.0 * slow, "fast {fast} slow {slow}");
    }

    #[test]
    fn test_normal_zone_settles_on_nominal() {
        let mut controller = controller(80);
        for _ in 0..50 {
            controller.update(500, 4800, 8000.0);
        }
        assert!(controller.ratio() > 6.5);

        for _ in 0..300 {
            controller.update(2400, 4800, 8000.0);
        }
        assert_eq!(controller.zone(), OccupancyZone::Normal);
        assert!((controller.ratio() - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_returns_to_nominal() {
        let mut controller = controller(80);
        controller.update(0, 4800, 8000.0);
        controller.reset(16000.0);
        assert_eq!(controller.ratio(), 3.0);
        assert_eq!(controller.zone(), OccupancyZone::Normal);
    }

    #[test]
    fn test_tuning_validation() {
        assert!(ControllerTuning::default().validate().is_ok());

        let overlapping = ControllerTuning {
            low: 0.55,
            ..Default::default()
        };
        assert!(matches!(
            overlapping.validate(),
            Err(ConfigError::Thresholds(_))
        ));

        // Collapsed low or high zones are allowed.
        let collapsed = ControllerTuning {
            very_low: 0.45,
            low: 0.45,
            high: 0.55,
            very_high: 0.55,
            ..Default::default()
        };
        assert!(collapsed.validate().is_ok());

        let inverted = ControllerTuning {
            very_low: 0.47,
            low: 0.46,
            ..Default::default()
        };
        let err = inverted.validate().unwrap_err();
        assert!(err.to_string().contains("very_low <= low < 0.5 < high <= very_high"));

        let frozen = ControllerTuning {
            slow_smoothing: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            frozen.validate(),
            Err(ConfigError::OutOfRange {
                name: "slow_smoothing",
                ..
            })
        ));
    }

    /// One control tick: the consumer drains a block, the producer delivers
    /// its share, then the converter runs and the controller retunes.
    struct Loop {
        input: FrameBuffer,
        output: FrameBuffer,
        converter: Converter,
        controller: RatioController,
        carry: f64,
        produced_per_tick: f64,
        drain: Vec<f32>,
    }

    impl Loop {
        fn new(input_capacity: usize, produced_per_tick: f64) -> Self {
            let config = ConverterConfig::new(1, Quality::Linear, 4);
            Self {
                input: FrameBuffer::new(input_capacity, 1),
                output: FrameBuffer::new(4800, 1),
                converter: Converter::new(6.0, config).unwrap(),
                controller: controller(80),
                carry: 0.0,
                produced_per_tick,
                drain: vec![0.0; 80],
            }
        }

        fn tick(&mut self) {
            self.output.consume(&mut self.drain, 80);

            self.carry += self.produced_per_tick;
            let frames = self.carry.floor() as usize;
            self.carry -= frames as f64;
            let block = vec![0.25; frames];
            self.input.append(&block, frames);

            let ratio = self.controller.ratio();
            self.converter
                .convert(&mut self.input, &mut self.output, ratio)
                .unwrap();
            self.controller
                .update(self.output.occupied(), self.output.capacity(), 8000.0);
        }
    }

    #[test]
    fn test_truncated_burst_then_steady_scenario() {
        // 8 kHz into a 4800 frame output at 48 kHz, 80 output frames per tick.
        // The 800 frame input keeps only the first 800 frames of the burst.
        let mut control = Loop::new(800, 80.0 / 6.0);
        let burst = vec![0.5; 4000];
        assert_eq!(control.input.append(&burst, 4000), 800);

        for _ in 0..500 {
            control.tick();
        }

        let occupancy = control.output.occupied();
        let ratio = control.controller.ratio();
        assert!((2304..=2496).contains(&occupancy), "occupancy {occupancy}");
        assert!((5.4..=6.6).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn test_compensates_clock_mismatch() {
        for skew in [0.995, 1.005] {
            let mut control = Loop::new(800, 80.0 / 6.0 * skew);
            let prefill = vec![0.0; 400];
            control.input.append(&prefill, 400);

            let mut ratio_sum = 0.0;
            for tick in 0..3000 {
                control.tick();
                if tick >= 2500 {
                    let occupancy = control.output.fill_fraction();
                    assert!((0.4..=0.6).contains(&occupancy), "skew {skew}: {occupancy}");
                    ratio_sum += control.controller.ratio();
                }
            }

            let mean_ratio = ratio_sum / 500.0;
            let expected = 6.0 / skew;
            assert!(
                (mean_ratio - expected).abs() / expected < 2e-3,
                "skew {skew}: mean ratio {mean_ratio}, expected {expected}"
            );
        }
    }
}
