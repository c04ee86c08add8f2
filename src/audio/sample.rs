use std::fmt::Debug;

use num_traits::{Bounded, FromPrimitive, Num, ToPrimitive};

/// A device sample format that can be carried through the `f32` pipeline.
pub trait AudioSample:
    Num + Copy + Send + Sync + PartialOrd + ToPrimitive + FromPrimitive + Bounded + Debug + 'static
{
    fn silence() -> Self;

    /// Normalized value in `[-1.0, 1.0]`.
    fn to_f32_normalized(self) -> f32;

    fn from_f32_normalized(value: f32) -> Self;
}

fn full_scale<S: Bounded + ToPrimitive>() -> f32 {
    S::max_value().to_f32().unwrap_or(1.0)
}

fn signed_to_f32<S: Bounded + ToPrimitive>(value: S) -> f32 {
    value.to_f32().unwrap_or(0.0) / full_scale::<S>()
}

fn signed_from_f32<S: Bounded + ToPrimitive + FromPrimitive>(value: f32) -> S {
    let scaled = (value.clamp(-1.0, 1.0) * full_scale::<S>()).round();
    S::from_f32(scaled).unwrap_or_else(|| {
        if scaled > 0.0 {
            S::max_value()
        } else {
            S::min_value()
        }
    })
}

impl AudioSample for f32 {
    fn silence() -> Self {
        0.0
    }

    fn to_f32_normalized(self) -> f32 {
        self
    }

    fn from_f32_normalized(value: f32) -> Self {
        value.clamp(-1.0, 1.0)
    }
}

impl AudioSample for f64 {
    fn silence() -> Self {
        0.0
    }

    fn to_f32_normalized(self) -> f32 {
        self as f32
    }

    fn from_f32_normalized(value: f32) -> Self {
        value.clamp(-1.0, 1.0) as f64
    }
}

impl AudioSample for i16 {
    fn silence() -> Self {
        0
    }

    fn to_f32_normalized(self) -> f32 {
        signed_to_f32(self)
    }

    fn from_f32_normalized(value: f32) -> Self {
        signed_from_f32(value)
    }
}

impl AudioSample for i32 {
    fn silence() -> Self {
        0
    }

    fn to_f32_normalized(self) -> f32 {
        signed_to_f32(self)
    }

    fn from_f32_normalized(value: f32) -> Self {
        signed_from_f32(value)
    }
}

impl AudioSample for u8 {
    fn silence() -> Self {
        128
    }

    fn to_f32_normalized(self) -> f32 {
        (self as f32 - 128.0) / 128.0
    }

    fn from_f32_normalized(value: f32) -> Self {
        (value.clamp(-1.0, 1.0) * 127.0 + 128.0).round() as u8
    }
}

impl AudioSample for u16 {
    fn silence() -> Self {
        32768
    }

    fn to_f32_normalized(self) -> f32 {
        (self as f32 - 32768.0) / 32768.0
    }

    fn from_f32_normalized(value: f32) -> Self {
        (value.clamp(-1.0, 1.0) * 32767.0 + 32768.0).round() as u16
    }
}

/// Appends device samples to `dest` as normalized `f32`.
pub fn extend_normalized<S: AudioSample>(dest: &mut Vec<f32>, src: &[S]) {
    dest.extend(src.iter().map(|&s| s.to_f32_normalized()));
}

/// Writes normalized `f32` samples into a device buffer, padding with silence
/// when `src` is shorter.
pub fn write_denormalized<S: AudioSample>(dest: &mut [S], src: &[f32]) {
    let len = src.len().min(dest.len());
    for (out, &value) in dest[..len].iter_mut().zip(src) {
        *out = S::from_f32_normalized(value);
    }
    for out in &mut dest[len..] {
        *out = S::silence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_full_scale() {
        assert_eq!(i16::from_f32_normalized(1.0), i16::MAX);
        assert_eq!(i16::from_f32_normalized(-2.0), -i16::MAX);
        assert!((i16::MAX.to_f32_normalized() - 1.0).abs() < 1e-6);
        assert_eq!(0i16.to_f32_normalized(), 0.0);
    }

    #[test]
    fn test_i32_does_not_wrap() {
        assert_eq!(i32::from_f32_normalized(1.0), i32::MAX);
        assert!(i32::from_f32_normalized(-1.0) < 0);
    }

    #[test]
    fn test_unsigned_silence_is_midpoint() {
        assert_eq!(u8::silence().to_f32_normalized(), 0.0);
        assert_eq!(u16::silence().to_f32_normalized(), 0.0);
        assert_eq!(u8::from_f32_normalized(0.0), 128);
    }

    #[test]
    fn test_write_denormalized_pads_with_silence() {
        let mut dest = [1u16; 4];
        write_denormalized(&mut dest, &[0.0, 0.0]);
        assert_eq!(dest, [32768; 4]);

        let mut dest = [0.5f32; 3];
        write_denormalized(&mut dest, &[2.0]);
        assert_eq!(dest, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extend_normalized() {
        let mut dest = vec![0.25];
        extend_normalized(&mut dest, &[0i16, i16::MAX]);
        assert_eq!(dest.len(), 3);
        assert!((dest[2] - 1.0).abs() < 1e-6);
    }
}
