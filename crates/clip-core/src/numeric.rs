//! Conversion of normalized `f32` samples into the engine's element representation.
//!
//! One [`NumericConverter`] implementation per supported representation,
//! resolved at compile time. Requesting a representation without an
//! implementation is a type error; runtime names that do not map to one fail
//! with [`ClipError::UnsupportedNumericType`](crate::ClipError) when parsed.
//!
//! Integer conversions clamp to the representable range first and then round
//! to the nearest integer with ties to even (`2.5 -> 2`, `-0.5 -> 0`,
//! `126.5 -> 126`). NaN converts to zero.

use half::f16;

use crate::tensor::TensorElement;

/// Converts an already-normalized sample into `Self`.
pub trait NumericConverter: TensorElement {
    /// Convert one sample. Never fails; out-of-range handling is type-specific.
    fn convert(sample: f32) -> Self;
}

impl NumericConverter for f32 {
    fn convert(sample: f32) -> Self {
        sample
    }
}

impl NumericConverter for f16 {
    /// Round-to-nearest narrowing; magnitudes past `f16::MAX` become infinity.
    fn convert(sample: f32) -> Self {
        f16::from_f32(sample)
    }
}

impl NumericConverter for i8 {
    fn convert(sample: f32) -> Self {
        clamp_round(sample, f32::from(i8::MIN), f32::from(i8::MAX)) as i8
    }
}

impl NumericConverter for u8 {
    fn convert(sample: f32) -> Self {
        clamp_round(sample, f32::from(u8::MIN), f32::from(u8::MAX)) as u8
    }
}

impl NumericConverter for f64 {
    fn convert(sample: f32) -> Self {
        f64::from(sample)
    }
}

/// Clamp into `[min, max]`, then round half to even.
///
/// The `as` casts that follow saturate, and map NaN to zero.
fn clamp_round(sample: f32, min: f32, max: f32) -> f32 {
    sample.clamp(min, max).round_ties_even()
}
