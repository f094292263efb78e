//! Numeric conversions and comparisons with the instruction set's semantics
//!
//! Float-to-integer narrowing truncates toward zero, saturates at the target
//! range and maps NaN to zero. Float comparisons take an explicit result for
//! unordered operands, so one helper serves both the `l` and `g` variants.

use num_traits::{Bounded, Float, NumCast, Zero};

/// Truncate `value` into `I`, saturating at `I`'s bounds
///
/// # Examples
///
/// ```
/// use interpreter::convert::saturating_cast;
///
/// assert_eq!(saturating_cast::<f32, i32>(3.9), 3);
/// assert_eq!(saturating_cast::<f64, i32>(-1e20), i32::MIN);
/// assert_eq!(saturating_cast::<f32, i64>(f32::NAN), 0);
/// ```
pub fn saturating_cast<F, I>(value: F) -> I
where
    F: Float,
    I: NumCast + Bounded + Zero,
{
    if value.is_nan() {
        return I::zero();
    }
    match I::from(value.trunc()) {
        Some(narrowed) => narrowed,
        None if value.is_sign_negative() => I::min_value(),
        None => I::max_value(),
    }
}

/// `f2i`
pub fn f2i(value: f32) -> i32 {
    saturating_cast(value)
}

/// `f2l`
pub fn f2l(value: f32) -> i64 {
    saturating_cast(value)
}

/// `d2i`
pub fn d2i(value: f64) -> i32 {
    saturating_cast(value)
}

/// `d2l`
pub fn d2l(value: f64) -> i64 {
    saturating_cast(value)
}

/// Three-way compare; `unordered` when either operand is NaN
pub fn compare_floats<F: Float>(a: F, b: F, unordered: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Equal) => 0,
        Some(std::cmp::Ordering::Greater) => 1,
        None => unordered,
    }
}

/// Three-way compare of two `long`s
pub fn compare_longs(a: i64, b: i64) -> i32 {
    a.cmp(&b) as i32
}

/// Shift distance for `int` shifts
pub fn int_shift(distance: i32) -> u32 {
    (distance & 0x1f) as u32
}

/// Shift distance for `long` shifts
pub fn long_shift(distance: i32) -> u32 {
    (distance & 0x3f) as u32
}
