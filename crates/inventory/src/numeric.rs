//! Floating point tolerance helpers.
//!
//! All valuation math runs in `f64`. Quantities and values are compared with a
//! relative tolerance; currency assertions round to two decimals.

/// Absolute tolerance for quantities near zero.
pub const EPSILON: f64 = 1e-9;

/// Round a monetary amount to cents (half away from zero).
pub fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Tolerant equality, scaled by magnitude for large values.
pub fn approx_eq(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= EPSILON * scale
}

/// Snap float residue (e.g. `0.1 + 0.2 - 0.3`) to exactly zero.
pub(crate) fn clamp_residue(value: f64) -> f64 {
    if value.abs() <= EPSILON { 0.0 } else { value }
}
