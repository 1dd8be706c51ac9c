//! Rounding and conversion helpers for currency amounts.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round a currency amount to whole cents, half away from zero.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a per-unit cost. Unit costs keep sub-cent precision.
pub fn round_unit_cost(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a float to a decimal, mapping NaN and infinities to zero.
pub fn from_f64_or_zero(value: f64) -> Decimal {
    if value.is_finite() {
        Decimal::from_f64(value).unwrap_or_default()
    } else {
        Decimal::ZERO
    }
}

/// Round a float measurement to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
