//! Delivery cost estimation.
//!
//! ```text
//! minutes  = miles / speed * 60
//! variable = miles * per_mile + minutes * per_minute
//! fuel     = (base + variable) * fuel_pct
//! total    = base + variable + fuel
//! ```

pub mod geo;

pub use geo::{Coordinates, haversine_miles};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::DeliveryConfig;
use crate::money::{from_f64_or_zero, round2, round_cents};

/// Slowest average speed the model accepts, in mph.
const MIN_SPEED_MPH: f64 = 1.0;

/// Itemized delivery cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryQuote {
    pub miles: f64,
    pub minutes: f64,
    pub base: Decimal,
    pub variable: Decimal,
    pub fuel: Decimal,
    pub total: Decimal,
}

/// Prices deliveries with a flat + per-mile + per-minute + fuel model.
#[derive(Debug, Clone, Default)]
pub struct DeliveryEstimator {
    config: DeliveryConfig,
}

impl DeliveryEstimator {
    pub fn new(config: DeliveryConfig) -> Self {
        Self { config }
    }

    /// Quote a delivery. `avg_speed_mph` defaults to the configured speed and
    /// is clamped to at least 1 mph.
    pub fn estimate(
        &self,
        origin: Coordinates,
        dest: Coordinates,
        avg_speed_mph: Option<f64>,
    ) -> DeliveryQuote {
        let speed = avg_speed_mph
            .unwrap_or(self.config.avg_speed_mph)
            .max(MIN_SPEED_MPH);

        let miles = haversine_miles(origin, dest);
        let minutes = miles / speed * 60.0;

        let base = self.config.base_fee;
        let variable = from_f64_or_zero(miles) * self.config.per_mile
            + from_f64_or_zero(minutes) * self.config.per_minute;
        let fuel = (base + variable) * self.config.fuel_pct;
        let total = base + variable + fuel;

        tracing::debug!(miles, minutes, total = %total, "Delivery quoted");

        DeliveryQuote {
            miles: round2(miles),
            minutes: round2(minutes),
            base: round_cents(base),
            variable: round_cents(variable),
            fuel: round_cents(fuel),
            total: round_cents(total),
        }
    }
}
