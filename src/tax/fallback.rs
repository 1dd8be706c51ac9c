//! Statewide base sales tax rates, used when the rate service is unreachable.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Base rate for a two-letter state code. `None` for unknown codes.
pub fn state_rate(state: &str) -> Option<Decimal> {
    let rate = match state.trim().to_ascii_uppercase().as_str() {
        "AL" => dec!(0.04),
        "AK" => dec!(0),
        "AZ" => dec!(0.056),
        "AR" => dec!(0.065),
        "CA" => dec!(0.0725),
        "CO" => dec!(0.029),
        "CT" => dec!(0.0635),
        "DC" => dec!(0.06),
        "DE" => dec!(0),
        "FL" => dec!(0.06),
        "GA" => dec!(0.04),
        "HI" => dec!(0.04),
        "IA" => dec!(0.06),
        "ID" => dec!(0.06),
        "IL" => dec!(0.0625),
        "IN" => dec!(0.07),
        "KS" => dec!(0.065),
        "KY" => dec!(0.06),
        "LA" => dec!(0.0445),
        "MA" => dec!(0.0625),
        "MD" => dec!(0.06),
        "ME" => dec!(0.055),
        "MI" => dec!(0.06),
        "MN" => dec!(0.06875),
        "MO" => dec!(0.04225),
        "MS" => dec!(0.07),
        "MT" => dec!(0),
        "NC" => dec!(0.0475),
        "ND" => dec!(0.05),
        "NE" => dec!(0.055),
        "NH" => dec!(0),
        "NJ" => dec!(0.06625),
        "NM" => dec!(0.04875),
        "NV" => dec!(0.0685),
        "NY" => dec!(0.04),
        "OH" => dec!(0.0575),
        "OK" => dec!(0.045),
        "OR" => dec!(0),
        "PA" => dec!(0.06),
        "RI" => dec!(0.07),
        "SC" => dec!(0.06),
        "SD" => dec!(0.042),
        "TN" => dec!(0.07),
        "TX" => dec!(0.0625),
        "UT" => dec!(0.0485),
        "VA" => dec!(0.053),
        "VT" => dec!(0.06),
        "WA" => dec!(0.065),
        "WI" => dec!(0.05),
        "WV" => dec!(0.06),
        "WY" => dec!(0.04),
        _ => return None,
    };
    Some(rate)
}
