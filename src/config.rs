//! Engine configuration loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;

use crate::error::ConfigError;

/// How long a resolved tax rate stays cached.
pub const TAX_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Upper bound on a single outbound tax rate request.
pub const TAX_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub delivery: DeliveryConfig,
    pub pricing: PricingConfig,
    pub tax: TaxConfig,
    pub database: Option<DatabaseConfig>,
}

impl EngineConfig {
    /// Build configuration from environment variables.
    ///
    /// Loads a `.env` file first if one is present. Unset variables fall back
    /// to defaults; set but unparseable values are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let defaults = DeliveryConfig::default();
        let delivery = DeliveryConfig {
            base_fee: parse_env("DELIVERY_BASE_FEE", defaults.base_fee)?,
            per_mile: parse_env("DELIVERY_PER_MILE", defaults.per_mile)?,
            per_minute: parse_env("DELIVERY_PER_MINUTE", defaults.per_minute)?,
            fuel_pct: parse_env("DELIVERY_FUEL_PCT", defaults.fuel_pct)?,
            avg_speed_mph: parse_env("DELIVERY_AVG_SPEED_MPH", defaults.avg_speed_mph)?,
        };

        let defaults = PricingConfig::default();
        let pricing = PricingConfig {
            supplier_ttl_minutes: parse_env(
                "PRICE_TTL_SUPPLIER_MINUTES",
                defaults.supplier_ttl_minutes,
            )?,
            retail_ttl_minutes: parse_env("PRICE_TTL_RETAIL_MINUTES", defaults.retail_ttl_minutes)?,
            index_ttl_minutes: parse_env("PRICE_TTL_INDEX_MINUTES", defaults.index_ttl_minutes)?,
            fallback_to_base_cost: parse_env(
                "PRICE_FALLBACK_TO_BASE_COST",
                defaults.fallback_to_base_cost,
            )?,
        };

        let tax = TaxConfig {
            api_url: optional_env("TAX_RATE_API_URL"),
            api_key: optional_env("TAX_RATE_API_KEY").map(SecretString::from),
        };

        let database = match optional_env("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url: SecretString::from(url),
                pool_size: parse_env("DATABASE_POOL_SIZE", 10usize)?,
            }),
            None => None,
        };

        Ok(Self {
            delivery,
            pricing,
            tax,
            database,
        })
    }
}

/// Delivery cost model.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Flat fee per delivery.
    pub base_fee: Decimal,
    /// Cost per mile driven.
    pub per_mile: Decimal,
    /// Cost per minute of drive time.
    pub per_minute: Decimal,
    /// Fuel surcharge as a fraction of base + variable.
    pub fuel_pct: Decimal,
    /// Average truck speed used when the caller gives none.
    pub avg_speed_mph: f64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_fee: dec!(25),
            per_mile: dec!(2),
            per_minute: dec!(0.4),
            fuel_pct: dec!(0.05),
            avg_speed_mph: 28.0,
        }
    }
}

/// Price resolution settings.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Snapshot TTL for supplier feed prices (7 days).
    pub supplier_ttl_minutes: i64,
    /// Snapshot TTL for retail feed prices (1 day).
    pub retail_ttl_minutes: i64,
    /// Snapshot TTL for regional index prices (30 days).
    pub index_ttl_minutes: i64,
    /// Price unresolvable materials at the assembly item's base cost instead
    /// of failing the estimate.
    pub fallback_to_base_cost: bool,
}

impl PricingConfig {
    /// TTL in minutes for the named provider. Unknown providers get the
    /// shortest configured TTL.
    pub fn ttl_minutes_for(&self, provider: &str) -> i64 {
        match provider {
            "supplier" => self.supplier_ttl_minutes,
            "retail" => self.retail_ttl_minutes,
            "index" => self.index_ttl_minutes,
            _ => self
                .supplier_ttl_minutes
                .min(self.retail_ttl_minutes)
                .min(self.index_ttl_minutes),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            supplier_ttl_minutes: 7 * 24 * 60,
            retail_ttl_minutes: 24 * 60,
            index_ttl_minutes: 30 * 24 * 60,
            fallback_to_base_cost: false,
        }
    }
}

/// External tax rate service settings.
#[derive(Debug, Clone, Default)]
pub struct TaxConfig {
    /// Base URL of the postal tax rate service. Lookups go to `{api_url}/{zip}`.
    pub api_url: Option<String>,
    /// Bearer token for the service.
    pub api_key: Option<SecretString>,
}

/// Postgres connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub pool_size: usize,
}

impl DatabaseConfig {
    pub fn url(&self) -> &str {
        use secrecy::ExposeSecret;
        self.url.expose_secret()
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_ttls() {
        let config = PricingConfig::default();
        assert_eq!(config.ttl_minutes_for("supplier"), 10080);
        assert_eq!(config.ttl_minutes_for("retail"), 1440);
        assert_eq!(config.ttl_minutes_for("index"), 43200);
        assert_eq!(config.ttl_minutes_for("manual"), 1440);
    }

    #[test]
    fn test_delivery_defaults() {
        let config = DeliveryConfig::default();
        assert_eq!(config.base_fee, dec!(25));
        assert_eq!(config.per_mile, dec!(2));
        assert_eq!(config.per_minute, dec!(0.4));
        assert_eq!(config.fuel_pct, dec!(0.05));
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        // SAFETY: test-only variable name not read elsewhere.
        unsafe { std::env::set_var("HARDSCAPE_TEST_BAD_NUMBER", "twelve") };
        let result: Result<i64, _> = parse_env("HARDSCAPE_TEST_BAD_NUMBER", 5);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        unsafe { std::env::remove_var("HARDSCAPE_TEST_BAD_NUMBER") };
    }

    #[test]
    fn test_parse_env_default_when_unset() {
        let value: i64 = parse_env("HARDSCAPE_TEST_UNSET_NUMBER", 7).unwrap();
        assert_eq!(value, 7);
    }
}
