//! Sales tax resolution.
//!
//! Rates are looked up per zip from an external service, cached in process
//! for an hour, and fall back to statewide base rates when the service fails.
//! Tax computation never fails: the worst case is a rate of zero.

mod fallback;
mod lookup;

pub use fallback::state_rate;
pub use lookup::{HttpRateLookup, RateLookup};

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::config::{TAX_CACHE_TTL, TAX_LOOKUP_TIMEOUT, TaxConfig};
use crate::error::TaxLookupError;
use crate::money::round_cents;

/// Where a tax rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Cache,
    Service,
    StateTable,
    Unknown,
}

/// Result of a tax computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxComputation {
    pub rate: Decimal,
    pub tax: Decimal,
    pub source: RateSource,
}

/// Resolves tax rates and computes tax on a subtotal.
pub struct TaxResolver {
    lookup: Arc<dyn RateLookup>,
    cache: TtlCache<String, Decimal>,
    timeout: Duration,
}

impl TaxResolver {
    /// Resolver backed by the HTTP rate service described by `config`.
    pub fn from_config(config: &TaxConfig) -> Self {
        Self::new(Arc::new(HttpRateLookup::new(config)))
    }

    pub fn new(lookup: Arc<dyn RateLookup>) -> Self {
        Self {
            lookup,
            cache: TtlCache::new(TAX_CACHE_TTL),
            timeout: TAX_LOOKUP_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_limits(lookup: Arc<dyn RateLookup>, cache_ttl: Duration, timeout: Duration) -> Self {
        Self {
            lookup,
            cache: TtlCache::new(cache_ttl),
            timeout,
        }
    }

    /// Compute tax on `subtotal`. Negative subtotals are taxed as zero.
    pub async fn compute_tax(
        &self,
        subtotal: Decimal,
        zip: Option<&str>,
        state: Option<&str>,
    ) -> TaxComputation {
        let (rate, source) = self.rate_for(zip, state).await;
        let taxable = subtotal.max(Decimal::ZERO);

        TaxComputation {
            rate,
            tax: round_cents(taxable * rate),
            source,
        }
    }

    /// Resolve the rate for a location.
    pub async fn rate_for(&self, zip: Option<&str>, state: Option<&str>) -> (Decimal, RateSource) {
        let zip = zip.map(str::trim).filter(|z| !z.is_empty());

        if let Some(zip) = zip {
            let key = zip.to_string();
            if let Some(rate) = self.cache.get(&key).await {
                return (rate, RateSource::Cache);
            }

            match self.fetch(zip).await {
                Ok(rate) => {
                    self.cache.set(key, rate).await;
                    return (rate, RateSource::Service);
                }
                Err(e) => {
                    tracing::warn!(zip, state, "Tax rate lookup failed, using state rate: {}", e);
                }
            }
        }

        match state.and_then(state_rate) {
            Some(rate) => (rate, RateSource::StateTable),
            None => (Decimal::ZERO, RateSource::Unknown),
        }
    }

    async fn fetch(&self, zip: &str) -> Result<Decimal, TaxLookupError> {
        match tokio::time::timeout(self.timeout, self.lookup.lookup(zip)).await {
            Ok(result) => result,
            Err(_) => Err(TaxLookupError::Timeout(self.timeout)),
        }
    }
}
