//! Unit price resolution.
//!
//! Resolution order for a material:
//! - the newest price snapshot for (material, zip), if still within its TTL
//! - otherwise the provider chain, first answer wins
//!
//! A provider answer for a query with a zip is written back as a new snapshot
//! with that provider's TTL. Snapshot rows are never updated in place.
//! Concurrent resolutions of the same uncached pair may both hit providers
//! and both insert a row; readers take the newest, so that is tolerated.

mod provider;
pub mod region;
mod snapshot;

pub use provider::{IndexProvider, PriceProvider, VendorFeedProvider, default_chain};
pub use region::{RegionalFactorResolver, region_key};
pub use snapshot::PriceSnapshot;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PricingConfig;
use crate::db::PriceStore;
use crate::error::PricingError;

/// A request for a unit price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuery {
    pub material_slug: String,
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default)]
    pub qty: Option<Decimal>,
    #[serde(default)]
    pub zip: Option<String>,
}

impl PriceQuery {
    pub fn new(material_slug: impl Into<String>) -> Self {
        Self {
            material_slug: material_slug.into(),
            uom: None,
            qty: None,
            zip: None,
        }
    }

    pub fn with_zip(mut self, zip: impl Into<String>) -> Self {
        self.zip = Some(zip.into());
        self
    }

    pub fn with_uom(mut self, uom: impl Into<String>) -> Self {
        self.uom = Some(uom.into());
        self
    }

    pub fn with_qty(mut self, qty: Decimal) -> Self {
        self.qty = Some(qty);
        self
    }

    /// The zip with surrounding whitespace removed; `None` when blank.
    /// Snapshot keys and location matching both use this form.
    pub fn location_zip(&self) -> Option<&str> {
        self.zip.as_deref().map(str::trim).filter(|z| !z.is_empty())
    }
}

/// A resolved unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResult {
    pub unit_cost: Decimal,
    pub currency: String,
    /// Vendor the price came from.
    pub source: String,
    /// Provider that produced it.
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Outcome of a resolution, with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub price: PriceResult,
    pub from_cache: bool,
}

/// Resolves unit prices through the snapshot cache and provider chain.
pub struct PriceResolver {
    store: Arc<dyn PriceStore>,
    providers: Vec<Arc<dyn PriceProvider>>,
    config: PricingConfig,
}

impl PriceResolver {
    /// Resolver with the standard supplier → retail → index chain.
    pub fn new(store: Arc<dyn PriceStore>, config: PricingConfig) -> Self {
        let providers = default_chain(store.clone());
        Self::with_providers(store, providers, config)
    }

    /// Resolver with a custom provider chain, tried in the given order.
    pub fn with_providers(
        store: Arc<dyn PriceStore>,
        providers: Vec<Arc<dyn PriceProvider>>,
        config: PricingConfig,
    ) -> Self {
        Self {
            store,
            providers,
            config,
        }
    }

    /// Resolve a unit price. `Ok(None)` means no cache entry or provider had
    /// one; the caller decides whether that is fatal.
    pub async fn resolve(&self, query: &PriceQuery) -> Result<Option<PriceResult>, PricingError> {
        Ok(self.resolve_detailed(query).await?.map(|r| r.price))
    }

    /// Like [`resolve`](Self::resolve), also reporting whether the snapshot
    /// cache answered.
    pub async fn resolve_detailed(
        &self,
        query: &PriceQuery,
    ) -> Result<Option<Resolution>, PricingError> {
        let now = Utc::now();

        if let Some(zip) = query.location_zip() {
            if let Some(snapshot) = self
                .store
                .latest_price_snapshot(&query.material_slug, zip)
                .await?
            {
                if snapshot.is_fresh(now) {
                    tracing::debug!(
                        material = %query.material_slug,
                        zip,
                        provider = %snapshot.provider,
                        "Price snapshot hit"
                    );
                    return Ok(Some(Resolution {
                        price: PriceResult {
                            unit_cost: snapshot.unit_cost,
                            currency: "USD".to_string(),
                            source: snapshot.source,
                            provider: snapshot.provider,
                            fetched_at: snapshot.fetched_at,
                            meta: snapshot.meta,
                        },
                        from_cache: true,
                    }));
                }
                tracing::debug!(
                    material = %query.material_slug,
                    zip,
                    age_minutes = snapshot.age(now).num_minutes(),
                    ttl_minutes = snapshot.ttl_minutes,
                    "Price snapshot stale"
                );
            }
        }

        for provider in &self.providers {
            if !provider.can_handle(query) {
                continue;
            }
            let Some(price) = provider.get_price(query).await? else {
                continue;
            };

            tracing::debug!(
                material = %query.material_slug,
                provider = provider.name(),
                source = %price.source,
                unit_cost = %price.unit_cost,
                "Price resolved from provider"
            );

            if let Some(zip) = query.location_zip() {
                self.write_snapshot(query, zip, &price, now).await;
            }

            return Ok(Some(Resolution {
                price,
                from_cache: false,
            }));
        }

        tracing::debug!(material = %query.material_slug, "No price found");
        Ok(None)
    }

    /// Cache a provider answer. A failed write only costs a future cache hit,
    /// so it is logged rather than returned.
    async fn write_snapshot(
        &self,
        query: &PriceQuery,
        zip: &str,
        price: &PriceResult,
        now: DateTime<Utc>,
    ) {
        let snapshot = PriceSnapshot {
            id: Uuid::new_v4(),
            material_slug: query.material_slug.clone(),
            zip: zip.to_string(),
            unit_cost: price.unit_cost,
            source: price.source.clone(),
            provider: price.provider.clone(),
            fetched_at: now,
            ttl_minutes: self.config.ttl_minutes_for(&price.provider),
            meta: price.meta.clone(),
        };

        if let Err(e) = self.store.insert_price_snapshot(&snapshot).await {
            tracing::warn!(
                material = %query.material_slug,
                zip,
                "Failed to write price snapshot: {}",
                e
            );
        }
    }
}
