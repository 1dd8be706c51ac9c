//! Price providers.
//!
//! A provider answers price queries from one kind of source. The resolver
//! walks providers in a fixed priority order and takes the first answer:
//!
//! ```text
//!   supplier feed  ──miss──▶  retail feed  ──miss──▶  regional index
//!   (7 day TTL)               (1 day TTL)             (30 day TTL)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::catalog::{VendorPrice, VendorType};
use crate::db::PriceStore;
use crate::error::PricingError;
use crate::pricing::{PriceQuery, PriceResult};

/// A source of unit prices.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Provider name, also the key for its snapshot TTL.
    fn name(&self) -> &str;

    /// Whether this provider should be asked about the query at all.
    fn can_handle(&self, query: &PriceQuery) -> bool;

    /// Resolve a price, or `None` if this provider has nothing.
    async fn get_price(&self, query: &PriceQuery) -> Result<Option<PriceResult>, PricingError>;
}

/// Supplier and retail feeds: vendor prices of one vendor type, preferring a
/// price for the query's zip over a global one.
pub struct VendorFeedProvider {
    vendor_type: VendorType,
    store: Arc<dyn PriceStore>,
}

impl VendorFeedProvider {
    pub fn supplier(store: Arc<dyn PriceStore>) -> Self {
        Self {
            vendor_type: VendorType::Supplier,
            store,
        }
    }

    pub fn retail(store: Arc<dyn PriceStore>) -> Self {
        Self {
            vendor_type: VendorType::Retail,
            store,
        }
    }
}

#[async_trait]
impl PriceProvider for VendorFeedProvider {
    fn name(&self) -> &str {
        self.vendor_type.as_str()
    }

    fn can_handle(&self, query: &PriceQuery) -> bool {
        !query.material_slug.trim().is_empty()
    }

    async fn get_price(&self, query: &PriceQuery) -> Result<Option<PriceResult>, PricingError> {
        let rows = self
            .store
            .list_vendor_prices(&query.material_slug, self.vendor_type)
            .await?;

        Ok(select_for_location(&rows, query.location_zip())
            .map(|row| to_result(self.name(), row, query)))
    }
}

/// City-wide baseline prices. Location is ignored.
pub struct IndexProvider {
    store: Arc<dyn PriceStore>,
}

impl IndexProvider {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PriceProvider for IndexProvider {
    fn name(&self) -> &str {
        VendorType::Index.as_str()
    }

    fn can_handle(&self, query: &PriceQuery) -> bool {
        !query.material_slug.trim().is_empty()
    }

    async fn get_price(&self, query: &PriceQuery) -> Result<Option<PriceResult>, PricingError> {
        let rows = self
            .store
            .list_vendor_prices(&query.material_slug, VendorType::Index)
            .await?;

        Ok(newest(rows.iter()).map(|row| to_result(self.name(), row, query)))
    }
}

/// The standard chain in priority order.
pub fn default_chain(store: Arc<dyn PriceStore>) -> Vec<Arc<dyn PriceProvider>> {
    vec![
        Arc::new(VendorFeedProvider::supplier(store.clone())),
        Arc::new(VendorFeedProvider::retail(store.clone())),
        Arc::new(IndexProvider::new(store)),
    ]
}

/// Newest price for `zip` if there is one, otherwise the newest global price.
/// Prices pinned to a different location are never used.
fn select_for_location<'a>(rows: &'a [VendorPrice], zip: Option<&str>) -> Option<&'a VendorPrice> {
    let local = zip.and_then(|zip| {
        newest(
            rows.iter()
                .filter(|r| r.location_key.as_deref() == Some(zip)),
        )
    });

    local.or_else(|| newest(rows.iter().filter(|r| r.location_key.is_none())))
}

fn newest<'a>(rows: impl Iterator<Item = &'a VendorPrice>) -> Option<&'a VendorPrice> {
    rows.max_by_key(|r| r.fetched_at)
}

fn to_result(provider: &str, row: &VendorPrice, query: &PriceQuery) -> PriceResult {
    PriceResult {
        unit_cost: row.unit_cost,
        currency: "USD".to_string(),
        source: row.vendor_name.clone(),
        provider: provider.to_string(),
        fetched_at: row.fetched_at,
        meta: Some(json!({
            "vendor_type": row.vendor_type,
            "location_key": row.location_key,
            "uom": query.uom,
            "qty": query.qty,
        })),
    }
}
