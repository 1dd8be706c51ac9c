//! Cached price resolutions.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A resolved price cached for a (material, zip) pair.
///
/// Rows are append-only. The newest row for a pair is the current one; it is
/// authoritative only while it is younger than its TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub id: Uuid,
    pub material_slug: String,
    pub zip: String,
    pub unit_cost: Decimal,
    /// Vendor that supplied the price.
    pub source: String,
    /// Provider that resolved it (`supplier`, `retail`, `index`).
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    pub ttl_minutes: i64,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

impl PriceSnapshot {
    /// Age of the snapshot at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    /// True while `age <= ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.age(now) <= Duration::minutes(self.ttl_minutes)
    }
}
