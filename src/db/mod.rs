//! Repository interfaces for the estimating engine.
//!
//! Each component receives only the store it needs as an `Arc<dyn ...>`.
//! `MemoryStore` and `PgStore` implement all of them.

pub mod memory;
pub mod postgres;

pub use memory::{CatalogSeed, MemoryStore};
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::budget::{BudgetSnapshot, ChangeOrder, Expense};
use crate::catalog::{Assembly, VendorPrice, VendorType};
use crate::error::DatabaseError;
use crate::estimation::Estimate;
use crate::pricing::PriceSnapshot;

/// Assemblies and regional factors.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_assembly(&self, id: Uuid) -> Result<Option<Assembly>, DatabaseError>;

    async fn get_regional_factor(
        &self,
        region_key: &str,
    ) -> Result<Option<rust_decimal::Decimal>, DatabaseError>;
}

/// Vendor price observations and the price snapshot cache.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// All observations for a material from vendors of the given type.
    async fn list_vendor_prices(
        &self,
        material_slug: &str,
        vendor_type: VendorType,
    ) -> Result<Vec<VendorPrice>, DatabaseError>;

    /// Newest snapshot for (material, zip), regardless of freshness.
    async fn latest_price_snapshot(
        &self,
        material_slug: &str,
        zip: &str,
    ) -> Result<Option<PriceSnapshot>, DatabaseError>;

    /// Append a snapshot. Older rows stay in place.
    async fn insert_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<(), DatabaseError>;
}

/// Priced estimates.
#[async_trait]
pub trait EstimateStore: Send + Sync {
    async fn save_estimate(&self, estimate: &Estimate) -> Result<(), DatabaseError>;

    async fn get_estimate(&self, id: Uuid) -> Result<Option<Estimate>, DatabaseError>;

    /// Flag an estimate as finalized. Returns false if it already was.
    async fn mark_estimate_finalized(
        &self,
        id: Uuid,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, DatabaseError>;
}

/// Budget baselines, expenses and change orders.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn insert_budget_snapshot(&self, snapshot: &BudgetSnapshot) -> Result<(), DatabaseError>;

    async fn latest_budget_snapshot(
        &self,
        project_id: Uuid,
    ) -> Result<Option<BudgetSnapshot>, DatabaseError>;

    async fn list_expenses(&self, project_id: Uuid) -> Result<Vec<Expense>, DatabaseError>;

    async fn add_expense(&self, expense: &Expense) -> Result<(), DatabaseError>;

    async fn list_change_orders(&self, project_id: Uuid) -> Result<Vec<ChangeOrder>, DatabaseError>;
}
