//! In-memory store, seedable from a JSON catalog file.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::budget::{BudgetSnapshot, ChangeOrder, Expense};
use crate::catalog::{Assembly, Material, RegionalFactor, VendorPrice, VendorType};
use crate::db::{BudgetStore, CatalogStore, EstimateStore, PriceStore};
use crate::error::DatabaseError;
use crate::estimation::Estimate;
use crate::pricing::PriceSnapshot;

/// Catalog file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub assemblies: Vec<Assembly>,
    /// Mirrors the `materials` table. Pricing is keyed by slug, so the
    /// in-memory store does not load these.
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub vendor_prices: Vec<VendorPrice>,
    #[serde(default)]
    pub regional_factors: Vec<RegionalFactor>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub change_orders: Vec<ChangeOrder>,
}

impl CatalogSeed {
    /// Read a seed from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, DatabaseError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DatabaseError::Seed(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| DatabaseError::Seed(format!("{}: {}", path.display(), e)))
    }
}

#[derive(Default)]
struct Inner {
    assemblies: HashMap<Uuid, Assembly>,
    vendor_prices: Vec<VendorPrice>,
    regional_factors: HashMap<String, Decimal>,
    price_snapshots: Vec<PriceSnapshot>,
    estimates: HashMap<Uuid, Estimate>,
    budget_snapshots: Vec<BudgetSnapshot>,
    expenses: Vec<Expense>,
    change_orders: Vec<ChangeOrder>,
}

/// Store that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated from a seed.
    pub fn from_seed(seed: CatalogSeed) -> Self {
        let inner = Inner {
            assemblies: seed.assemblies.into_iter().map(|a| (a.id, a)).collect(),
            vendor_prices: seed.vendor_prices,
            regional_factors: seed
                .regional_factors
                .into_iter()
                .map(|f| (f.region_key, f.factor))
                .collect(),
            expenses: seed.expenses,
            change_orders: seed.change_orders,
            ..Default::default()
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub async fn add_assembly(&self, assembly: Assembly) {
        self.inner
            .write()
            .await
            .assemblies
            .insert(assembly.id, assembly);
    }

    pub async fn add_vendor_price(&self, price: VendorPrice) {
        self.inner.write().await.vendor_prices.push(price);
    }

    pub async fn set_regional_factor(&self, region_key: &str, factor: Decimal) {
        self.inner
            .write()
            .await
            .regional_factors
            .insert(region_key.to_string(), factor);
    }

    pub async fn add_change_order(&self, change_order: ChangeOrder) {
        self.inner.write().await.change_orders.push(change_order);
    }

    pub async fn price_snapshot_count(&self) -> usize {
        self.inner.read().await.price_snapshots.len()
    }

    pub async fn estimate_count(&self) -> usize {
        self.inner.read().await.estimates.len()
    }

    pub async fn budget_snapshot_count(&self, project_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .budget_snapshots
            .iter()
            .filter(|s| s.project_id == project_id)
            .count()
    }
}

/// Newest by timestamp; later insertion wins ties.
fn newest_by<'a, T>(
    rows: impl Iterator<Item = &'a T>,
    at: impl Fn(&T) -> DateTime<Utc>,
) -> Option<&'a T>
where
    T: 'a,
{
    rows.fold(None, |best: Option<&'a T>, row| match best {
        Some(b) if at(b) > at(row) => Some(b),
        _ => Some(row),
    })
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_assembly(&self, id: Uuid) -> Result<Option<Assembly>, DatabaseError> {
        Ok(self.inner.read().await.assemblies.get(&id).cloned())
    }

    async fn get_regional_factor(&self, region_key: &str) -> Result<Option<Decimal>, DatabaseError> {
        Ok(self
            .inner
            .read()
            .await
            .regional_factors
            .get(region_key)
            .copied())
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn list_vendor_prices(
        &self,
        material_slug: &str,
        vendor_type: VendorType,
    ) -> Result<Vec<VendorPrice>, DatabaseError> {
        Ok(self
            .inner
            .read()
            .await
            .vendor_prices
            .iter()
            .filter(|p| p.material_slug == material_slug && p.vendor_type == vendor_type)
            .cloned()
            .collect())
    }

    async fn latest_price_snapshot(
        &self,
        material_slug: &str,
        zip: &str,
    ) -> Result<Option<PriceSnapshot>, DatabaseError> {
        let inner = self.inner.read().await;
        let rows = inner
            .price_snapshots
            .iter()
            .filter(|s| s.material_slug == material_slug && s.zip == zip);
        Ok(newest_by(rows, |s| s.fetched_at).cloned())
    }

    async fn insert_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<(), DatabaseError> {
        self.inner
            .write()
            .await
            .price_snapshots
            .push(snapshot.clone());
        Ok(())
    }
}

#[async_trait]
impl EstimateStore for MemoryStore {
    async fn save_estimate(&self, estimate: &Estimate) -> Result<(), DatabaseError> {
        self.inner
            .write()
            .await
            .estimates
            .insert(estimate.id, estimate.clone());
        Ok(())
    }

    async fn get_estimate(&self, id: Uuid) -> Result<Option<Estimate>, DatabaseError> {
        Ok(self.inner.read().await.estimates.get(&id).cloned())
    }

    async fn mark_estimate_finalized(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut inner = self.inner.write().await;
        let estimate = inner
            .estimates
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "estimate".to_string(),
                id: id.to_string(),
            })?;

        if estimate.finalized_at.is_some() {
            return Ok(false);
        }
        estimate.finalized_at = Some(at);
        Ok(true)
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn insert_budget_snapshot(&self, snapshot: &BudgetSnapshot) -> Result<(), DatabaseError> {
        self.inner
            .write()
            .await
            .budget_snapshots
            .push(snapshot.clone());
        Ok(())
    }

    async fn latest_budget_snapshot(
        &self,
        project_id: Uuid,
    ) -> Result<Option<BudgetSnapshot>, DatabaseError> {
        let inner = self.inner.read().await;
        let rows = inner
            .budget_snapshots
            .iter()
            .filter(|s| s.project_id == project_id);
        Ok(newest_by(rows, |s| s.created_at).cloned())
    }

    async fn list_expenses(&self, project_id: Uuid) -> Result<Vec<Expense>, DatabaseError> {
        Ok(self
            .inner
            .read()
            .await
            .expenses
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn add_expense(&self, expense: &Expense) -> Result<(), DatabaseError> {
        self.inner.write().await.expenses.push(expense.clone());
        Ok(())
    }

    async fn list_change_orders(&self, project_id: Uuid) -> Result<Vec<ChangeOrder>, DatabaseError> {
        Ok(self
            .inner
            .read()
            .await
            .change_orders
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }
}
