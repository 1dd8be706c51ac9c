//! Budget baselines and budget-versus-actual tracking.
//!
//! Finalizing an estimate captures a baseline snapshot of its cost per
//! category. Snapshots are immutable and never recomputed from the estimate;
//! a project can accumulate several and reports always use the newest.
//! Actual spend is recorded separately as expenses.

pub mod profit;
pub mod report;
pub mod snapshot;

pub use profit::{ProfitSummary, summarize};
pub use report::{BudgetReport, build_report};
pub use snapshot::{build_snapshot, categorize};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{BudgetStore, EstimateStore};
use crate::error::BudgetError;

/// Cost category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Material,
    Labor,
    Equipment,
    Subcontractor,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Material,
        Category::Labor,
        Category::Equipment,
        Category::Subcontractor,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Material => "MATERIAL",
            Category::Labor => "LABOR",
            Category::Equipment => "EQUIPMENT",
            Category::Subcontractor => "SUBCONTRACTOR",
            Category::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "invalid category '{}', expected one of MATERIAL, LABOR, EQUIPMENT, SUBCONTRACTOR, OTHER",
                    s
                )
            })
    }
}

/// Amount per category. Always holds all five categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Category, Decimal>", into = "BTreeMap<Category, Decimal>")]
pub struct CategoryTotals(BTreeMap<Category, Decimal>);

impl CategoryTotals {
    pub fn zeroed() -> Self {
        Self(Category::ALL.into_iter().map(|c| (c, Decimal::ZERO)).collect())
    }

    pub fn get(&self, category: Category) -> Decimal {
        self.0.get(&category).copied().unwrap_or_default()
    }

    pub fn add(&mut self, category: Category, amount: Decimal) {
        *self.0.entry(category).or_default() += amount;
    }

    pub fn total(&self) -> Decimal {
        self.0.values().copied().sum()
    }

    /// Per-category `self - other`.
    pub fn minus(&self, other: &CategoryTotals) -> CategoryTotals {
        Self(
            Category::ALL
                .into_iter()
                .map(|c| (c, self.get(c) - other.get(c)))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, Decimal)> + '_ {
        self.0.iter().map(|(c, v)| (*c, *v))
    }
}

impl Default for CategoryTotals {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl From<BTreeMap<Category, Decimal>> for CategoryTotals {
    fn from(map: BTreeMap<Category, Decimal>) -> Self {
        let mut totals = Self::zeroed();
        for (category, amount) in map {
            totals.add(category, amount);
        }
        totals
    }
}

impl From<CategoryTotals> for BTreeMap<Category, Decimal> {
    fn from(totals: CategoryTotals) -> Self {
        totals.0
    }
}

/// Immutable cost baseline captured from an estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub id: Uuid,
    pub project_id: Uuid,
    pub estimate_id: Uuid,
    pub total: Decimal,
    pub by_category: CategoryTotals,
    pub created_at: DateTime<Utc>,
}

/// Actual spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub project_id: Uuid,
    pub category: Category,
    pub vendor: String,
    pub amount: Decimal,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOrderStatus {
    Pending,
    Approved,
    Rejected,
}

impl ChangeOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOrderStatus::Pending => "PENDING",
            ChangeOrderStatus::Approved => "APPROVED",
            ChangeOrderStatus::Rejected => "REJECTED",
        }
    }
}

impl std::str::FromStr for ChangeOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(ChangeOrderStatus::Pending),
            "APPROVED" => Ok(ChangeOrderStatus::Approved),
            "REJECTED" => Ok(ChangeOrderStatus::Rejected),
            _ => Err(format!("invalid change order status '{}'", s)),
        }
    }
}

/// A change to the contract value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOrder {
    pub id: Uuid,
    pub project_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub status: ChangeOrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Snapshot creation, finalization and reporting.
pub struct BudgetService {
    estimates: Arc<dyn EstimateStore>,
    budget: Arc<dyn BudgetStore>,
}

impl BudgetService {
    pub fn new(estimates: Arc<dyn EstimateStore>, budget: Arc<dyn BudgetStore>) -> Self {
        Self { estimates, budget }
    }

    /// Capture a new baseline for `project_id` from an estimate. Earlier
    /// snapshots are left untouched.
    pub async fn create_snapshot(
        &self,
        project_id: Uuid,
        estimate_id: Uuid,
    ) -> Result<BudgetSnapshot, BudgetError> {
        let estimate = self
            .estimates
            .get_estimate(estimate_id)
            .await?
            .ok_or(BudgetError::EstimateNotFound(estimate_id))?;

        if estimate.project_id != project_id {
            return Err(BudgetError::ProjectMismatch {
                project_id,
                estimate_id,
            });
        }

        let snapshot = build_snapshot(&estimate);
        self.budget.insert_budget_snapshot(&snapshot).await?;

        tracing::info!(
            snapshot_id = %snapshot.id,
            project_id = %project_id,
            estimate_id = %estimate_id,
            total = %snapshot.total,
            "Budget snapshot created"
        );

        Ok(snapshot)
    }

    /// Capture an estimate's baseline, then lock the estimate. The estimate
    /// stays open if the snapshot cannot be stored, so finalize can be retried.
    pub async fn finalize(&self, estimate_id: Uuid) -> Result<BudgetSnapshot, BudgetError> {
        let estimate = self
            .estimates
            .get_estimate(estimate_id)
            .await?
            .ok_or(BudgetError::EstimateNotFound(estimate_id))?;

        if estimate.is_finalized() {
            return Err(BudgetError::AlreadyFinalized(estimate_id));
        }

        let snapshot = self.create_snapshot(estimate.project_id, estimate_id).await?;

        if !self
            .estimates
            .mark_estimate_finalized(estimate_id, Utc::now())
            .await?
        {
            tracing::warn!(
                estimate_id = %estimate_id,
                snapshot_id = %snapshot.id,
                "Estimate finalized concurrently, keeping extra snapshot"
            );
            return Err(BudgetError::AlreadyFinalized(estimate_id));
        }

        Ok(snapshot)
    }

    /// Budget versus actual for the newest baseline.
    pub async fn get_report(&self, project_id: Uuid) -> Result<BudgetReport, BudgetError> {
        let Some(baseline) = self.budget.latest_budget_snapshot(project_id).await? else {
            return Ok(BudgetReport::empty());
        };
        let expenses = self.budget.list_expenses(project_id).await?;
        Ok(build_report(Some(&baseline), &expenses))
    }

    pub async fn profit_summary(&self, project_id: Uuid) -> Result<ProfitSummary, BudgetError> {
        let baseline = self.budget.latest_budget_snapshot(project_id).await?;
        let change_orders = self.budget.list_change_orders(project_id).await?;
        let expenses = self.budget.list_expenses(project_id).await?;
        Ok(summarize(baseline.as_ref(), &change_orders, &expenses))
    }

    pub async fn record_expense(&self, expense: &Expense) -> Result<(), BudgetError> {
        self.budget.add_expense(expense).await?;
        tracing::info!(
            project_id = %expense.project_id,
            category = %expense.category,
            amount = %expense.amount,
            "Expense recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::db::MemoryStore;
    use crate::error::DatabaseError;
    use crate::estimation::Estimate;

    /// Budget store whose snapshot writes always fail.
    struct ReadOnlyBudget;

    #[async_trait]
    impl BudgetStore for ReadOnlyBudget {
        async fn insert_budget_snapshot(&self, _: &BudgetSnapshot) -> Result<(), DatabaseError> {
            Err(DatabaseError::Query("disk full".to_string()))
        }

        async fn latest_budget_snapshot(&self, _: Uuid) -> Result<Option<BudgetSnapshot>, DatabaseError> {
            Ok(None)
        }

        async fn list_expenses(&self, _: Uuid) -> Result<Vec<Expense>, DatabaseError> {
            Ok(vec![])
        }

        async fn add_expense(&self, _: &Expense) -> Result<(), DatabaseError> {
            Ok(())
        }

        async fn list_change_orders(&self, _: Uuid) -> Result<Vec<ChangeOrder>, DatabaseError> {
            Ok(vec![])
        }
    }

    fn estimate() -> Estimate {
        Estimate {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            location: None,
            region_key: None,
            regional_factor: Decimal::ONE,
            subtotal: dec!(100.00),
            tax_rate: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: dec!(100.00),
            lines: vec![],
            created_at: Utc::now(),
            finalized_at: None,
        }
    }

    #[tokio::test]
    async fn test_failed_snapshot_leaves_estimate_open() {
        let store = Arc::new(MemoryStore::new());
        let estimate = estimate();
        store.save_estimate(&estimate).await.unwrap();

        let failing = BudgetService::new(store.clone(), Arc::new(ReadOnlyBudget));
        assert!(matches!(
            failing.finalize(estimate.id).await,
            Err(BudgetError::Database(_))
        ));
        let stored = store.get_estimate(estimate.id).await.unwrap().unwrap();
        assert!(!stored.is_finalized());

        let service = BudgetService::new(store.clone(), store.clone());
        let snapshot = service.finalize(estimate.id).await.unwrap();
        assert_eq!(snapshot.estimate_id, estimate.id);
        assert_eq!(store.budget_snapshot_count(estimate.project_id).await, 1);
        assert!(matches!(
            service.finalize(estimate.id).await,
            Err(BudgetError::AlreadyFinalized(_))
        ));
    }

    #[test]
    fn test_category_totals_always_full() {
        let totals = CategoryTotals::from(BTreeMap::from([(Category::Labor, dec!(10))]));
        assert_eq!(totals.iter().count(), 5);
        assert_eq!(totals.get(Category::Labor), dec!(10));
        assert_eq!(totals.get(Category::Other), Decimal::ZERO);
    }

    #[test]
    fn test_category_totals_json_roundtrip_fills_missing() {
        let totals: CategoryTotals = serde_json::from_str(r#"{"MATERIAL": "12.50"}"#).unwrap();
        assert_eq!(totals.get(Category::Material), dec!(12.50));
        assert_eq!(totals.total(), dec!(12.50));
        assert_eq!(totals.iter().count(), 5);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("labor".parse::<Category>(), Ok(Category::Labor));
        assert_eq!(" OTHER ".parse::<Category>(), Ok(Category::Other));
        assert!("misc".parse::<Category>().is_err());
    }
}
