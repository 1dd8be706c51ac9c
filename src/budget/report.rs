//! Budget versus actual reporting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::budget::{BudgetSnapshot, CategoryTotals, Expense};

/// Baseline, actual and remaining amounts per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetReport {
    pub has_baseline: bool,
    pub baseline_total: Decimal,
    pub by_category: CategoryTotals,
    pub actual_by_category: CategoryTotals,
    pub remaining_by_category: CategoryTotals,
    pub total_actual: Decimal,
    pub total_remaining: Decimal,
}

impl BudgetReport {
    /// Report for a project with no baseline yet.
    pub fn empty() -> Self {
        Self {
            has_baseline: false,
            baseline_total: Decimal::ZERO,
            by_category: CategoryTotals::zeroed(),
            actual_by_category: CategoryTotals::zeroed(),
            remaining_by_category: CategoryTotals::zeroed(),
            total_actual: Decimal::ZERO,
            total_remaining: Decimal::ZERO,
        }
    }
}

/// Compare a baseline with recorded expenses. Remaining amounts go negative
/// when a category is over budget.
pub fn build_report(baseline: Option<&BudgetSnapshot>, expenses: &[Expense]) -> BudgetReport {
    let Some(baseline) = baseline else {
        return BudgetReport::empty();
    };

    let mut actual = CategoryTotals::zeroed();
    for expense in expenses {
        actual.add(expense.category, expense.amount);
    }

    let remaining = baseline.by_category.minus(&actual);
    let total_actual = actual.total();

    BudgetReport {
        has_baseline: true,
        baseline_total: baseline.total,
        by_category: baseline.by_category.clone(),
        actual_by_category: actual,
        remaining_by_category: remaining,
        total_actual,
        total_remaining: baseline.total - total_actual,
    }
}
