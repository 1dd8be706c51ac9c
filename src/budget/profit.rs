//! Contract value and gross profit from change orders and expenses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::budget::{BudgetSnapshot, ChangeOrder, ChangeOrderStatus, Expense};

/// Project profitability at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitSummary {
    pub baseline_total: Decimal,
    pub approved_change_orders: Decimal,
    /// Not yet counted in the contract value.
    pub pending_change_orders: Decimal,
    pub contract_value: Decimal,
    pub actual_cost: Decimal,
    pub gross_profit: Decimal,
    /// Gross profit over contract value, 0 when there is no contract value.
    pub margin: Decimal,
}

pub fn summarize(
    baseline: Option<&BudgetSnapshot>,
    change_orders: &[ChangeOrder],
    expenses: &[Expense],
) -> ProfitSummary {
    let baseline_total = baseline.map(|b| b.total).unwrap_or_default();

    let sum_status = |status: ChangeOrderStatus| -> Decimal {
        change_orders
            .iter()
            .filter(|co| co.status == status)
            .map(|co| co.amount)
            .sum()
    };
    let approved = sum_status(ChangeOrderStatus::Approved);
    let pending = sum_status(ChangeOrderStatus::Pending);

    let contract_value = baseline_total + approved;
    let actual_cost: Decimal = expenses.iter().map(|e| e.amount).sum();
    let gross_profit = contract_value - actual_cost;
    let margin = if contract_value.is_zero() {
        Decimal::ZERO
    } else {
        (gross_profit / contract_value).round_dp(4)
    };

    ProfitSummary {
        baseline_total,
        approved_change_orders: approved,
        pending_change_orders: pending,
        contract_value,
        actual_cost,
        gross_profit,
        margin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::budget::{Category, CategoryTotals};

    fn change_order(amount: Decimal, status: ChangeOrderStatus) -> ChangeOrder {
        ChangeOrder {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            description: "Add fire pit".to_string(),
            amount,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_counts_only_approved() {
        let mut by_category = CategoryTotals::zeroed();
        by_category.add(Category::Material, dec!(10000));
        let snapshot = BudgetSnapshot {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            estimate_id: Uuid::new_v4(),
            total: dec!(10000),
            by_category,
            created_at: Utc::now(),
        };
        let orders = vec![
            change_order(dec!(2000), ChangeOrderStatus::Approved),
            change_order(dec!(750), ChangeOrderStatus::Pending),
            change_order(dec!(5000), ChangeOrderStatus::Rejected),
        ];
        let expenses = vec![Expense {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            category: Category::Material,
            vendor: "Bay Stone Supply".to_string(),
            amount: dec!(9000),
            date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        }];

        let summary = summarize(Some(&snapshot), &orders, &expenses);

        assert_eq!(summary.contract_value, dec!(12000));
        assert_eq!(summary.pending_change_orders, dec!(750));
        assert_eq!(summary.gross_profit, dec!(3000));
        assert_eq!(summary.margin, dec!(0.25));
    }

    #[test]
    fn test_zero_contract_value_has_zero_margin() {
        let summary = summarize(None, &[], &[]);
        assert_eq!(summary.contract_value, Decimal::ZERO);
        assert_eq!(summary.margin, Decimal::ZERO);
    }
}
