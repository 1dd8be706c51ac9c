//! Baseline snapshots from finalized estimates.

use chrono::Utc;
use uuid::Uuid;

use crate::budget::{BudgetSnapshot, Category, CategoryTotals};
use crate::estimation::Estimate;

/// Category for an estimate line, inferred from its assembly name.
///
/// Case-insensitive substring match, first hit wins: "labor", then "equip",
/// then "sub". Anything else is material. This is a heuristic; assemblies do
/// not carry an explicit category.
pub fn categorize(assembly_name: &str) -> Category {
    let name = assembly_name.to_lowercase();
    if name.contains("labor") {
        Category::Labor
    } else if name.contains("equip") {
        Category::Equipment
    } else if name.contains("sub") {
        Category::Subcontractor
    } else {
        Category::Material
    }
}

/// Build a new baseline from an estimate's line totals.
pub fn build_snapshot(estimate: &Estimate) -> BudgetSnapshot {
    let mut by_category = CategoryTotals::zeroed();
    for line in &estimate.lines {
        by_category.add(categorize(&line.assembly_name), line.line_total);
    }

    BudgetSnapshot {
        id: Uuid::new_v4(),
        project_id: estimate.project_id,
        estimate_id: estimate.id,
        total: by_category.total(),
        by_category,
        created_at: Utc::now(),
    }
}
