//! PostgreSQL store.
//!
//! Schema: `migrations/V1__estimating.sql`, applied outside the engine.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use postgres_types::Json;
use rust_decimal::Decimal;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::budget::{BudgetSnapshot, Category, CategoryTotals, ChangeOrder, Expense};
use crate::catalog::{Assembly, AssemblyItem, VendorPrice, VendorType};
use crate::config::DatabaseConfig;
use crate::db::{BudgetStore, CatalogStore, EstimateStore, PriceStore};
use crate::error::DatabaseError;
use crate::estimation::{Estimate, EstimateLine, Location, PricedItem};
use crate::pricing::PriceSnapshot;

/// Postgres-backed store.
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Create a new store and connect to the database.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        // Test connection
        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }
}

fn parse_column<T>(value: &str, column: &str) -> Result<T, DatabaseError>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| DatabaseError::Serialization(format!("{}: {}", column, e)))
}

fn row_to_price_snapshot(row: &Row) -> PriceSnapshot {
    PriceSnapshot {
        id: row.get("id"),
        material_slug: row.get("material_slug"),
        zip: row.get("zip"),
        unit_cost: row.get("unit_cost"),
        source: row.get("source"),
        provider: row.get("provider"),
        fetched_at: row.get("fetched_at"),
        ttl_minutes: row.get("ttl_minutes"),
        meta: row.get("meta"),
    }
}

fn row_to_budget_snapshot(row: &Row) -> BudgetSnapshot {
    let Json(by_category): Json<CategoryTotals> = row.get("by_category");
    BudgetSnapshot {
        id: row.get("id"),
        project_id: row.get("project_id"),
        estimate_id: row.get("estimate_id"),
        total: row.get("total"),
        by_category,
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn get_assembly(&self, id: Uuid) -> Result<Option<Assembly>, DatabaseError> {
        let conn = self.conn().await?;

        let Some(row) = conn
            .query_opt(
                "SELECT id, slug, name, trade, base_unit, waste_pct FROM assemblies WHERE id = $1",
                &[&id],
            )
            .await?
        else {
            return Ok(None);
        };

        let items = conn
            .query(
                r#"
                SELECT name, unit, base_unit_cost, qty_formula, material_slug
                FROM assembly_items WHERE assembly_id = $1 ORDER BY position
                "#,
                &[&id],
            )
            .await?
            .iter()
            .map(|r| AssemblyItem {
                name: r.get("name"),
                unit: r.get("unit"),
                base_unit_cost: r.get("base_unit_cost"),
                qty_formula: r.get("qty_formula"),
                material_slug: r.get("material_slug"),
            })
            .collect();

        Ok(Some(Assembly {
            id: row.get("id"),
            slug: row.get("slug"),
            name: row.get("name"),
            trade: row.get("trade"),
            base_unit: row.get("base_unit"),
            waste_pct: row.get("waste_pct"),
            items,
        }))
    }

    async fn get_regional_factor(&self, region_key: &str) -> Result<Option<Decimal>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT factor FROM regional_factors WHERE region_key = $1",
                &[&region_key],
            )
            .await?;
        Ok(row.map(|r| r.get("factor")))
    }
}

#[async_trait]
impl PriceStore for PgStore {
    async fn list_vendor_prices(
        &self,
        material_slug: &str,
        vendor_type: VendorType,
    ) -> Result<Vec<VendorPrice>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT p.material_slug, v.name AS vendor_name, p.unit_cost, p.location_key, p.fetched_at
                FROM vendor_prices p
                JOIN vendors v ON v.id = p.vendor_id
                WHERE p.material_slug = $1 AND v.type = $2
                ORDER BY p.fetched_at DESC
                "#,
                &[&material_slug, &vendor_type.as_str()],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| VendorPrice {
                material_slug: r.get("material_slug"),
                vendor_name: r.get("vendor_name"),
                vendor_type,
                unit_cost: r.get("unit_cost"),
                location_key: r.get("location_key"),
                fetched_at: r.get("fetched_at"),
            })
            .collect())
    }

    async fn latest_price_snapshot(
        &self,
        material_slug: &str,
        zip: &str,
    ) -> Result<Option<PriceSnapshot>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT id, material_slug, zip, unit_cost, source, provider, fetched_at, ttl_minutes, meta
                FROM price_snapshots
                WHERE material_slug = $1 AND zip = $2
                ORDER BY fetched_at DESC
                LIMIT 1
                "#,
                &[&material_slug, &zip],
            )
            .await?;
        Ok(row.as_ref().map(row_to_price_snapshot))
    }

    async fn insert_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO price_snapshots
                (id, material_slug, zip, unit_cost, source, provider, fetched_at, ttl_minutes, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            &[
                &snapshot.id,
                &snapshot.material_slug,
                &snapshot.zip,
                &snapshot.unit_cost,
                &snapshot.source,
                &snapshot.provider,
                &snapshot.fetched_at,
                &snapshot.ttl_minutes,
                &snapshot.meta,
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl EstimateStore for PgStore {
    async fn save_estimate(&self, estimate: &Estimate) -> Result<(), DatabaseError> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        tx.execute(
            r#"
            INSERT INTO estimates (
                id, project_id, location, region_key, regional_factor,
                subtotal, tax_rate, tax, total, created_at, finalized_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
            &[
                &estimate.id,
                &estimate.project_id,
                &estimate.location.as_ref().map(Json),
                &estimate.region_key,
                &estimate.regional_factor,
                &estimate.subtotal,
                &estimate.tax_rate,
                &estimate.tax,
                &estimate.total,
                &estimate.created_at,
                &estimate.finalized_at,
            ],
        )
        .await?;

        for (position, line) in estimate.lines.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO estimate_lines (
                    estimate_id, position, assembly_id, assembly_name, inputs, items, line_total
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &estimate.id,
                    &(position as i32),
                    &line.assembly_id,
                    &line.assembly_name,
                    &Json(&line.inputs),
                    &Json(&line.items),
                    &line.line_total,
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_estimate(&self, id: Uuid) -> Result<Option<Estimate>, DatabaseError> {
        let conn = self.conn().await?;

        let Some(row) = conn
            .query_opt(
                r#"
                SELECT id, project_id, location, region_key, regional_factor,
                       subtotal, tax_rate, tax, total, created_at, finalized_at
                FROM estimates WHERE id = $1
                "#,
                &[&id],
            )
            .await?
        else {
            return Ok(None);
        };

        let lines = conn
            .query(
                r#"
                SELECT assembly_id, assembly_name, inputs, items, line_total
                FROM estimate_lines WHERE estimate_id = $1 ORDER BY position
                "#,
                &[&id],
            )
            .await?
            .iter()
            .map(|r| {
                let Json(inputs): Json<HashMap<String, Decimal>> = r.get("inputs");
                let Json(items): Json<Vec<PricedItem>> = r.get("items");
                EstimateLine {
                    assembly_id: r.get("assembly_id"),
                    assembly_name: r.get("assembly_name"),
                    inputs,
                    items,
                    line_total: r.get("line_total"),
                }
            })
            .collect();

        let location: Option<Json<Location>> = row.get("location");

        Ok(Some(Estimate {
            id: row.get("id"),
            project_id: row.get("project_id"),
            location: location.map(|Json(l)| l),
            region_key: row.get("region_key"),
            regional_factor: row.get("regional_factor"),
            subtotal: row.get("subtotal"),
            tax_rate: row.get("tax_rate"),
            tax: row.get("tax"),
            total: row.get("total"),
            lines,
            created_at: row.get("created_at"),
            finalized_at: row.get("finalized_at"),
        }))
    }

    async fn mark_estimate_finalized(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE estimates SET finalized_at = $2 WHERE id = $1 AND finalized_at IS NULL",
                &[&id, &at],
            )
            .await?;
        Ok(updated == 1)
    }
}

#[async_trait]
impl BudgetStore for PgStore {
    async fn insert_budget_snapshot(&self, snapshot: &BudgetSnapshot) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO budget_snapshots (id, project_id, estimate_id, total, by_category, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            &[
                &snapshot.id,
                &snapshot.project_id,
                &snapshot.estimate_id,
                &snapshot.total,
                &Json(&snapshot.by_category),
                &snapshot.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn latest_budget_snapshot(
        &self,
        project_id: Uuid,
    ) -> Result<Option<BudgetSnapshot>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT id, project_id, estimate_id, total, by_category, created_at
                FROM budget_snapshots
                WHERE project_id = $1
                ORDER BY created_at DESC
                LIMIT 1
                "#,
                &[&project_id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_budget_snapshot))
    }

    async fn list_expenses(&self, project_id: Uuid) -> Result<Vec<Expense>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT id, project_id, category, vendor, amount, date FROM expenses WHERE project_id = $1",
                &[&project_id],
            )
            .await?;

        rows.iter()
            .map(|r| -> Result<Expense, DatabaseError> {
                let category: String = r.get("category");
                Ok(Expense {
                    id: r.get("id"),
                    project_id: r.get("project_id"),
                    category: parse_column::<Category>(&category, "expenses.category")?,
                    vendor: r.get("vendor"),
                    amount: r.get("amount"),
                    date: r.get("date"),
                })
            })
            .collect()
    }

    async fn add_expense(&self, expense: &Expense) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO expenses (id, project_id, category, vendor, amount, date)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            &[
                &expense.id,
                &expense.project_id,
                &expense.category.as_str(),
                &expense.vendor,
                &expense.amount,
                &expense.date,
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_change_orders(&self, project_id: Uuid) -> Result<Vec<ChangeOrder>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT id, project_id, description, amount, status, created_at
                FROM change_orders WHERE project_id = $1 ORDER BY created_at
                "#,
                &[&project_id],
            )
            .await?;

        rows.iter()
            .map(|r| -> Result<ChangeOrder, DatabaseError> {
                let status: String = r.get("status");
                Ok(ChangeOrder {
                    id: r.get("id"),
                    project_id: r.get("project_id"),
                    description: r.get("description"),
                    amount: r.get("amount"),
                    status: parse_column(&status, "change_orders.status")?,
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }
}
