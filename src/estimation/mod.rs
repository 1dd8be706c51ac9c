//! Estimate building.
//!
//! An estimate request names assemblies and the user's inputs for each
//! (e.g. `{area: 300}`). Building one:
//! - evaluates every item's quantity formula for every line, plus waste
//! - resolves a unit price per item and applies the regional factor
//! - sums extended costs into line totals and a subtotal
//! - adds sales tax for the location
//!
//! All formulas are evaluated before any price is resolved, and nothing is
//! persisted unless every item on every line priced successfully.

pub mod formula;

pub use formula::{apply_waste, evaluate};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{Assembly, AssemblyItem};
use crate::config::PricingConfig;
use crate::db::{CatalogStore, EstimateStore};
use crate::error::EstimateError;
use crate::money::{round_cents, round_unit_cost};
use crate::pricing::{PriceQuery, PriceResolver, RegionalFactorResolver, region_key};
use crate::tax::TaxResolver;

/// Provider name recorded for items priced at the assembly's default cost.
pub const ASSEMBLY_DEFAULT_PROVIDER: &str = "assembly-default";

/// Largest accepted magnitude for a line input.
pub const MAX_INPUT_MAGNITUDE: Decimal = dec!(1000000000);

/// Job site location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

/// A request to price a set of assemblies for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub project_id: Uuid,
    #[serde(default)]
    pub location: Option<Location>,
    pub lines: Vec<LineRequest>,
}

/// One assembly and its inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub assembly_id: Uuid,
    #[serde(default)]
    pub inputs: HashMap<String, Decimal>,
}

/// A priced estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub id: Uuid,
    pub project_id: Uuid,
    pub location: Option<Location>,
    pub region_key: Option<String>,
    pub regional_factor: Decimal,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub lines: Vec<EstimateLine>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Estimate {
    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}

/// A priced assembly within an estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateLine {
    pub assembly_id: Uuid,
    pub assembly_name: String,
    pub inputs: HashMap<String, Decimal>,
    pub items: Vec<PricedItem>,
    pub line_total: Decimal,
}

/// A priced assembly item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedItem {
    pub name: String,
    pub material_slug: String,
    pub qty: Decimal,
    pub unit: String,
    /// Unit cost after the regional factor.
    pub unit_cost: Decimal,
    pub extended: Decimal,
    pub provider: String,
    pub source: String,
    pub from_cache: bool,
}

/// A line whose quantities are known but not yet priced.
struct MeasuredLine {
    index: usize,
    assembly: Assembly,
    inputs: HashMap<String, Decimal>,
    quantities: Vec<Decimal>,
}

/// Builds and persists estimates.
pub struct EstimateBuilder {
    catalog: Arc<dyn CatalogStore>,
    estimates: Arc<dyn EstimateStore>,
    prices: Arc<PriceResolver>,
    regions: RegionalFactorResolver,
    tax: Arc<TaxResolver>,
    config: PricingConfig,
}

impl EstimateBuilder {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        estimates: Arc<dyn EstimateStore>,
        prices: Arc<PriceResolver>,
        tax: Arc<TaxResolver>,
        config: PricingConfig,
    ) -> Self {
        Self {
            regions: RegionalFactorResolver::new(catalog.clone()),
            catalog,
            estimates,
            prices,
            tax,
            config,
        }
    }

    /// Price every line of `request` and persist the estimate.
    pub async fn build(&self, request: &EstimateRequest) -> Result<Estimate, EstimateError> {
        validate(request)?;

        let location = request.location.clone().unwrap_or_default();
        let zip = non_blank(location.zip.as_deref());
        let state = non_blank(location.state.as_deref());

        let region = region_key(zip, state, location.city.as_deref());
        let factor = self.regions.get_factor(region.as_deref()).await?;

        let mut measured = Vec::with_capacity(request.lines.len());
        for (index, line) in request.lines.iter().enumerate() {
            measured.push(self.measure(index, line).await?);
        }

        let mut lines = Vec::with_capacity(measured.len());
        for line in measured {
            lines.push(self.price_line(line, zip, factor).await?);
        }

        let subtotal = checked_sum(lines.iter().map(|l| l.line_total))
            .map(round_cents)
            .ok_or_else(|| EstimateError::OutOfRange("subtotal".to_string()))?;
        let tax = self.tax.compute_tax(subtotal, zip, state).await;
        let total = subtotal
            .checked_add(tax.tax)
            .ok_or_else(|| EstimateError::OutOfRange("total".to_string()))?;

        let estimate = Estimate {
            id: Uuid::new_v4(),
            project_id: request.project_id,
            location: request.location.clone(),
            region_key: region,
            regional_factor: factor,
            subtotal,
            tax_rate: tax.rate,
            tax: tax.tax,
            total,
            lines,
            created_at: Utc::now(),
            finalized_at: None,
        };

        self.estimates.save_estimate(&estimate).await?;

        tracing::info!(
            estimate_id = %estimate.id,
            project_id = %estimate.project_id,
            lines = estimate.lines.len(),
            subtotal = %estimate.subtotal,
            tax = %estimate.tax,
            total = %estimate.total,
            "Estimate created"
        );

        Ok(estimate)
    }

    /// Load the assembly and evaluate its quantities, with waste applied.
    async fn measure(&self, index: usize, line: &LineRequest) -> Result<MeasuredLine, EstimateError> {
        let assembly = self
            .catalog
            .get_assembly(line.assembly_id)
            .await?
            .ok_or(EstimateError::AssemblyNotFound(line.assembly_id))?;

        let quantities = assembly
            .items
            .iter()
            .map(|item| -> Result<Decimal, EstimateError> {
                let raw = evaluate(&item.qty_formula, &line.inputs).map_err(|source| {
                    EstimateError::InvalidFormula {
                        line: index,
                        item: item.name.clone(),
                        source,
                    }
                })?;
                apply_waste(raw, assembly.waste_pct)
                    .map(|qty| qty.round_dp(4))
                    .ok_or_else(|| out_of_range(index, &item.name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MeasuredLine {
            index,
            assembly,
            inputs: line.inputs.clone(),
            quantities,
        })
    }

    async fn price_line(
        &self,
        line: MeasuredLine,
        zip: Option<&str>,
        factor: Decimal,
    ) -> Result<EstimateLine, EstimateError> {
        let mut items = Vec::with_capacity(line.assembly.items.len());
        for (item, qty) in line.assembly.items.iter().zip(line.quantities) {
            items.push(self.price_item(line.index, item, qty, zip, factor).await?);
        }

        let line_total = checked_sum(items.iter().map(|i| i.extended))
            .map(round_cents)
            .ok_or_else(|| out_of_range(line.index, &line.assembly.name))?;

        Ok(EstimateLine {
            assembly_id: line.assembly.id,
            assembly_name: line.assembly.name,
            inputs: line.inputs,
            items,
            line_total,
        })
    }

    async fn price_item(
        &self,
        index: usize,
        item: &AssemblyItem,
        qty: Decimal,
        zip: Option<&str>,
        factor: Decimal,
    ) -> Result<PricedItem, EstimateError> {
        let material_slug = item.material_slug();
        let mut query = PriceQuery::new(material_slug.clone())
            .with_uom(item.unit.clone())
            .with_qty(qty);
        query.zip = zip.map(str::to_string);

        let (base_cost, provider, source, from_cache) =
            match self.prices.resolve_detailed(&query).await? {
                Some(resolution) => (
                    resolution.price.unit_cost,
                    resolution.price.provider,
                    resolution.price.source,
                    resolution.from_cache,
                ),
                None if self.config.fallback_to_base_cost => {
                    tracing::warn!(
                        material = %material_slug,
                        item = %item.name,
                        "No price found, using assembly default cost"
                    );
                    (
                        item.base_unit_cost,
                        ASSEMBLY_DEFAULT_PROVIDER.to_string(),
                        ASSEMBLY_DEFAULT_PROVIDER.to_string(),
                        false,
                    )
                }
                None => {
                    return Err(EstimateError::MaterialNotFound {
                        material_slug,
                        item: item.name.clone(),
                    });
                }
            };

        let unit_cost = base_cost
            .checked_mul(factor)
            .map(round_unit_cost)
            .ok_or_else(|| out_of_range(index, &item.name))?;
        let extended = qty
            .checked_mul(unit_cost)
            .map(round_cents)
            .ok_or_else(|| out_of_range(index, &item.name))?;

        Ok(PricedItem {
            name: item.name.clone(),
            material_slug,
            qty,
            unit: item.unit.clone(),
            unit_cost,
            extended,
            provider,
            source,
            from_cache,
        })
    }
}

fn out_of_range(line: usize, name: &str) -> EstimateError {
    EstimateError::OutOfRange(format!("line {}, '{}'", line, name))
}

fn checked_sum(values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    values.fold(Some(Decimal::ZERO), |acc, v| acc?.checked_add(v))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Reject malformed requests before any lookups happen.
pub fn validate(request: &EstimateRequest) -> Result<(), EstimateError> {
    if request.lines.is_empty() {
        return Err(EstimateError::invalid_input("lines", "at least one line is required"));
    }

    for (index, line) in request.lines.iter().enumerate() {
        for (key, value) in &line.inputs {
            if !is_identifier(key) {
                return Err(EstimateError::invalid_input(
                    format!("lines[{}].inputs", index),
                    format!("'{}' is not a valid input name", key),
                ));
            }
            if value.abs() > MAX_INPUT_MAGNITUDE {
                return Err(EstimateError::invalid_input(
                    format!("lines[{}].inputs.{}", index, key),
                    format!("magnitude exceeds {}", MAX_INPUT_MAGNITUDE),
                ));
            }
        }
    }

    let Some(location) = &request.location else {
        return Ok(());
    };

    if let Some(zip) = location.zip.as_deref().filter(|z| !z.trim().is_empty()) {
        if !is_zip(zip.trim()) {
            return Err(EstimateError::invalid_input(
                "location.zip",
                format!("'{}' is not a US zip code", zip),
            ));
        }
    }
    if let Some(state) = location.state.as_deref().filter(|s| !s.trim().is_empty()) {
        let state = state.trim();
        if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(EstimateError::invalid_input(
                "location.state",
                format!("'{}' is not a two-letter state code", state),
            ));
        }
    }
    if let Some(lat) = location.lat {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(EstimateError::invalid_input("location.lat", "must be within [-90, 90]"));
        }
    }
    if let Some(lng) = location.lng {
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(EstimateError::invalid_input("location.lng", "must be within [-180, 180]"));
        }
    }

    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_zip(zip: &str) -> bool {
    let digits = |s: &str, n: usize| s.len() == n && s.chars().all(|c| c.is_ascii_digit());
    match zip.split_once('-') {
        Some((five, four)) => digits(five, 5) && digits(four, 4),
        None => digits(zip, 5),
    }
}
