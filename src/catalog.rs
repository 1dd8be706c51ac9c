//! Catalog records: assemblies, materials, vendor prices and regional factors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reusable cost template, e.g. "Paver Patio".
///
/// Assemblies are treated as immutable once an estimate line references them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assembly {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub trade: String,
    /// Unit the user-facing inputs are expressed in, e.g. "sqft".
    pub base_unit: String,
    /// Waste allowance as a fraction (0.07 = 7%).
    #[serde(default)]
    pub waste_pct: Decimal,
    #[serde(default)]
    pub items: Vec<AssemblyItem>,
}

/// One priced component of an assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyItem {
    pub name: String,
    pub unit: String,
    /// Informational default cost; used for pricing only when placeholder
    /// pricing is enabled.
    #[serde(default)]
    pub base_unit_cost: Decimal,
    /// Quantity formula over the line inputs, e.g. `area/100`.
    pub qty_formula: String,
    /// Material this item is priced as. Derived from `name` when absent.
    #[serde(default)]
    pub material_slug: Option<String>,
}

impl AssemblyItem {
    /// Slug used for price resolution.
    pub fn material_slug(&self) -> String {
        match &self.material_slug {
            Some(slug) if !slug.trim().is_empty() => slug.trim().to_string(),
            _ => slugify(&self.name),
        }
    }
}

/// A canonical priceable good.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub slug: String,
    pub name: String,
    pub unit: String,
}

/// Kind of price source a vendor represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorType {
    Supplier,
    Retail,
    Index,
}

impl VendorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorType::Supplier => "supplier",
            VendorType::Retail => "retail",
            VendorType::Index => "index",
        }
    }
}

impl std::fmt::Display for VendorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VendorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "supplier" => Ok(VendorType::Supplier),
            "retail" => Ok(VendorType::Retail),
            "index" => Ok(VendorType::Index),
            _ => Err(format!(
                "invalid vendor type '{}', expected 'supplier', 'retail', or 'index'",
                s
            )),
        }
    }
}

/// A point price observation from a vendor. Append-only; newest wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPrice {
    pub material_slug: String,
    pub vendor_name: String,
    pub vendor_type: VendorType,
    pub unit_cost: Decimal,
    /// Location the price applies to (usually a zip). `None` is a global price.
    #[serde(default)]
    pub location_key: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Cost multiplier for a region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionalFactor {
    pub region_key: String,
    pub factor: Decimal,
}

/// Lowercase slug with runs of non-alphanumerics collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
