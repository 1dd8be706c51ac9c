//! Regional cost factors.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::db::CatalogStore;
use crate::error::DatabaseError;

/// Region key for a location: zip, else `US-{state}-{city}` with spaces
/// removed from the city, else `US-{state}`. States are uppercased.
pub fn region_key(zip: Option<&str>, state: Option<&str>, city: Option<&str>) -> Option<String> {
    fn present(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|v| !v.is_empty())
    }

    if let Some(zip) = present(zip) {
        return Some(zip.to_string());
    }
    let state = present(state)?.to_ascii_uppercase();
    match present(city) {
        Some(city) => {
            let city: String = city.chars().filter(|c| !c.is_whitespace()).collect();
            Some(format!("US-{}-{}", state, city))
        }
        None => Some(format!("US-{}", state)),
    }
}

/// Looks up cost multipliers by region key.
pub struct RegionalFactorResolver {
    store: Arc<dyn CatalogStore>,
}

impl RegionalFactorResolver {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Factor for the key, or 1.0 when the key is absent or unknown.
    pub async fn get_factor(&self, region_key: Option<&str>) -> Result<Decimal, DatabaseError> {
        let Some(key) = region_key else {
            return Ok(Decimal::ONE);
        };

        let factor = self.store.get_regional_factor(key).await?;
        if factor.is_none() {
            tracing::debug!(region = key, "No regional factor, using 1.0");
        }
        Ok(factor.unwrap_or(Decimal::ONE))
    }
}
