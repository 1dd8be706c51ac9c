//! Wiring for the engine's components over a single store.

use std::sync::Arc;

use crate::budget::BudgetService;
use crate::config::EngineConfig;
use crate::db::{BudgetStore, CatalogStore, EstimateStore, PriceStore};
use crate::delivery::DeliveryEstimator;
use crate::estimation::EstimateBuilder;
use crate::pricing::PriceResolver;
use crate::tax::{RateLookup, TaxResolver};

/// All components, sharing one store and one tax rate cache.
pub struct Engine {
    pub estimates: EstimateBuilder,
    pub budget: BudgetService,
    pub prices: Arc<PriceResolver>,
    pub tax: Arc<TaxResolver>,
    pub delivery: DeliveryEstimator,
}

impl Engine {
    /// Build the engine over `store`, with tax rates from the configured
    /// HTTP rate service.
    pub fn new<S>(store: Arc<S>, config: &EngineConfig) -> Self
    where
        S: CatalogStore + PriceStore + EstimateStore + BudgetStore + 'static,
    {
        let tax = Arc::new(TaxResolver::from_config(&config.tax));
        Self::with_tax(store, config, tax)
    }

    /// Build the engine with a specific tax rate source.
    pub fn with_rate_lookup<S>(store: Arc<S>, config: &EngineConfig, lookup: Arc<dyn RateLookup>) -> Self
    where
        S: CatalogStore + PriceStore + EstimateStore + BudgetStore + 'static,
    {
        Self::with_tax(store, config, Arc::new(TaxResolver::new(lookup)))
    }

    fn with_tax<S>(store: Arc<S>, config: &EngineConfig, tax: Arc<TaxResolver>) -> Self
    where
        S: CatalogStore + PriceStore + EstimateStore + BudgetStore + 'static,
    {
        let prices = Arc::new(PriceResolver::new(store.clone(), config.pricing.clone()));

        let estimates = EstimateBuilder::new(
            store.clone(),
            store.clone(),
            prices.clone(),
            tax.clone(),
            config.pricing.clone(),
        );
        let budget = BudgetService::new(store.clone(), store);

        Self {
            estimates,
            budget,
            prices,
            tax,
            delivery: DeliveryEstimator::new(config.delivery.clone()),
        }
    }
}
