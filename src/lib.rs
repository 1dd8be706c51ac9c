//! Estimation and pricing engine for landscaping contractors.
//!
//! Turns parametric assemblies (e.g. a paver patio) plus job inputs into a
//! priced estimate, and tracks spend against the baseline captured when the
//! estimate is finalized.
//!
//! ```text
//!                    ┌──────────────────┐
//!   request ────────▶│ EstimateBuilder  │──────▶ Estimate
//!                    └──┬───────┬────┬──┘
//!          formulas ◀───┘       │    └───▶ TaxResolver ──▶ rate service / state table
//!                               ▼
//!                        PriceResolver ──▶ snapshot cache ──▶ supplier → retail → index
//!
//!   finalize ──▶ BudgetService ──▶ BudgetSnapshot ──▶ BudgetReport (vs expenses)
//! ```

pub mod budget;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod estimation;
pub mod money;
pub mod pricing;
pub mod tax;

pub use budget::{BudgetReport, BudgetService, BudgetSnapshot, Category};
pub use config::EngineConfig;
pub use delivery::{Coordinates, DeliveryEstimator, DeliveryQuote};
pub use engine::Engine;
pub use error::{BudgetError, DatabaseError, EstimateError, FormulaError, PricingError};
pub use estimation::{Estimate, EstimateBuilder, EstimateRequest};
pub use pricing::{PriceQuery, PriceResolver, PriceResult};
pub use tax::{TaxComputation, TaxResolver};
