//! Error types for the estimating engine.

use std::time::Duration;

use uuid::Uuid;

/// Configuration errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Catalog seed error: {0}")]
    Seed(String),
}

impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        DatabaseError::Pool(e.to_string())
    }
}

impl From<tokio_postgres::Error> for DatabaseError {
    fn from(e: tokio_postgres::Error) -> Self {
        DatabaseError::Query(e.to_string())
    }
}

/// Formula evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error("Invalid formula '{formula}': {reason}")]
    InvalidFormula { formula: String, reason: String },
}

/// Price resolution errors.
///
/// A material with no price is not an error; see `PriceResolver::resolve`.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Price store error: {0}")]
    Database(#[from] DatabaseError),
}

/// Outbound tax rate lookup errors. Always recovered inside the tax resolver.
#[derive(Debug, thiserror::Error)]
pub enum TaxLookupError {
    #[error("No tax rate service configured")]
    NotConfigured,

    #[error("Tax rate request failed: {0}")]
    RequestFailed(String),

    #[error("Tax rate request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Tax rate service returned HTTP {status}")]
    BadStatus { status: u16 },

    #[error("Malformed tax rate response: {0}")]
    InvalidResponse(String),
}

/// Estimate build errors. Any of these aborts the whole estimate.
#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Line {line}, item '{item}': {source}")]
    InvalidFormula {
        line: usize,
        item: String,
        #[source]
        source: FormulaError,
    },

    #[error("Assembly not found: {0}")]
    AssemblyNotFound(Uuid),

    #[error("No price available for material '{material_slug}' (item '{item}')")]
    MaterialNotFound { material_slug: String, item: String },

    #[error("Amount out of range: {0}")]
    OutOfRange(String),

    #[error("Pricing failed: {0}")]
    Pricing(#[from] PricingError),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),
}

impl EstimateError {
    pub(crate) fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EstimateError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Budget snapshot and reporting errors.
#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    #[error("Estimate not found: {0}")]
    EstimateNotFound(Uuid),

    #[error("Estimate {estimate_id} does not belong to project {project_id}")]
    ProjectMismatch { project_id: Uuid, estimate_id: Uuid },

    #[error("Estimate {0} is already finalized")]
    AlreadyFinalized(Uuid),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),
}
