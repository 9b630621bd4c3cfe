//! Error types for the persistent handle registry

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Provider name must not be empty")]
    EmptyProviderName,

    #[error("No persistent handle provider registered as {0:?}")]
    UnknownProvider(String),

    #[error("Provider {0:?} was registered with a different handle factory type")]
    ProviderTypeMismatch(String),

    #[error("Factory of provider {provider:?} produced no handle for {ident:?}")]
    ConstructionFailed { provider: String, ident: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Metrics export failed: {0}")]
    MetricsExport(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
