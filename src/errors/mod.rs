use crate::classifier::ApiError;
use thiserror::Error;

/// Typed error hierarchy for haulguard.
///
/// Used at module boundaries (config loading, degraded storage).
/// Internal/leaf functions can keep using `anyhow::Result`; the `Internal`
/// variant converts with `?`.
#[derive(Debug, Error)]
pub enum HaulguardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(ApiError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ApiError> for HaulguardError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}
