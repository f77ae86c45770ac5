//! Error types for the position hooks runtime

use crate::config::NetworkId;
use crate::numbers::DecimalError;
use crate::positions::ResolutionError;
use crate::shortcuts::FieldError;
use crate::simulation::SimulationError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Decimal error: {0}")]
    Decimal(#[from] DecimalError),

    #[error("Token resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Invalid position definition: {0}")]
    Definition(String),

    #[error("Unknown app token {network}:{address}")]
    UnknownAppToken { network: NetworkId, address: String },

    #[error("No shortcut found with id '{id}' for app '{app_id}', available shortcuts: {}", available.join(", "))]
    UnknownShortcut {
        id: String,
        app_id: String,
        available: Vec<String>,
    },

    #[error("Invalid shortcut arguments: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Transaction simulation failed: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Chain call failed: {0}")]
    Chain(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// True when a hook declined ownership of an app token.
    pub fn is_unknown_app_token(&self) -> bool {
        matches!(self, Error::UnknownAppToken { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bound an external call by `limit`; elapsing becomes [`Error::Timeout`].
pub(crate) async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(limit.as_millis() as u64)),
    }
}
