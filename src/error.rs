//! Crate-wide error type.
//!
//! Remote-API failures, configuration problems and validation failures get
//! their own constructors so call sites read like `Error::api("...")`.
//! Not-found is deliberately NOT an error variant: collaborator traits
//! return `Option` for resources that may have been pruned.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Remote API failure (CI server or issue tracker).
    #[error("API error: {0}")]
    Api(String),

    /// Invalid or unusable run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Data failed a structural validation check.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation was cancelled before completion.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    /// Whether retrying the whole batch could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Api(_) | Self::Http(_))
    }
}
