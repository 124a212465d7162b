//! # Error Types Module
//!
//! This module defines the error taxonomy shared by the recipe catalog,
//! the translation service and the conversation state store.
//!
//! Usage errors (bad counts, bad selections) are not represented here: the
//! discovery state machine recovers from them locally and re-prompts.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a [`crate::catalog::RecipeCatalog`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// Network or transport failure, including timeouts and an open circuit
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
    /// The upstream answered with a shape we could not understand
    #[error("Upstream malformed response: {0}")]
    Malformed(String),
}

impl CatalogError {
    /// Error for a call that did not finish within its deadline
    pub fn timed_out(operation: &str, limit: Duration) -> Self {
        CatalogError::Unavailable(format!("{operation} timed out after {}ms", limit.as_millis()))
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CatalogError::Malformed(err.to_string())
        } else {
            CatalogError::Unavailable(err.to_string())
        }
    }
}

/// Failures reported by a [`crate::translation::Translator`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Translation unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        TranslationError::Unavailable(err.to_string())
    }
}

/// Failures reported by a [`crate::session_store::SessionStore`] backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session backend error: {0}")]
    Backend(String),
}

/// Invalid configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}
