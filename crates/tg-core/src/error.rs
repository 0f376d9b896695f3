//! Error types for the tracking and blocking engine.
//!
//! Each external seam (storage, browser, rule engine) has its own error type;
//! [`Error`] wraps them for operations that cross several seams.

use thiserror::Error;

use crate::types::{TabId, WindowId};

/// Failure reading or writing the key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable")]
    Unavailable,
    #[error("Failed to read '{key}': {reason}")]
    Read { key: String, reason: String },
    #[error("Failed to write '{key}': {reason}")]
    Write { key: String, reason: String },
    #[error("Malformed value for '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure talking to the browser's tab and window APIs.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("No tab with id {0}")]
    NoSuchTab(TabId),
    #[error("No window with id {0}")]
    NoSuchWindow(WindowId),
    #[error("Navigation of tab {tab_id} failed: {reason}")]
    Navigation { tab_id: TabId, reason: String },
    #[error("Browser call failed: {0}")]
    Call(String),
}

/// Failure from the declarative rule engine.
#[derive(Debug, Error)]
pub enum RuleEngineError {
    #[error("Rule engine unavailable")]
    Unavailable,
    #[error("Failed to read installed rules: {0}")]
    Read(String),
    #[error("Failed to remove rules: {0}")]
    Remove(String),
    #[error("Failed to add rules: {0}")]
    Add(String),
}

/// Top-level error for multi-step operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Rules(#[from] RuleEngineError),
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
}

pub type Result<T> = std::result::Result<T, Error>;
