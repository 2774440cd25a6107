//! Faena - scheduling core for a construction-business management suite.
//!
//! This library provides the month/week timeline math, the typed Gantt layout
//! model, manual matrix overrides, parametric budget synchronization and
//! signed document leases used by the `faena` CLI and by UI front-ends.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod documents;
pub mod events;
pub mod finance;
pub mod models;
pub mod notifications;
pub mod push;
pub mod schedule;
pub mod store;


/// Library-level error type for Faena operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Message as shown to users, without the variant prefix for remote errors.
    pub fn user_message(&self) -> String {
        match self {
            Error::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for Faena operations.
pub type Result<T> = std::result::Result<T, Error>;
