//! Typed stores over the backend tables.
//!
//! Each store reads through the shared [`QueryCache`] and invalidates the
//! affected keys after a successful write. Failures are logged, reported to
//! the injected [`Notifier`] and returned; cached data is left untouched.

pub mod activities;
pub mod cache;
pub mod overrides;
pub mod reference_lines;

pub use activities::ActivityStore;
pub use cache::{QueryCache, activities_key, overrides_key, reference_lines_key};
pub use overrides::OverrideStore;
pub use reference_lines::ReferenceLineStore;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Result;
use crate::notifications::Notifier;

/// Log and notify a failed operation, passing the result through.
pub(crate) fn report<T>(notifier: &dyn Notifier, action: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::error!(action, error = %e, "store operation failed");
        notifier.error(&format!("{}: {}", action, e.user_message()));
    }
    result
}

/// Decode backend rows into typed records.
pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}
