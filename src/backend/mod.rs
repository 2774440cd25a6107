//! Backend trait and implementations.
//!
//! Stores talk to the hosted tables through a small generic
//! query/filter/order API:
//! - `RestBackend` - PostgREST-style hosted database and storage service
//! - `LocalBackend` - SQLite tables with the same conflict semantics, for
//!   offline use and tests

pub mod local;
pub mod rest;

pub use local::LocalBackend;
pub use rest::RestBackend;

use std::cmp::Ordering;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Table holding Gantt activities.
pub const ACTIVITIES_TABLE: &str = "gantt_activities";
/// Table holding parametric budget lines.
pub const PARAMETRIC_TABLE: &str = "parametric_budget";
/// Table holding manual matrix overrides.
pub const OVERRIDES_TABLE: &str = "matrix_overrides";
/// Table holding timeline reference lines.
pub const REFERENCE_LINES_TABLE: &str = "gantt_reference_lines";
/// Remote procedure that re-derives the schedule from the parametric budget.
pub const SYNC_PARAMETRIC_RPC: &str = "sync_parametric_to_gantt";

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

/// Sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A select/update/delete query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    /// Add an ascending sort key.
    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending: true,
        });
        self
    }

    /// Add a descending sort key.
    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending: false,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a JSON row satisfies every filter.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters
            .iter()
            .all(|f| row.get(&f.column).is_some_and(|v| values_equal(v, &f.value)))
    }

    /// Compare two rows by the sort keys.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for key in &self.order {
            let ord = compare_values(
                a.get(&key.column).unwrap_or(&Value::Null),
                b.get(&key.column).unwrap_or(&Value::Null),
            );
            let ord = if key.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Total order over JSON scalars: null < bool < number < string < other.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Generic access to the hosted tables.
///
/// Rows travel as JSON objects so the same stores work against any backend.
pub trait Backend: Send + Sync + 'static {
    /// Rows of `table` matching `query`, sorted and limited.
    fn select(&self, table: &str, query: &Query) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Insert one row and return it as stored. Fails on a duplicate key.
    fn insert(&self, table: &str, row: Value) -> impl Future<Output = Result<Value>> + Send;

    /// Insert one row, replacing any existing row with the same values in the
    /// `on_conflict` columns. Returns the row as stored.
    fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &[&str],
    ) -> impl Future<Output = Result<Value>> + Send;

    /// Merge `patch` into every matching row and return the updated rows.
    fn update(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Delete every matching row and return how many were removed.
    fn delete(&self, table: &str, query: &Query) -> impl Future<Output = Result<u64>> + Send;

    /// Swap every row matching `scope` for `rows`. Returns how many rows were
    /// removed. The local backend does this in one transaction; the remote
    /// one issues a delete and then a single bulk insert.
    fn replace(
        &self,
        table: &str,
        scope: &Query,
        rows: Vec<Value>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Invoke a remote procedure.
    fn rpc(&self, function: &str, args: Value) -> impl Future<Output = Result<Value>> + Send;

    /// Get the backend location description (for display purposes).
    fn location(&self) -> String;

    /// Get the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// Issues time-limited URLs for stored files.
pub trait UrlSigner: Send + Sync + 'static {
    /// Absolute URL for `bucket/path` valid for `ttl_seconds`.
    fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_seconds: u64,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Available backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// SQLite tables in the data directory
    #[default]
    Local,
    /// Hosted database and storage service
    Remote,
}

impl BackendType {
    /// Parse a backend type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" | "sqlite" | "offline" => Some(Self::Local),
            "remote" | "rest" | "hosted" => Some(Self::Remote),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_matches_all_filters() {
        let q = Query::new().eq("client_id", "c1").eq("month", "202501");
        assert!(q.matches(&json!({"client_id": "c1", "month": "202501", "value": 1})));
        assert!(!q.matches(&json!({"client_id": "c1", "month": "202502"})));
        assert!(!q.matches(&json!({"client_id": "c1"})));
    }

    #[test]
    fn test_query_matches_numbers_by_value() {
        let q = Query::new().eq("position_month", 2);
        assert!(q.matches(&json!({"position_month": 2.0})));
    }

    #[test]
    fn test_query_compare_multiple_keys() {
        let q = Query::new().order_asc("month").order_desc("value");
        let a = json!({"month": "202501", "value": 1});
        let b = json!({"month": "202501", "value": 5});
        let c = json!({"month": "202412", "value": 9});
        let mut rows = vec![a.clone(), b.clone(), c.clone()];
        rows.sort_by(|x, y| q.compare(x, y));
        assert_eq!(rows, vec![c, b, a]);
    }

    #[test]
    fn test_backend_type_parse() {
        assert_eq!(BackendType::parse("LOCAL"), Some(BackendType::Local));
        assert_eq!(BackendType::parse("rest"), Some(BackendType::Remote));
        assert_eq!(BackendType::parse("ftp"), None);
        assert_eq!(BackendType::Remote.to_string(), "remote");
    }

    #[test]
    fn test_backend_type_serde_matches_as_str() {
        assert_eq!(serde_json::to_value(BackendType::Remote).unwrap(), json!("remote"));
        let parsed: BackendType = serde_json::from_value(json!("local")).unwrap();
        assert_eq!(parsed, BackendType::Local);
    }
}
