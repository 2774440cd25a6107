//! SQLite-backed local backend.
//!
//! Every table is stored as JSON rows in a single `records` table keyed by
//! `(tbl, row_key)`, where `row_key` is built from the table's unique
//! columns. This gives the same duplicate-key and upsert-conflict behavior as
//! the hosted database, which is what the stores rely on.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use base64::Engine;
use chrono::Utc;
use rusqlite::{Connection, params};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use super::{
    ACTIVITIES_TABLE, Backend, OVERRIDES_TABLE, PARAMETRIC_TABLE, Query, SYNC_PARAMETRIC_RPC,
    UrlSigner,
};
use crate::models::{MatrixOverride, ParametricLine};
use crate::schedule::derive_activities;
use crate::{Error, Result};

/// Database file name inside the data directory.
pub const DATABASE_FILE: &str = "faena.db";

/// Directory holding stored objects, one subdirectory per bucket.
pub const STORAGE_DIR: &str = "storage";

const KEY_SEPARATOR: char = '\u{1f}';

/// Local backend over a SQLite connection.
pub struct LocalBackend {
    conn: Mutex<Connection>,
    location: String,
    /// Root for stored objects; `None` signs any path without checking
    storage_root: Option<PathBuf>,
    signing_key: String,
}

impl LocalBackend {
    /// Open or create the backend in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DATABASE_FILE);
        let conn = Connection::open(&db_path)?;
        Self::init_schema(&conn)?;
        let signing_key = Self::load_signing_key(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            location: db_path.display().to_string(),
            storage_root: Some(data_dir.join(STORAGE_DIR)),
            signing_key,
        })
    }

    /// Create a throwaway in-memory backend.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        let signing_key = Self::load_signing_key(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
            storage_root: None,
            signing_key,
        })
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tbl TEXT NOT NULL,
                row_key TEXT NOT NULL,
                body TEXT NOT NULL,
                UNIQUE (tbl, row_key)
            );

            CREATE INDEX IF NOT EXISTS idx_records_tbl ON records(tbl);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn load_signing_key(conn: &Connection) -> Result<String> {
        let existing: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'signing_key'",
                [],
                |row| row.get(0),
            )
            .ok();
        if let Some(key) = existing {
            return Ok(key);
        }
        let key = uuid::Uuid::new_v4().simple().to_string();
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('signing_key', ?1)",
            params![key],
        )?;
        Ok(key)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("local backend connection poisoned".to_string()))
    }

    /// Columns that identify a row of `table`.
    fn unique_columns(table: &str) -> &'static [&'static str] {
        if table == OVERRIDES_TABLE {
            &MatrixOverride::CONFLICT_KEY
        } else {
            &["id"]
        }
    }

    fn row_key(row: &Value, columns: &[&str]) -> Result<String> {
        let mut parts = Vec::with_capacity(columns.len());
        for col in columns {
            match row.get(*col) {
                None | Some(Value::Null) => {
                    return Err(Error::Remote {
                        status: 400,
                        message: format!("null value in column \"{}\" violates not-null constraint", col),
                    });
                }
                Some(Value::String(s)) => parts.push(s.clone()),
                Some(other) => parts.push(other.to_string()),
            }
        }
        Ok(parts.join(&KEY_SEPARATOR.to_string()))
    }

    fn prepare_row(table: &str, mut row: Value) -> Result<Value> {
        let obj = row
            .as_object_mut()
            .ok_or_else(|| Error::InvalidInput("row must be a JSON object".to_string()))?;
        if Self::unique_columns(table) == ["id"] && !obj.contains_key("id") {
            obj.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        Ok(row)
    }

    fn load_rows(conn: &Connection, table: &str) -> Result<Vec<(i64, Value)>> {
        let mut stmt = conn.prepare("SELECT id, body FROM records WHERE tbl = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![table], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, body) = row?;
            out.push((id, serde_json::from_str(&body)?));
        }
        Ok(out)
    }

    fn key_exists(conn: &Connection, table: &str, key: &str) -> Result<Option<i64>> {
        let mut stmt = conn.prepare("SELECT id FROM records WHERE tbl = ?1 AND row_key = ?2")?;
        let mut rows = stmt.query(params![table, key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn duplicate_key(table: &str) -> Error {
        Error::Remote {
            status: 409,
            message: format!("duplicate key value violates unique constraint on \"{}\"", table),
        }
    }

    fn select_sync(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let conn = self.conn()?;
        let mut rows: Vec<Value> = Self::load_rows(&conn, table)?
            .into_iter()
            .map(|(_, body)| body)
            .filter(|body| query.matches(body))
            .collect();
        rows.sort_by(|a, b| query.compare(a, b));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn insert_row(conn: &Connection, table: &str, row: Value) -> Result<Value> {
        let row = Self::prepare_row(table, row)?;
        let key = Self::row_key(&row, Self::unique_columns(table))?;
        if Self::key_exists(conn, table, &key)?.is_some() {
            return Err(Self::duplicate_key(table));
        }
        conn.execute(
            "INSERT INTO records (tbl, row_key, body) VALUES (?1, ?2, ?3)",
            params![table, key, serde_json::to_string(&row)?],
        )?;
        Ok(row)
    }

    fn insert_sync(&self, table: &str, row: Value) -> Result<Value> {
        let conn = self.conn()?;
        Self::insert_row(&conn, table, row)
    }

    fn upsert_row(conn: &Connection, table: &str, row: &Value) -> Result<()> {
        let key = Self::row_key(row, Self::unique_columns(table))?;
        conn.execute(
            "INSERT INTO records (tbl, row_key, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(tbl, row_key) DO UPDATE SET body = excluded.body",
            params![table, key, serde_json::to_string(row)?],
        )?;
        Ok(())
    }

    fn upsert_sync(&self, table: &str, row: Value, on_conflict: &[&str]) -> Result<Value> {
        let expected: HashSet<&str> = Self::unique_columns(table).iter().copied().collect();
        let requested: HashSet<&str> = on_conflict.iter().copied().collect();
        if expected != requested {
            return Err(Error::Remote {
                status: 400,
                message: format!(
                    "there is no unique constraint on \"{}\" matching the ON CONFLICT specification ({})",
                    table,
                    on_conflict.join(",")
                ),
            });
        }
        let row = Self::prepare_row(table, row)?;
        let conn = self.conn()?;
        Self::upsert_row(&conn, table, &row)?;
        Ok(row)
    }

    fn update_sync(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>> {
        let patch = patch
            .as_object()
            .cloned()
            .ok_or_else(|| Error::InvalidInput("patch must be a JSON object".to_string()))?;
        let conn = self.conn()?;
        let mut updated = Vec::new();
        for (rowid, mut body) in Self::load_rows(&conn, table)? {
            if !query.matches(&body) {
                continue;
            }
            if let Some(obj) = body.as_object_mut() {
                for (k, v) in &patch {
                    obj.insert(k.clone(), v.clone());
                }
            }
            let key = Self::row_key(&body, Self::unique_columns(table))?;
            if let Some(other) = Self::key_exists(&conn, table, &key)? {
                if other != rowid {
                    return Err(Self::duplicate_key(table));
                }
            }
            conn.execute(
                "UPDATE records SET row_key = ?1, body = ?2 WHERE id = ?3",
                params![key, serde_json::to_string(&body)?, rowid],
            )?;
            updated.push(body);
        }
        Ok(updated)
    }

    fn delete_rows(conn: &Connection, table: &str, query: &Query) -> Result<u64> {
        let mut removed = 0;
        for (rowid, body) in Self::load_rows(conn, table)? {
            if query.matches(&body) {
                removed += conn.execute("DELETE FROM records WHERE id = ?1", params![rowid])? as u64;
            }
        }
        Ok(removed)
    }

    fn delete_sync(&self, table: &str, query: &Query) -> Result<u64> {
        let conn = self.conn()?;
        Self::delete_rows(&conn, table, query)
    }

    /// Delete and insert in one transaction; any failure rolls both back.
    fn replace_sync(&self, table: &str, scope: &Query, rows: Vec<Value>) -> Result<u64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = Self::delete_rows(&tx, table, scope)?;
        for row in rows {
            Self::insert_row(&tx, table, row)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn rpc_sync(&self, function: &str, args: Value) -> Result<Value> {
        match function {
            SYNC_PARAMETRIC_RPC => self.sync_parametric(&args),
            other => Err(Error::Remote {
                status: 404,
                message: format!("Could not find the function {}", other),
            }),
        }
    }

    /// Re-derive the activities of one project from its parametric budget.
    ///
    /// Derived rows replace existing rows with the same id and activities whose
    /// mayor is no longer budgeted are removed, so repeated calls with the same
    /// budget leave the table unchanged.
    fn sync_parametric(&self, args: &Value) -> Result<Value> {
        let arg = |name: &str| -> Result<String> {
            args.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::Remote {
                    status: 400,
                    message: format!("missing argument {}", name),
                })
        };
        let client_id = arg("p_client_id")?;
        let project_id = arg("p_project_id")?;
        let scope = Query::new()
            .eq("client_id", client_id.as_str())
            .eq("project_id", project_id.as_str());

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut lines = Vec::new();
        for (_, body) in Self::load_rows(&tx, PARAMETRIC_TABLE)? {
            if !scope.matches(&body) {
                continue;
            }
            match serde_json::from_value::<ParametricLine>(body) {
                Ok(line) => lines.push(line),
                Err(e) => tracing::warn!(error = %e, "skipping malformed parametric line"),
            }
        }

        let derived = derive_activities(&client_id, &project_id, &lines);
        let keep: HashSet<&str> = derived.iter().map(|a| a.id.as_str()).collect();

        let mut removed = 0u64;
        for (rowid, body) in Self::load_rows(&tx, ACTIVITIES_TABLE)? {
            if !scope.matches(&body) {
                continue;
            }
            let id = body.get("id").and_then(Value::as_str).unwrap_or_default();
            if !keep.contains(id) {
                removed += tx.execute("DELETE FROM records WHERE id = ?1", params![rowid])? as u64;
            }
        }
        for activity in &derived {
            Self::upsert_row(&tx, ACTIVITIES_TABLE, &serde_json::to_value(activity)?)?;
        }
        tx.commit()?;

        tracing::debug!(
            client = %client_id,
            project = %project_id,
            activities = derived.len(),
            removed,
            "parametric budget synchronized"
        );
        Ok(json!({ "activities": derived.len(), "removed": removed }))
    }

    /// Filesystem path of a stored object, rejecting paths that escape the bucket.
    pub fn object_path(&self, bucket: &str, path: &str) -> Result<Option<PathBuf>> {
        let relative = Path::new(path);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if bucket.is_empty() || path.is_empty() || !clean || bucket.contains(['/', '\\']) {
            return Err(Error::InvalidInput(format!("invalid object path {}/{}", bucket, path)));
        }
        Ok(self
            .storage_root
            .as_ref()
            .map(|root| root.join(bucket).join(relative)))
    }

    /// Sign a `local://` URL valid until `expires` (unix seconds).
    fn sign_local(&self, bucket: &str, path: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_key.as_bytes());
        hasher.update(bucket.as_bytes());
        hasher.update([0u8]);
        hasher.update(path.as_bytes());
        hasher.update(expires.to_be_bytes());
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize());
        format!("local://{}/{}?expires={}&token={}", bucket, path, expires, token)
    }

    fn sign_sync(&self, bucket: &str, path: &str, ttl_seconds: u64) -> Result<String> {
        if let Some(file) = self.object_path(bucket, path)? {
            if !file.is_file() {
                return Err(Error::Remote {
                    status: 404,
                    message: format!("Object not found: {}/{}", bucket, path),
                });
            }
        }
        let expires = i64::try_from(ttl_seconds)
            .ok()
            .and_then(|ttl| Utc::now().timestamp().checked_add(ttl))
            .ok_or_else(|| Error::InvalidInput(format!("ttl of {} seconds is out of range", ttl_seconds)))?;
        Ok(self.sign_local(bucket, path, expires))
    }
}

impl Backend for LocalBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        self.select_sync(table, query)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        self.insert_sync(table, row)
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &[&str]) -> Result<Value> {
        self.upsert_sync(table, row, on_conflict)
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>> {
        self.update_sync(table, query, patch)
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<u64> {
        self.delete_sync(table, query)
    }

    async fn replace(&self, table: &str, scope: &Query, rows: Vec<Value>) -> Result<u64> {
        self.replace_sync(table, scope, rows)
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        self.rpc_sync(function, args)
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

impl UrlSigner for LocalBackend {
    async fn create_signed_url(&self, bucket: &str, path: &str, ttl_seconds: u64) -> Result<String> {
        self.sign_sync(bucket, path, ttl_seconds)
    }
}
