//! Common test utilities for faena integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's `~/.local/share/faena/` directory.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with an isolated data directory.
///
/// The `faena()` method returns a `Command` that sets `FAENA_DATA_DIR`
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the faena binary with isolated data directory.
    pub fn faena(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_faena"));
        cmd.current_dir(self.data_dir.path());
        cmd.env("FAENA_DATA_DIR", self.data_dir.path());
        cmd.env_remove("FAENA_REMOTE_URL");
        cmd.env_remove("FAENA_API_KEY");
        cmd.env_remove("FAENA_LOG");
        cmd
    }

    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    /// Run `faena` with `args`, assert success and parse stdout as JSON.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.faena().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).unwrap()
    }

    /// Write a budget file into the data directory and return its path.
    pub fn write_budget(&self, contents: &str) -> std::path::PathBuf {
        let path = self.data_dir.path().join("budget.json");
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
