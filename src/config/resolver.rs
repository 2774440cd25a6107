//! Unified precedence resolution for configuration and state.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`FAENA_REMOTE_URL`, `FAENA_API_KEY`)
//! 3. config.kdl / state.kdl in the data directory
//! 4. Built-in defaults
//!
//! Only the remote URL and API key have environment overrides.

use std::time::Duration;

use crate::backend::BackendType;
use crate::config::{FaenaConfig, FaenaState, OutputFormat};
use crate::documents::{DEFAULT_RETRY_DELAY, DEFAULT_SIGNED_URL_TTL, LeaseOptions};
use crate::schedule::LayoutConfig;
use crate::schedule::layout::{DEFAULT_FROZEN_COLUMNS, DEFAULT_MONTH_WIDTH};

/// Environment variable overriding the API key.
pub const API_KEY_ENV: &str = "FAENA_API_KEY";

/// Environment variable overriding the remote URL.
pub const REMOTE_URL_ENV: &str = "FAENA_REMOTE_URL";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl or state.kdl
    File,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::File => write!(f, "file"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }

    fn default_value(value: T) -> Self {
        Self::new(value, ValueSource::Default)
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend: Option<BackendType>,
    pub remote_url: Option<String>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub backend: Resolved<BackendType>,
    pub remote_url: Option<Resolved<String>>,
    pub api_key: Option<Resolved<String>>,
    pub signed_url_ttl: Resolved<u64>,
    pub refresh_interval: Option<Resolved<u64>>,
    pub retry_delay_ms: Resolved<u64>,
    pub month_width: Resolved<f64>,
    pub frozen_columns: Resolved<Vec<f64>>,
    pub output_format: Resolved<OutputFormat>,
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        Self {
            backend: Resolved::default_value(BackendType::Local),
            remote_url: None,
            api_key: None,
            signed_url_ttl: Resolved::default_value(DEFAULT_SIGNED_URL_TTL),
            refresh_interval: None,
            retry_delay_ms: Resolved::default_value(DEFAULT_RETRY_DELAY.as_millis() as u64),
            month_width: Resolved::default_value(DEFAULT_MONTH_WIDTH),
            frozen_columns: Resolved::default_value(DEFAULT_FROZEN_COLUMNS.to_vec()),
            output_format: Resolved::default_value(OutputFormat::Json),
        }
    }
}

impl ResolvedSettings {
    pub fn remote_url(&self) -> Option<&str> {
        self.remote_url.as_ref().map(|r| r.value.as_str())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|r| r.value.as_str())
    }

    pub fn layout_config(&self) -> LayoutConfig {
        LayoutConfig {
            frozen_columns: self.frozen_columns.value.clone(),
            month_width: self.month_width.value,
        }
    }

    pub fn lease_options(&self) -> LeaseOptions {
        LeaseOptions {
            ttl_seconds: self.signed_url_ttl.value,
            refresh_interval_seconds: self.refresh_interval.as_ref().map(|r| r.value),
            retry_delay: Duration::from_millis(self.retry_delay_ms.value),
        }
    }
}

fn pick<T: Clone>(flag: Option<&T>, file: Option<&T>) -> Option<Resolved<T>> {
    flag.map(|v| Resolved::new(v.clone(), ValueSource::CliFlag))
        .or_else(|| file.map(|v| Resolved::new(v.clone(), ValueSource::File)))
}

fn from_env(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Resolved<String>> {
    env(name)
        .filter(|v| !v.trim().is_empty())
        .map(|v| Resolved::new(v, ValueSource::EnvVar(name.to_string())))
}

/// Resolve settings using `env` to look up environment variables.
pub fn resolve_with_env(
    config: &FaenaConfig,
    state: &FaenaState,
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedSettings {
    let mut result = ResolvedSettings::default();

    if let Some(backend) = pick(overrides.backend.as_ref(), config.backend.as_ref()) {
        result.backend = backend;
    }

    result.remote_url = overrides
        .remote_url
        .as_ref()
        .map(|v| Resolved::new(v.clone(), ValueSource::CliFlag))
        .or_else(|| from_env(&env, REMOTE_URL_ENV))
        .or_else(|| config.remote_url.clone().map(|v| Resolved::new(v, ValueSource::File)));

    result.api_key = from_env(&env, API_KEY_ENV)
        .or_else(|| state.api_key.clone().map(|v| Resolved::new(v, ValueSource::File)));

    if let Some(ttl) = config.signed_url_ttl {
        result.signed_url_ttl = Resolved::new(ttl, ValueSource::File);
    }
    result.refresh_interval = config
        .refresh_interval
        .map(|v| Resolved::new(v, ValueSource::File));
    if let Some(delay) = config.retry_delay_ms {
        result.retry_delay_ms = Resolved::new(delay, ValueSource::File);
    }
    if let Some(width) = config.month_width {
        result.month_width = Resolved::new(width, ValueSource::File);
    }
    if let Some(columns) = &config.frozen_columns {
        result.frozen_columns = Resolved::new(columns.clone(), ValueSource::File);
    }
    if let Some(format) = pick(overrides.output_format.as_ref(), config.output_format.as_ref()) {
        result.output_format = format;
    }

    result
}

/// Resolve settings against the process environment.
pub fn resolve(config: &FaenaConfig, state: &FaenaState, overrides: &ConfigOverrides) -> ResolvedSettings {
    resolve_with_env(config, state, overrides, |name| std::env::var(name).ok())
}
