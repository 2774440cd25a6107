//! KDL schema definitions for config.kdl and state.kdl.
//!
//! This module provides:
//! - Rust structs representing the KDL schema
//! - Serialization/deserialization to/from KDL format
//! - Validation functions
//! - Key-based updates for `faena config set`

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

use crate::backend::BackendType;
use crate::documents::MAX_SIGNED_URL_TTL;

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Keys accepted in config.kdl.
pub const CONFIG_KEYS: [&str; 8] = [
    "backend",
    "remote-url",
    "signed-url-ttl",
    "refresh-interval",
    "retry-delay-ms",
    "month-width",
    "frozen-columns",
    "output-format",
];

/// Keys accepted in state.kdl.
pub const STATE_KEYS: [&str; 1] = ["api-key"];

/// Shareable settings stored in config.kdl.
///
/// File permissions: 0644 (rw-r--r--)
///
/// # KDL Schema
///
/// ```kdl
/// backend "remote"
/// remote-url "https://db.example.com"
/// signed-url-ttl 900
/// refresh-interval 600
/// retry-delay-ms 500
/// month-width 160.0
/// frozen-columns 240.0 120.0
/// output-format "human"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaenaConfig {
    /// Which backend the CLI talks to
    pub backend: Option<BackendType>,

    /// Base URL of the hosted service
    pub remote_url: Option<String>,

    /// Lifetime of signed document URLs in seconds
    pub signed_url_ttl: Option<u64>,

    /// Explicit lease refresh interval in seconds
    pub refresh_interval: Option<u64>,

    /// Delay before retrying an expired-credential signing failure
    pub retry_delay_ms: Option<u64>,

    /// Fallback width of one month column in pixels
    pub month_width: Option<f64>,

    /// Widths of the frozen columns left of the timeline
    pub frozen_columns: Option<Vec<f64>>,

    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn as_u64(value: &KdlValue) -> Option<u64> {
    value.as_integer().and_then(|i| u64::try_from(i).ok())
}

fn as_f64(value: &KdlValue) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
}

fn string_node(name: &str, value: &str) -> KdlNode {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::String(value.to_string())));
    node
}

fn integer_node(name: &str, value: u64) -> KdlNode {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::Integer(value as i128)));
    node
}

fn parse_u64(key: &str, value: &str) -> Result<u64, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{} must be a non-negative integer, got '{}'", key, value))
}

fn parse_width(key: &str, value: &str) -> Result<f64, String> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(format!("{} must be a non-negative number, got '{}'", key, value)),
    }
}

impl FaenaConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.remote_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("remote-url must start with http:// or https://, got '{}'", url));
            }
        }
        if let Some(ttl) = self.signed_url_ttl {
            if ttl == 0 || ttl > MAX_SIGNED_URL_TTL {
                return Err(format!(
                    "signed-url-ttl must be between 1 and {}, got {}",
                    MAX_SIGNED_URL_TTL, ttl
                ));
            }
        }
        if let Some(interval) = self.refresh_interval {
            if interval == 0 || interval > MAX_SIGNED_URL_TTL {
                return Err(format!(
                    "refresh-interval must be between 1 and {}, got {}",
                    MAX_SIGNED_URL_TTL, interval
                ));
            }
        }
        if let Some(width) = self.month_width {
            if !(width.is_finite() && width > 0.0) {
                return Err(format!("month-width must be positive, got {}", width));
            }
        }
        if let Some(columns) = &self.frozen_columns {
            if columns.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
                return Err("frozen-columns must be non-negative numbers".to_string());
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        config.backend = first_value(doc, "backend")
            .and_then(KdlValue::as_string)
            .and_then(BackendType::parse);
        config.remote_url = first_value(doc, "remote-url")
            .and_then(KdlValue::as_string)
            .map(str::to_string);
        config.signed_url_ttl = first_value(doc, "signed-url-ttl").and_then(as_u64);
        config.refresh_interval = first_value(doc, "refresh-interval").and_then(as_u64);
        config.retry_delay_ms = first_value(doc, "retry-delay-ms").and_then(as_u64);
        config.month_width = first_value(doc, "month-width").and_then(as_f64);

        if let Some(node) = doc.get("frozen-columns") {
            let widths: Vec<f64> = node.entries().iter().filter_map(|e| as_f64(e.value())).collect();
            if !widths.is_empty() {
                config.frozen_columns = Some(widths);
            }
        }

        config.output_format = first_value(doc, "output-format")
            .and_then(KdlValue::as_string)
            .and_then(OutputFormat::parse);

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        let nodes = doc.nodes_mut();

        if let Some(backend) = self.backend {
            nodes.push(string_node("backend", backend.as_str()));
        }
        if let Some(ref url) = self.remote_url {
            nodes.push(string_node("remote-url", url));
        }
        if let Some(ttl) = self.signed_url_ttl {
            nodes.push(integer_node("signed-url-ttl", ttl));
        }
        if let Some(interval) = self.refresh_interval {
            nodes.push(integer_node("refresh-interval", interval));
        }
        if let Some(delay) = self.retry_delay_ms {
            nodes.push(integer_node("retry-delay-ms", delay));
        }
        if let Some(width) = self.month_width {
            let mut node = KdlNode::new("month-width");
            node.push(KdlEntry::new(KdlValue::Float(width)));
            nodes.push(node);
        }
        if let Some(ref columns) = self.frozen_columns {
            let mut node = KdlNode::new("frozen-columns");
            for width in columns {
                node.push(KdlEntry::new(KdlValue::Float(*width)));
            }
            nodes.push(node);
        }
        if let Some(format) = self.output_format {
            nodes.push(string_node("output-format", format.as_str()));
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &FaenaConfig) {
        if other.backend.is_some() {
            self.backend = other.backend;
        }
        if other.remote_url.is_some() {
            self.remote_url = other.remote_url.clone();
        }
        if other.signed_url_ttl.is_some() {
            self.signed_url_ttl = other.signed_url_ttl;
        }
        if other.refresh_interval.is_some() {
            self.refresh_interval = other.refresh_interval;
        }
        if other.retry_delay_ms.is_some() {
            self.retry_delay_ms = other.retry_delay_ms;
        }
        if other.month_width.is_some() {
            self.month_width = other.month_width;
        }
        if other.frozen_columns.is_some() {
            self.frozen_columns = other.frozen_columns.clone();
        }
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
    }

    /// Set one key from its string form. An empty value unsets the key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let value = value.trim();
        let unset = value.is_empty();
        match key {
            "backend" => {
                self.backend = if unset {
                    None
                } else {
                    Some(BackendType::parse(value).ok_or_else(|| {
                        format!("backend must be 'local' or 'remote', got '{}'", value)
                    })?)
                };
            }
            "remote-url" => self.remote_url = (!unset).then(|| value.to_string()),
            "signed-url-ttl" => {
                self.signed_url_ttl = if unset { None } else { Some(parse_u64(key, value)?) };
            }
            "refresh-interval" => {
                self.refresh_interval = if unset { None } else { Some(parse_u64(key, value)?) };
            }
            "retry-delay-ms" => {
                self.retry_delay_ms = if unset { None } else { Some(parse_u64(key, value)?) };
            }
            "month-width" => {
                self.month_width = if unset { None } else { Some(parse_width(key, value)?) };
            }
            "frozen-columns" => {
                self.frozen_columns = if unset {
                    None
                } else {
                    Some(
                        value
                            .split([',', ' '])
                            .filter(|s| !s.is_empty())
                            .map(|s| parse_width(key, s))
                            .collect::<Result<Vec<_>, _>>()?,
                    )
                };
            }
            "output-format" => {
                self.output_format = if unset {
                    None
                } else {
                    Some(OutputFormat::parse(value).ok_or_else(|| {
                        format!("output-format must be 'json' or 'human', got '{}'", value)
                    })?)
                };
            }
            other => {
                return Err(format!(
                    "unknown config key '{}' (expected one of: {})",
                    other,
                    CONFIG_KEYS.join(", ")
                ));
            }
        }
        self.validate()
    }
}

/// Secrets stored in state.kdl.
///
/// **MUST be created with 0600 permissions (owner read/write only)**.
///
/// ```kdl
/// api-key "eyJhbGciOi..."
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaenaState {
    /// API key for the hosted service (sensitive!)
    pub api_key: Option<String>,
}

impl FaenaState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_secrets(&self) -> bool {
        self.api_key.is_some()
    }

    /// Mask the API key for display, keeping the first and last 4 characters.
    pub fn masked_api_key(&self) -> Option<String> {
        self.api_key.as_deref().map(mask_secret)
    }

    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            api_key: first_value(doc, "api-key")
                .and_then(KdlValue::as_string)
                .map(str::to_string),
        }
    }

    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        if let Some(ref key) = self.api_key {
            doc.nodes_mut().push(string_node("api-key", key));
        }
        doc
    }

    /// Set one key from its string form. An empty value unsets the key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "api-key" => {
                let value = value.trim();
                self.api_key = (!value.is_empty()).then(|| value.to_string());
                Ok(())
            }
            other => Err(format!("unknown state key '{}'", other)),
        }
    }
}

/// Show the first and last 4 characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        let head: String = chars.iter().take(4).collect();
        format!("{}...", head)
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Required permissions for state.kdl (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const STATE_FILE_MODE: u32 = 0o600;

/// Required permissions for config.kdl (Unix: 0644, readable by all).
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== OutputFormat Tests ====================

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("HUMAN"), Some(OutputFormat::Human));
        assert_eq!(OutputFormat::parse("invalid"), None);
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(format!("{}", OutputFormat::Json), "json");
        assert_eq!(format!("{}", OutputFormat::Human), "human");
    }

    // ==================== FaenaConfig Tests ====================

    #[test]
    fn test_config_from_kdl_empty() {
        let doc = KdlDocument::new();
        assert_eq!(FaenaConfig::from_kdl(&doc), FaenaConfig::default());
    }

    #[test]
    fn test_config_from_kdl_full() {
        let kdl = r#"
            backend "remote"
            remote-url "https://db.example.com"
            signed-url-ttl 900
            refresh-interval 600
            retry-delay-ms 250
            month-width 180.0
            frozen-columns 240.0 120
            output-format "human"
        "#;
        let doc: KdlDocument = kdl.parse().unwrap();
        let config = FaenaConfig::from_kdl(&doc);

        assert_eq!(config.backend, Some(BackendType::Remote));
        assert_eq!(config.remote_url.as_deref(), Some("https://db.example.com"));
        assert_eq!(config.signed_url_ttl, Some(900));
        assert_eq!(config.refresh_interval, Some(600));
        assert_eq!(config.retry_delay_ms, Some(250));
        assert_eq!(config.month_width, Some(180.0));
        assert_eq!(config.frozen_columns, Some(vec![240.0, 120.0]));
        assert_eq!(config.output_format, Some(OutputFormat::Human));
    }

    #[test]
    fn test_config_from_kdl_ignores_negative_integers() {
        let doc: KdlDocument = "signed-url-ttl -5".parse().unwrap();
        assert_eq!(FaenaConfig::from_kdl(&doc).signed_url_ttl, None);
    }

    #[test]
    fn test_config_to_kdl_roundtrip() {
        let config = FaenaConfig {
            backend: Some(BackendType::Local),
            remote_url: Some("https://db.example.com".to_string()),
            signed_url_ttl: Some(900),
            refresh_interval: None,
            retry_delay_ms: Some(500),
            month_width: Some(160.0),
            frozen_columns: Some(vec![200.0, 100.0, 80.0]),
            output_format: Some(OutputFormat::Json),
        };

        let doc = config.to_kdl();
        let reparsed: KdlDocument = doc.to_string().parse().unwrap();
        assert_eq!(FaenaConfig::from_kdl(&reparsed), config);
    }

    #[test]
    fn test_config_merge() {
        let mut base = FaenaConfig {
            backend: Some(BackendType::Local),
            signed_url_ttl: Some(900),
            ..Default::default()
        };
        let other = FaenaConfig {
            backend: Some(BackendType::Remote),
            month_width: Some(200.0),
            ..Default::default()
        };
        base.merge(&other);

        assert_eq!(base.backend, Some(BackendType::Remote));
        assert_eq!(base.signed_url_ttl, Some(900));
        assert_eq!(base.month_width, Some(200.0));
    }

    #[test]
    fn test_config_validate() {
        let bad_url = FaenaConfig {
            remote_url: Some("ftp://x".to_string()),
            ..Default::default()
        };
        assert!(bad_url.validate().unwrap_err().contains("remote-url"));

        let zero_ttl = FaenaConfig {
            signed_url_ttl: Some(0),
            ..Default::default()
        };
        assert!(zero_ttl.validate().is_err());
        assert!(FaenaConfig::default().validate().is_ok());

        let huge_ttl = FaenaConfig {
            signed_url_ttl: Some(100_000_000_000_000_000),
            ..Default::default()
        };
        assert!(huge_ttl.validate().unwrap_err().contains("signed-url-ttl must be between"));

        let week_ttl = FaenaConfig {
            signed_url_ttl: Some(MAX_SIGNED_URL_TTL),
            ..Default::default()
        };
        assert!(week_ttl.validate().is_ok());

        let huge_interval = FaenaConfig {
            refresh_interval: Some(u64::MAX),
            ..Default::default()
        };
        assert!(huge_interval.validate().unwrap_err().contains("refresh-interval"));
    }

    #[test]
    fn test_config_set_keys() {
        let mut config = FaenaConfig::new();
        config.set("backend", "remote").unwrap();
        config.set("signed-url-ttl", "900").unwrap();
        config.set("frozen-columns", "240, 120").unwrap();
        config.set("output-format", "human").unwrap();
        assert_eq!(config.backend, Some(BackendType::Remote));
        assert_eq!(config.signed_url_ttl, Some(900));
        assert_eq!(config.frozen_columns, Some(vec![240.0, 120.0]));

        config.set("signed-url-ttl", "").unwrap();
        assert_eq!(config.signed_url_ttl, None);
    }

    #[test]
    fn test_config_set_rejects_bad_values() {
        let mut config = FaenaConfig::new();
        assert!(config.set("backend", "ftp").is_err());
        assert!(config.set("signed-url-ttl", "-1").is_err());
        assert!(config.set("month-width", "wide").is_err());
        assert!(config.set("editor", "vim").unwrap_err().contains("unknown config key"));
    }

    // ==================== FaenaState Tests ====================

    #[test]
    fn test_state_roundtrip() {
        let state = FaenaState {
            api_key: Some("sb_secret_1234567890".to_string()),
        };
        let parsed = FaenaState::from_kdl(&state.to_kdl());
        assert_eq!(parsed, state);
        assert!(parsed.has_secrets());
    }

    #[test]
    fn test_state_masked_api_key() {
        let state = FaenaState {
            api_key: Some("sb_secret_1234567890".to_string()),
        };
        assert_eq!(state.masked_api_key().unwrap(), "sb_s...7890");
        assert_eq!(mask_secret("short"), "shor...");
    }

    #[test]
    fn test_state_set() {
        let mut state = FaenaState::new();
        state.set("api-key", "abc").unwrap();
        assert_eq!(state.api_key.as_deref(), Some("abc"));
        state.set("api-key", "").unwrap();
        assert!(!state.has_secrets());
        assert!(state.set("github-token", "x").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode_constants() {
        assert_eq!(STATE_FILE_MODE, 0o600);
        assert_eq!(CONFIG_FILE_MODE, 0o644);
    }
}
