//! Push notification payloads.
//!
//! Payloads arrive as JSON `{title, body, icon, badge, data: {url}}`. Delivery
//! is handled elsewhere; this module only decodes the payload and decides
//! where a click should go.

use serde::{Deserialize, Serialize};

/// Title shown when a payload carries none.
pub const DEFAULT_TITLE: &str = "Faena";

/// Click target when a payload carries no URL.
pub const DEFAULT_CLICK_TARGET: &str = "/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default)]
    pub data: PushData,
}

impl PushPayload {
    /// Decode a payload, tolerating missing fields. A plain-text payload
    /// becomes the body.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<PushPayload>(raw) {
            Ok(mut payload) => {
                if payload.title.is_empty() {
                    payload.title = DEFAULT_TITLE.to_string();
                }
                payload
            }
            Err(_) => Self {
                title: DEFAULT_TITLE.to_string(),
                body: raw.trim().to_string(),
                ..Default::default()
            },
        }
    }

    /// Where clicking the notification navigates.
    pub fn click_target(&self) -> &str {
        self.data
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(DEFAULT_CLICK_TARGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        let p = PushPayload::parse(
            r#"{"title":"Pago recibido","body":"Obra 12","icon":"/icon.png","badge":"/badge.png","data":{"url":"/projects/12"}}"#,
        );
        assert_eq!(p.title, "Pago recibido");
        assert_eq!(p.icon.as_deref(), Some("/icon.png"));
        assert_eq!(p.click_target(), "/projects/12");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let p = PushPayload::parse(r#"{"body":"hola"}"#);
        assert_eq!(p.title, DEFAULT_TITLE);
        assert_eq!(p.click_target(), "/");
    }

    #[test]
    fn test_plain_text_becomes_body() {
        let p = PushPayload::parse("server restarted\n");
        assert_eq!(p.body, "server restarted");
        assert_eq!(p.click_target(), "/");
    }

    #[test]
    fn test_blank_url_falls_back() {
        let p = PushPayload::parse(r#"{"data":{"url":"  "}}"#);
        assert_eq!(p.click_target(), "/");
    }
}
