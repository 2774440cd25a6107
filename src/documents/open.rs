//! Open a stored document in a new window.
//!
//! The window is opened blank before signing starts, then navigated once the
//! signed URL is available. A blocked popup ends the flow quietly.

use std::time::Duration;

use serde::Serialize;

use super::lease::sign_with_retry;
use crate::Result;
use crate::backend::UrlSigner;

/// A window opened before its destination is known.
pub trait PendingWindow: Send {
    fn navigate(&mut self, url: &str);
    fn close(&mut self);
}

/// Opens blank windows. Returns `None` when the popup is blocked.
pub trait WindowOpener: Send + Sync {
    type Window: PendingWindow;

    fn open_blank(&self) -> Option<Self::Window>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OpenOutcome {
    Opened { url: String },
    Blocked,
}

/// Open `bucket/path` in a new window.
///
/// Signing uses the same retry-once policy as the rotating lease. On failure
/// the pre-opened window is closed and the error returned.
pub async fn open_in_new_tab<O: WindowOpener, S: UrlSigner>(
    opener: &O,
    signer: &S,
    bucket: &str,
    path: &str,
    ttl_seconds: u64,
    retry_delay: Duration,
) -> Result<OpenOutcome> {
    let Some(mut window) = opener.open_blank() else {
        tracing::info!(bucket, path, "popup blocked, not opening document");
        return Ok(OpenOutcome::Blocked);
    };

    match sign_with_retry(signer, bucket, path, ttl_seconds, retry_delay).await {
        Ok(url) => {
            window.navigate(&url);
            Ok(OpenOutcome::Opened { url })
        }
        Err(e) => {
            tracing::error!(bucket, path, error = %e, "failed to open document");
            window.close();
            Err(e)
        }
    }
}
