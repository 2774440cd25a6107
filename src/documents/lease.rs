//! Rotating signed-URL lease.
//!
//! A lease signs `bucket/path` on start, then re-signs every refresh interval
//! (80% of the TTL by default) or on demand. Signing failures caused by an
//! expired credential are retried once after a short delay; any other failure
//! clears the URL and exposes the message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::{Error, Result};
use crate::backend::UrlSigner;

/// Default lifetime of a signed URL in seconds.
pub const DEFAULT_SIGNED_URL_TTL: u64 = 3600;

/// Longest signed URL lifetime accepted, in seconds (7 days).
pub const MAX_SIGNED_URL_TTL: u64 = 7 * 24 * 60 * 60;

/// Lower bound for the computed refresh interval in seconds.
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 60;

/// Delay before the single retry of an expired-credential failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

static EXPIRED_TOKEN: OnceLock<Regex> = OnceLock::new();

/// Refresh interval for a lease: the explicit value when given, otherwise
/// `max(60, floor(ttl * 0.8))`.
pub fn refresh_interval_secs(ttl_seconds: u64, explicit: Option<u64>) -> u64 {
    explicit
        .filter(|secs| *secs > 0)
        .unwrap_or_else(|| {
            let eighty_percent = u128::from(ttl_seconds) * 4 / 5;
            u64::try_from(eighty_percent)
                .unwrap_or(u64::MAX)
                .max(MIN_REFRESH_INTERVAL_SECS)
        })
}

/// Reject a TTL outside `1..=MAX_SIGNED_URL_TTL`.
pub fn check_ttl(ttl_seconds: u64) -> Result<u64> {
    if ttl_seconds == 0 || ttl_seconds > MAX_SIGNED_URL_TTL {
        return Err(Error::InvalidInput(format!(
            "ttl must be between 1 and {} seconds, got {}",
            MAX_SIGNED_URL_TTL, ttl_seconds
        )));
    }
    Ok(ttl_seconds)
}

/// Instant at which a URL signed at `now` for `ttl_seconds` expires.
pub fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> Result<DateTime<Utc>> {
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| Error::InvalidInput(format!("ttl of {} seconds is out of range", ttl_seconds)))
}

/// Whether a signing error message reports an invalid or expired credential.
pub fn is_expired_token_error(message: &str) -> bool {
    EXPIRED_TOKEN
        .get_or_init(|| Regex::new(r"JWT|exp").expect("Invalid regex"))
        .is_match(message)
}

/// Sign once, retrying exactly once after `retry_delay` when the failure is an
/// expired credential.
pub async fn sign_with_retry<S: UrlSigner>(
    signer: &S,
    bucket: &str,
    path: &str,
    ttl_seconds: u64,
    retry_delay: Duration,
) -> Result<String> {
    match signer.create_signed_url(bucket, path, ttl_seconds).await {
        Ok(url) => Ok(url),
        Err(e) if is_expired_token_error(&e.user_message()) => {
            tracing::warn!(bucket, path, error = %e, "signing credential expired, retrying once");
            tokio::time::sleep(retry_delay).await;
            signer.create_signed_url(bucket, path, ttl_seconds).await
        }
        Err(e) => Err(e),
    }
}

/// The stored object a lease signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseTarget {
    pub bucket: String,
    pub path: String,
}

impl LeaseTarget {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseOptions {
    pub ttl_seconds: u64,
    /// Explicit refresh interval; derived from the TTL when `None`
    pub refresh_interval_seconds: Option<u64>,
    pub retry_delay: Duration,
}

impl Default for LeaseOptions {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_SIGNED_URL_TTL,
            refresh_interval_seconds: None,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl LeaseOptions {
    /// Check the TTL before any signing starts.
    pub fn validate(&self) -> Result<()> {
        check_ttl(self.ttl_seconds).map(|_| ())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(refresh_interval_secs(self.ttl_seconds, self.refresh_interval_seconds))
    }
}

/// Observable lease state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LeaseState {
    Unsigned,
    Valid { url: String, expires_at: DateTime<Utc> },
    Failed { message: String },
}

impl LeaseState {
    pub fn url(&self) -> Option<&str> {
        match self {
            LeaseState::Valid { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// Snapshot of a lease.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedUrlLease {
    pub bucket: String,
    pub path: String,
    pub ttl_seconds: u64,
    pub refresh_interval_seconds: u64,
    pub current_url: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

/// Entry point for starting leases.
pub struct RotatingLease;

impl RotatingLease {
    /// Start signing `target` in the background.
    pub fn spawn<S: UrlSigner>(signer: Arc<S>, target: LeaseTarget, options: LeaseOptions) -> LeaseHandle<S> {
        let (state, _) = watch::channel(LeaseState::Unsigned);
        let mut handle = LeaseHandle {
            signer,
            target,
            options,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            refresh_tx: None,
            task: None,
        };
        handle.start();
        handle
    }
}

/// Owner of a running lease. Dropping it tears the refresher down.
pub struct LeaseHandle<S: UrlSigner> {
    signer: Arc<S>,
    target: LeaseTarget,
    options: LeaseOptions,
    state: Arc<watch::Sender<LeaseState>>,
    generation: Arc<AtomicU64>,
    refresh_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<S: UrlSigner> LeaseHandle<S> {
    fn start(&mut self) {
        let generation = self.generation.load(Ordering::SeqCst);
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let worker = Refresher {
            signer: self.signer.clone(),
            target: self.target.clone(),
            options: self.options,
            state: self.state.clone(),
            generation: self.generation.clone(),
            started_at: generation,
        };
        self.refresh_tx = Some(refresh_tx);
        self.task = Some(tokio::spawn(worker.run(refresh_rx)));
    }

    /// Abort the refresher and invalidate anything it has in flight.
    fn teardown(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.refresh_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn target(&self) -> &LeaseTarget {
        &self.target
    }

    pub fn state(&self) -> LeaseState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LeaseState> {
        self.state.subscribe()
    }

    pub fn current_url(&self) -> Option<String> {
        self.state.borrow().url().map(str::to_string)
    }

    pub fn snapshot(&self) -> SignedUrlLease {
        let state = self.state.borrow();
        let (current_url, expiry) = match &*state {
            LeaseState::Valid { url, expires_at } => (Some(url.clone()), Some(*expires_at)),
            _ => (None, None),
        };
        SignedUrlLease {
            bucket: self.target.bucket.clone(),
            path: self.target.path.clone(),
            ttl_seconds: self.options.ttl_seconds,
            refresh_interval_seconds: self.options.refresh_interval().as_secs(),
            current_url,
            expiry,
        }
    }

    /// Re-sign now instead of waiting for the interval.
    pub fn refresh(&self) {
        if let Some(tx) = &self.refresh_tx {
            // A full channel already has a refresh pending.
            let _ = tx.try_send(());
        }
    }

    /// Point the lease at another object. The old refresher is torn down and
    /// a new one signs the new target.
    pub fn retarget(&mut self, target: LeaseTarget) {
        if target == self.target && self.task.is_some() {
            return;
        }
        self.teardown();
        self.target = target;
        self.state.send_replace(LeaseState::Unsigned);
        self.start();
    }

    /// Stop rotating and clear the URL.
    pub fn stop(&mut self) {
        self.teardown();
        self.state.send_replace(LeaseState::Unsigned);
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<S: UrlSigner> Drop for LeaseHandle<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct Refresher<S> {
    signer: Arc<S>,
    target: LeaseTarget,
    options: LeaseOptions,
    state: Arc<watch::Sender<LeaseState>>,
    generation: Arc<AtomicU64>,
    started_at: u64,
}

impl<S: UrlSigner> Refresher<S> {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.started_at
    }

    async fn run(self, mut refresh_rx: mpsc::Receiver<()>) {
        if let Err(e) = self.options.validate() {
            tracing::error!(bucket = %self.target.bucket, path = %self.target.path, error = %e, "refusing to start lease");
            self.state.send_replace(LeaseState::Failed {
                message: e.user_message(),
            });
            return;
        }
        let interval = self.options.refresh_interval();
        loop {
            let result = sign_with_retry(
                self.signer.as_ref(),
                &self.target.bucket,
                &self.target.path,
                self.options.ttl_seconds,
                self.options.retry_delay,
            )
            .await;
            if !self.is_current() {
                tracing::debug!(bucket = %self.target.bucket, path = %self.target.path, "discarding signature for torn-down lease");
                return;
            }
            let signed = result
                .and_then(|url| expiry_after(Utc::now(), self.options.ttl_seconds).map(|expires_at| (url, expires_at)));
            let next = match signed {
                Ok((url, expires_at)) => LeaseState::Valid { url, expires_at },
                Err(e) => {
                    tracing::error!(bucket = %self.target.bucket, path = %self.target.path, error = %e, "failed to sign document URL");
                    LeaseState::Failed {
                        message: e.user_message(),
                    }
                }
            };
            self.state.send_replace(next);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                msg = refresh_rx.recv() => {
                    if msg.is_none() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use crate::Error;

    /// Signer that replays scripted failures, then succeeds.
    #[derive(Default)]
    pub(crate) struct ScriptedSigner {
        failures: Mutex<VecDeque<String>>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedSigner {
        pub(crate) fn failing(messages: &[&str]) -> Self {
            Self {
                failures: Mutex::new(messages.iter().map(|m| m.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl UrlSigner for ScriptedSigner {
        async fn create_signed_url(&self, bucket: &str, path: &str, ttl_seconds: u64) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(message) = self.failures.lock().unwrap().pop_front() {
                return Err(Error::Remote { status: 400, message });
            }
            Ok(format!("https://cdn.example/{}/{}?ttl={}&n={}", bucket, path, ttl_seconds, n))
        }
    }

    /// Signer that takes `delay` to sign `slow_path`; other paths sign at once.
    struct SlowSigner {
        slow_path: &'static str,
        delay: Duration,
        completed: AtomicUsize,
    }

    impl SlowSigner {
        fn new(slow_path: &'static str) -> Self {
            Self {
                slow_path,
                delay: Duration::from_secs(10),
                completed: AtomicUsize::new(0),
            }
        }
    }

    impl UrlSigner for SlowSigner {
        async fn create_signed_url(&self, bucket: &str, path: &str, ttl_seconds: u64) -> Result<String> {
            if path == self.slow_path {
                tokio::time::sleep(self.delay).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://cdn.example/{}/{}?ttl={}", bucket, path, ttl_seconds))
        }
    }

    fn options(ttl: u64) -> LeaseOptions {
        LeaseOptions {
            ttl_seconds: ttl,
            refresh_interval_seconds: None,
            retry_delay: Duration::from_millis(250),
        }
    }

    async fn next_state(rx: &mut watch::Receiver<LeaseState>) -> LeaseState {
        rx.changed().await.unwrap();
        rx.borrow_and_update().clone()
    }

    #[test]
    fn test_refresh_interval_defaults_to_eighty_percent() {
        assert_eq!(refresh_interval_secs(900, None), 720);
        assert_eq!(refresh_interval_secs(3600, None), 2880);
    }

    #[test]
    fn test_refresh_interval_floor_and_explicit() {
        assert_eq!(refresh_interval_secs(30, None), 60);
        assert_eq!(refresh_interval_secs(900, Some(120)), 120);
        assert_eq!(refresh_interval_secs(900, Some(0)), 720);
    }

    #[test]
    fn test_refresh_interval_huge_ttl_does_not_overflow() {
        assert_eq!(refresh_interval_secs(u64::MAX, None), 14_757_395_258_967_641_292);
        assert_eq!(refresh_interval_secs(MAX_SIGNED_URL_TTL, None), 483_840);
    }

    #[test]
    fn test_check_ttl_bounds() {
        assert!(check_ttl(0).is_err());
        assert_eq!(check_ttl(1).unwrap(), 1);
        assert_eq!(check_ttl(MAX_SIGNED_URL_TTL).unwrap(), MAX_SIGNED_URL_TTL);
        let err = check_ttl(100_000_000_000_000_000).unwrap_err();
        assert!(err.to_string().contains("ttl must be between 1 and 604800"));
    }

    #[test]
    fn test_expiry_after_rejects_out_of_range_ttl() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 900).unwrap(), now + TimeDelta::seconds(900));
        assert!(expiry_after(now, u64::MAX).is_err());
        assert!(expiry_after(now, i64::MAX as u64).is_err());
    }

    #[test]
    fn test_expired_token_classification() {
        assert!(is_expired_token_error("JWT expired"));
        assert!(is_expired_token_error("invalid claim: missing exp"));
        assert!(!is_expired_token_error("Object not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_retries_once_on_expired_token() {
        let signer = ScriptedSigner::failing(&["JWT expired"]);
        let start = tokio::time::Instant::now();
        let url = sign_with_retry(&signer, "docs", "a.pdf", 60, Duration::from_millis(250))
            .await
            .unwrap();
        assert!(url.contains("docs/a.pdf"));
        assert_eq!(signer.calls(), 2);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_does_not_retry_other_errors() {
        let signer = ScriptedSigner::failing(&["Object not found"]);
        let err = sign_with_retry(&signer, "docs", "a.pdf", 60, Duration::from_millis(250))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Object not found");
        assert_eq!(signer.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_gives_up_after_second_expiry() {
        let signer = ScriptedSigner::failing(&["JWT expired", "JWT expired"]);
        assert!(sign_with_retry(&signer, "docs", "a.pdf", 60, Duration::ZERO).await.is_err());
        assert_eq!(signer.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_signs_then_rotates_on_interval() {
        let signer = Arc::new(ScriptedSigner::default());
        let lease = RotatingLease::spawn(signer.clone(), LeaseTarget::new("docs", "plan.pdf"), options(900));
        let mut rx = lease.subscribe();
        let start = tokio::time::Instant::now();

        let first = next_state(&mut rx).await;
        assert!(first.url().unwrap().ends_with("n=1"));
        assert_eq!(lease.snapshot().refresh_interval_seconds, 720);

        let second = next_state(&mut rx).await;
        assert!(second.url().unwrap().ends_with("n=2"));
        assert!(start.elapsed() >= Duration::from_secs(720));
        assert_eq!(lease.current_url().as_deref(), second.url());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_resigns_early() {
        let signer = Arc::new(ScriptedSigner::default());
        let lease = RotatingLease::spawn(signer.clone(), LeaseTarget::new("docs", "plan.pdf"), options(900));
        let mut rx = lease.subscribe();
        next_state(&mut rx).await;
        let start = tokio::time::Instant::now();

        lease.refresh();
        let state = next_state(&mut rx).await;
        assert!(state.url().unwrap().ends_with("n=2"));
        assert!(start.elapsed() < Duration::from_secs(720));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_clears_url_and_surfaces_message() {
        let signer = Arc::new(ScriptedSigner::failing(&["Object not found"]));
        let lease = RotatingLease::spawn(signer.clone(), LeaseTarget::new("docs", "gone.pdf"), options(900));
        let mut rx = lease.subscribe();
        let state = next_state(&mut rx).await;
        assert_eq!(
            state,
            LeaseState::Failed {
                message: "Object not found".to_string()
            }
        );
        assert!(lease.current_url().is_none());
        assert!(lease.snapshot().expiry.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_signs_new_object() {
        let signer = Arc::new(ScriptedSigner::default());
        let mut lease = RotatingLease::spawn(signer.clone(), LeaseTarget::new("docs", "a.pdf"), options(900));
        let mut rx = lease.subscribe();
        next_state(&mut rx).await;

        lease.retarget(LeaseTarget::new("docs", "b.pdf"));
        let state = loop {
            let state = next_state(&mut rx).await;
            if state.url().is_some() {
                break state;
            }
        };
        assert!(state.url().unwrap().contains("docs/b.pdf"));
        assert_eq!(lease.target().path, "b.pdf");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_with_oversized_ttl_fails_without_signing() {
        let signer = Arc::new(ScriptedSigner::default());
        let lease = RotatingLease::spawn(signer.clone(), LeaseTarget::new("docs", "a.pdf"), options(u64::MAX));
        let mut rx = lease.subscribe();
        let state = next_state(&mut rx).await;
        assert!(matches!(state, LeaseState::Failed { ref message } if message.contains("ttl must be between")));
        assert_eq!(signer.calls(), 0);
        assert_eq!(lease.snapshot().refresh_interval_seconds, 14_757_395_258_967_641_292);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_slow_sign_never_publishes() {
        let signer = Arc::new(SlowSigner::new("a.pdf"));
        let mut lease = RotatingLease::spawn(signer.clone(), LeaseTarget::new("docs", "a.pdf"), options(900));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(lease.state(), LeaseState::Unsigned);
        lease.stop();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(lease.state(), LeaseState::Unsigned);
        assert!(lease.current_url().is_none());
        assert_eq!(signer.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_during_slow_sign_keeps_new_url() {
        let signer = Arc::new(SlowSigner::new("a.pdf"));
        let mut lease = RotatingLease::spawn(signer.clone(), LeaseTarget::new("docs", "a.pdf"), options(900));

        tokio::time::sleep(Duration::from_secs(1)).await;
        lease.retarget(LeaseTarget::new("docs", "b.pdf"));

        // Past the point where the a.pdf signature would have landed.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let url = lease.current_url().unwrap();
        assert!(url.contains("docs/b.pdf"), "stale url {}", url);
        assert!(!url.contains("a.pdf"));
        assert_eq!(signer.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_tears_down_refresher() {
        let signer = Arc::new(ScriptedSigner::default());
        let mut lease = RotatingLease::spawn(signer.clone(), LeaseTarget::new("docs", "a.pdf"), options(900));
        let mut rx = lease.subscribe();
        next_state(&mut rx).await;

        lease.stop();
        assert_eq!(lease.state(), LeaseState::Unsigned);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(signer.calls(), 1);
        assert!(!lease.is_running());
    }
}
