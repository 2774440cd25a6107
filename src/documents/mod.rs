//! Signed access to stored documents.
//!
//! - `lease`: rotating signed-URL lease with retry-once on expired credentials
//! - `open`: one-shot "open in new tab" flow with a pre-opened window

pub mod lease;
pub mod open;

pub use lease::{
    DEFAULT_RETRY_DELAY, DEFAULT_SIGNED_URL_TTL, LeaseHandle, LeaseOptions, LeaseState, LeaseTarget,
    MAX_SIGNED_URL_TTL, RotatingLease, SignedUrlLease, check_ttl, expiry_after, is_expired_token_error,
    refresh_interval_secs, sign_with_retry,
};
pub use open::{OpenOutcome, PendingWindow, WindowOpener, open_in_new_tab};
