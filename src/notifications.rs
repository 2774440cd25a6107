//! User-facing notifications.
//!
//! Provides a toast notification system with auto-dismiss, overflow handling
//! and notification history. Stores, the parametric sync watcher and document
//! leases report failures through the [`Notifier`] trait; the alert sound is
//! an injected [`SoundPlayer`] rather than ambient global state.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum number of toasts to display at once
const MAX_VISIBLE_TOASTS: usize = 3;

/// Default auto-dismiss duration in seconds
const DEFAULT_DISMISS_SECONDS: u64 = 5;

/// Maximum history entries to keep
const MAX_HISTORY_ENTRIES: usize = 100;

/// Notification level (determines styling and sound behavior)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Informational message
    Info,
    /// Success message (override saved, etc.)
    Success,
    /// Warning message
    Warning,
    /// Error message
    Error,
}

impl NotificationLevel {
    /// Get icon/prefix for this level
    pub fn icon(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "ℹ",
            NotificationLevel::Success => "✓",
            NotificationLevel::Warning => "⚠",
            NotificationLevel::Error => "✗",
        }
    }

    /// Whether this level should play the alert sound
    pub fn should_bell(&self) -> bool {
        matches!(self, NotificationLevel::Warning | NotificationLevel::Error)
    }
}

/// A single toast notification
#[derive(Debug, Clone)]
pub struct Toast {
    /// Unique ID for this toast
    pub id: u64,
    /// Notification level
    pub level: NotificationLevel,
    /// Message content
    pub message: String,
    /// When the toast was created
    pub created_at: Instant,
    /// How long before auto-dismiss (None = manual dismiss only)
    pub duration: Option<Duration>,
    /// Whether this toast has been dismissed
    pub dismissed: bool,
}

impl Toast {
    /// Create a new toast
    pub fn new(id: u64, level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            id,
            level,
            message: message.into(),
            created_at: Instant::now(),
            duration: Some(Duration::from_secs(DEFAULT_DISMISS_SECONDS)),
            dismissed: false,
        }
    }

    /// Create a toast that won't auto-dismiss
    pub fn sticky(id: u64, level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            duration: None,
            ..Self::new(id, level, message)
        }
    }

    /// Check if this toast should be dismissed due to timeout
    pub fn is_expired(&self) -> bool {
        match self.duration {
            Some(duration) => self.created_at.elapsed() >= duration,
            None => false,
        }
    }

    /// Mark this toast as dismissed
    pub fn dismiss(&mut self) {
        self.dismissed = true;
    }
}

/// Entry in the notification history
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub level: NotificationLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Create from a toast
    pub fn from_toast(toast: &Toast) -> Self {
        Self {
            level: toast.level,
            message: toast.message.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Toast and history bookkeeping.
#[derive(Debug)]
pub struct NotificationManager {
    /// Active toasts (newest first)
    toasts: VecDeque<Toast>,
    /// Notification history (newest first)
    history: VecDeque<HistoryEntry>,
    next_id: u64,
    /// Count of pending (overflow) toasts not displayed
    pub overflow_count: usize,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationManager {
    pub fn new() -> Self {
        Self {
            toasts: VecDeque::new(),
            history: VecDeque::new(),
            next_id: 1,
            overflow_count: 0,
        }
    }

    /// Add a new notification, returning its toast id
    pub fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let toast = if level == NotificationLevel::Error {
            Toast::sticky(id, level, message)
        } else {
            Toast::new(id, level, message)
        };

        self.history.push_front(HistoryEntry::from_toast(&toast));
        if self.history.len() > MAX_HISTORY_ENTRIES {
            self.history.pop_back();
        }

        self.toasts.push_front(toast);
        self.update_overflow();
        id
    }

    /// Remove expired and dismissed toasts
    pub fn cleanup(&mut self) {
        self.toasts.retain(|t| !t.dismissed && !t.is_expired());
        self.update_overflow();
    }

    /// Dismiss one toast by id
    pub fn dismiss(&mut self, id: u64) {
        if let Some(toast) = self.toasts.iter_mut().find(|t| t.id == id) {
            toast.dismiss();
        }
        self.cleanup();
    }

    /// Dismiss all toasts
    pub fn dismiss_all(&mut self) {
        for toast in &mut self.toasts {
            toast.dismiss();
        }
        self.cleanup();
    }

    /// Get visible toasts (limited by MAX_VISIBLE_TOASTS)
    pub fn visible_toasts(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter().take(MAX_VISIBLE_TOASTS)
    }

    pub fn has_toasts(&self) -> bool {
        !self.toasts.is_empty()
    }

    fn update_overflow(&mut self) {
        self.overflow_count = self.toasts.len().saturating_sub(MAX_VISIBLE_TOASTS);
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }
}

/// Plays the alert sound for warnings and errors.
pub trait SoundPlayer: Send + Sync {
    fn play(&self, level: NotificationLevel);
}

/// Sound player that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayer;

impl SoundPlayer for SilentPlayer {
    fn play(&self, _level: NotificationLevel) {}
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self, _level: NotificationLevel) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str);

    fn error(&self, message: &str) {
        self.notify(NotificationLevel::Error, message);
    }

    fn success(&self, message: &str) {
        self.notify(NotificationLevel::Success, message);
    }
}

/// Thread-safe notification center with an injected sound player.
pub struct NotificationCenter {
    manager: Mutex<NotificationManager>,
    sound: Box<dyn SoundPlayer>,
    /// Whether warnings and errors play the sound
    pub bell_enabled: bool,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("bell_enabled", &self.bell_enabled)
            .finish_non_exhaustive()
    }
}

impl NotificationCenter {
    /// Create a silent notification center.
    pub fn new() -> Self {
        Self::with_sound(Box::new(SilentPlayer))
    }

    pub fn with_sound(sound: Box<dyn SoundPlayer>) -> Self {
        Self {
            manager: Mutex::new(NotificationManager::new()),
            sound,
            bell_enabled: true,
        }
    }

    fn with_manager<T>(&self, f: impl FnOnce(&mut NotificationManager) -> T) -> T {
        let mut guard = match self.manager.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Snapshot of the visible toasts, newest first.
    pub fn visible_toasts(&self) -> Vec<Toast> {
        self.with_manager(|m| {
            m.cleanup();
            m.visible_toasts().cloned().collect()
        })
    }

    /// Snapshot of the history, newest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.with_manager(|m| m.history().cloned().collect())
    }

    pub fn dismiss(&self, id: u64) {
        self.with_manager(|m| m.dismiss(id));
    }

    pub fn dismiss_all(&self) {
        self.with_manager(NotificationManager::dismiss_all);
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, level: NotificationLevel, message: &str) {
        self.with_manager(|m| m.notify(level, message));
        if self.bell_enabled && level.should_bell() {
            self.sound.play(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPlayer(Arc<AtomicUsize>);

    impl SoundPlayer for CountingPlayer {
        fn play(&self, _level: NotificationLevel) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_notification_levels() {
        assert!(NotificationLevel::Error.should_bell());
        assert!(NotificationLevel::Warning.should_bell());
        assert!(!NotificationLevel::Info.should_bell());
        assert!(!NotificationLevel::Success.should_bell());
    }

    #[test]
    fn test_toast_expiry() {
        let toast = Toast::new(1, NotificationLevel::Info, "test");
        assert!(!toast.is_expired());

        let mut sticky = Toast::sticky(2, NotificationLevel::Info, "sticky");
        assert!(!sticky.is_expired());
        sticky.dismiss();
        assert!(sticky.dismissed);
    }

    #[test]
    fn test_notification_manager_overflow() {
        let mut manager = NotificationManager::new();
        assert!(!manager.has_toasts());

        manager.notify(NotificationLevel::Info, "Test message");
        assert_eq!(manager.visible_toasts().count(), 1);

        for i in 0..5 {
            manager.notify(NotificationLevel::Info, format!("Message {}", i));
        }
        assert_eq!(manager.visible_toasts().count(), MAX_VISIBLE_TOASTS);
        assert_eq!(manager.overflow_count, 3);
    }

    #[test]
    fn test_errors_are_sticky() {
        let mut manager = NotificationManager::new();
        manager.notify(NotificationLevel::Error, "boom");
        let toast = manager.visible_toasts().next().unwrap();
        assert!(toast.duration.is_none());
    }

    #[test]
    fn test_dismiss_by_id() {
        let mut manager = NotificationManager::new();
        let first = manager.notify(NotificationLevel::Info, "one");
        manager.notify(NotificationLevel::Info, "two");
        manager.dismiss(first);
        let messages: Vec<&str> = manager.visible_toasts().map(|t| t.message.as_str()).collect();
        assert_eq!(messages, vec!["two"]);
        assert_eq!(manager.history().count(), 2);
    }

    #[test]
    fn test_center_plays_injected_sound_for_errors_only() {
        let count = Arc::new(AtomicUsize::new(0));
        let center = NotificationCenter::with_sound(Box::new(CountingPlayer(count.clone())));
        center.notify(NotificationLevel::Info, "info");
        center.success("saved");
        center.error("failed");
        center.notify(NotificationLevel::Warning, "careful");
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(center.history().len(), 4);
        assert_eq!(center.visible_toasts()[0].message, "careful");
    }

    #[test]
    fn test_center_bell_disabled() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut center = NotificationCenter::with_sound(Box::new(CountingPlayer(count.clone())));
        center.bell_enabled = false;
        center.error("failed");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
