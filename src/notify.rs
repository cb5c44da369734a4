//! Best-effort notification channel.
//!
//! Pipelines report what they are doing (requests sent, records skipped,
//! continuation hints) through a [`Notifier`]. Delivery is fire-and-forget:
//! implementations swallow their own I/O failures, and a notification never
//! affects the outcome of the call that emitted it. Output goes to
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Mutex;

/// Severity of a notification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

/// Fire-and-forget notification sink. Implementations must never propagate
/// delivery failures to the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.notify(Level::Info, message);
    }
    fn warn(&self, message: &str) {
        self.notify(Level::Warn, message);
    }
    fn error(&self, message: &str) {
        self.notify(Level::Error, message);
    }
}

/// Human-friendly notifications on stderr: `warn  work item 12: skipped`.
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, level: Level, message: &str) {
        let line = format!("{:<5} {}\n", level.tag(), message);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }
}

/// Machine-readable notifications: one JSON object per line on stderr.
pub struct JsonNotifier;

impl Notifier for JsonNotifier {
    fn notify(&self, level: Level, message: &str) {
        let obj = serde_json::json!({
            "event": "notification",
            "level": level.tag(),
            "message": message,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }
}

/// No-op notifier when notifications are disabled.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _level: Level, _message: &str) {}
}

/// Collects notifications in memory. Used by tests to assert on emitted
/// warnings and hints.
#[derive(Default)]
pub struct CollectingNotifier {
    events: Mutex<Vec<(Level, String)>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Level, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, level: Level, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

/// Notification mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotifyMode {
    Off,
    Human,
    Json,
}

impl NotifyMode {
    /// Default: human notifications when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            NotifyMode::Human
        } else {
            NotifyMode::Off
        }
    }

    pub fn notifier(&self) -> std::sync::Arc<dyn Notifier> {
        match self {
            NotifyMode::Off => std::sync::Arc::new(NullNotifier),
            NotifyMode::Human => std::sync::Arc::new(StderrNotifier),
            NotifyMode::Json => std::sync::Arc::new(JsonNotifier),
        }
    }
}
