//! Process-wide notification bus
//!
//! Any component can surface a message to the author without holding a
//! reference to whatever renders it. Delivery is fire-and-forget: when no
//! renderer is mounted the notification is dropped, and a renderer that
//! mounts later never sees earlier notifications.
//!
//! # Example
//!
//! ```no_run
//! use libinkpost::notifications::{NotificationBus, NotifyOptions};
//!
//! let bus = NotificationBus::global();
//! let id = bus.loading("Deleting post…", None);
//! // ... later, replace the same indicator
//! bus.success("Post deleted", Some(NotifyOptions::new().id(id)));
//! ```

use std::collections::HashSet;
use std::io::Write;
use std::sync::OnceLock;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Notification receiver type alias
pub type NotificationReceiver = broadcast::Receiver<Notification>;

const GLOBAL_CAPACITY: usize = 64;
const LOADING_ID_LEN: usize = 7;
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Default,
    Success,
    Error,
    Info,
    Warning,
    Loading,
}

impl Severity {
    fn marker(&self) -> &'static str {
        match self {
            Severity::Default => "•",
            Severity::Success => "✔",
            Severity::Error => "✖",
            Severity::Info => "ℹ",
            Severity::Warning => "⚠",
            Severity::Loading => "…",
        }
    }
}

/// Optional structured data attached to a notification
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stable id; a later notification with the same id replaces this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl NotifyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Wire format of the bus: `{severity, message, options?}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<NotifyOptions>,
}

impl Notification {
    pub fn description(&self) -> Option<&str> {
        self.options.as_ref().and_then(|o| o.description.as_deref())
    }

    pub fn id(&self) -> Option<&str> {
        self.options.as_ref().and_then(|o| o.id.as_deref())
    }
}

/// Handle to the notification channel
///
/// Cloning is cheap; all clones feed the same renderer.
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl NotificationBus {
    /// Create an independent bus. Most code should use [`NotificationBus::global`].
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// The process-wide bus
    pub fn global() -> &'static NotificationBus {
        static GLOBAL: OnceLock<NotificationBus> = OnceLock::new();
        GLOBAL.get_or_init(|| NotificationBus::new(GLOBAL_CAPACITY))
    }

    /// Mount a renderer. Only notifications emitted after this call are delivered.
    pub fn subscribe(&self) -> NotificationReceiver {
        self.sender.subscribe()
    }

    pub fn renderer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn emit(&self, notification: Notification) {
        // Err only means nobody is rendering; the notification is dropped
        let _ = self.sender.send(notification);
    }

    fn emit_with(&self, severity: Severity, message: &str, options: Option<NotifyOptions>) {
        self.emit(Notification {
            severity,
            message: message.to_string(),
            options,
        });
    }

    pub fn show(&self, message: &str, options: Option<NotifyOptions>) {
        self.emit_with(Severity::Default, message, options);
    }

    pub fn success(&self, message: &str, options: Option<NotifyOptions>) {
        self.emit_with(Severity::Success, message, options);
    }

    pub fn error(&self, message: &str, options: Option<NotifyOptions>) {
        self.emit_with(Severity::Error, message, options);
    }

    pub fn info(&self, message: &str, options: Option<NotifyOptions>) {
        self.emit_with(Severity::Info, message, options);
    }

    pub fn warning(&self, message: &str, options: Option<NotifyOptions>) {
        self.emit_with(Severity::Warning, message, options);
    }

    /// Emit a loading indicator and return its id
    ///
    /// Uses `options.id` when given, otherwise generates one.
    pub fn loading(&self, message: &str, options: Option<NotifyOptions>) -> String {
        let mut options = options.unwrap_or_default();
        let id = options.id.clone().unwrap_or_else(generate_id);
        options.id = Some(id.clone());
        self.emit_with(Severity::Loading, message, Some(options));
        id
    }
}

fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..LOADING_ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

// ============================================================================
// Terminal renderer
// ============================================================================

/// Renders notifications as lines of text
///
/// A notification reusing the id of a pending loading indicator is drawn as
/// the resolution of that indicator.
#[derive(Default)]
pub struct TerminalRenderer {
    pending: HashSet<String>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render<W: Write>(&mut self, notification: &Notification, out: &mut W) -> std::io::Result<()> {
        if notification.message.is_empty() {
            return Ok(());
        }

        let resolves = notification
            .id()
            .map(|id| notification.severity != Severity::Loading && self.pending.remove(id))
            .unwrap_or(false);
        if notification.severity == Severity::Loading {
            if let Some(id) = notification.id() {
                self.pending.insert(id.to_string());
            }
        }

        let prefix = if resolves { "  └ " } else { "" };
        writeln!(out, "{}{} {}", prefix, notification.severity.marker(), notification.message)?;
        if let Some(description) = notification.description() {
            writeln!(out, "    {}", description)?;
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// A renderer task mounted on a bus, printing to stdout
pub struct RendererHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RendererHandle {
    /// Mount a terminal renderer on `bus`
    pub fn spawn(bus: &NotificationBus) -> Self {
        let mut receiver = bus.subscribe();
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut renderer = TerminalRenderer::new();
            loop {
                tokio::select! {
                    received = receiver.recv() => match received {
                        Ok(notification) => print_notification(&mut renderer, &notification),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Notification renderer skipped {} notifications", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = &mut shutdown_rx => {
                        // Everything emitted before shutdown is already queued
                        while let Ok(notification) = receiver.try_recv() {
                            print_notification(&mut renderer, &notification);
                        }
                        break;
                    }
                }
            }
        });

        Self { shutdown, task }
    }

    /// Render whatever is queued, then unmount
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::warn!("Notification renderer task failed: {}", e);
        }
    }
}

fn print_notification(renderer: &mut TerminalRenderer, notification: &Notification) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = renderer.render(notification, &mut out) {
        tracing::debug!("Failed to render notification: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_all(notifications: &[Notification]) -> String {
        let mut renderer = TerminalRenderer::new();
        let mut out = Vec::new();
        for n in notifications {
            renderer.render(n, &mut out).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = NotificationBus::new(8);
        let mut receiver = bus.subscribe();

        bus.warning(
            "Title is required",
            Some(NotifyOptions::new().description("Fill in the title")),
        );

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.severity, Severity::Warning);
        assert_eq!(received.message, "Title is required");
        assert_eq!(received.description(), Some("Fill in the title"));
    }

    #[tokio::test]
    async fn test_emit_without_renderer_is_dropped() {
        let bus = NotificationBus::new(8);
        bus.error("nobody is listening", None);
        assert_eq!(bus.renderer_count(), 0);

        // A renderer mounted afterwards does not get a replay
        let mut receiver = bus.subscribe();
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_loading_generates_id() {
        let bus = NotificationBus::new(8);
        let mut receiver = bus.subscribe();

        let id = bus.loading("Publishing…", None);
        assert_eq!(id.len(), LOADING_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.severity, Severity::Loading);
        assert_eq!(received.id(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_loading_keeps_caller_id() {
        let bus = NotificationBus::new(8);
        let id = bus.loading("Deleting…", Some(NotifyOptions::new().id("delete-1")));
        assert_eq!(id, "delete-1");
    }

    #[test]
    fn test_global_bus_is_shared() {
        let a = NotificationBus::global();
        let b = NotificationBus::global();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_wire_format() {
        let notification = Notification {
            severity: Severity::Success,
            message: "Deleted".to_string(),
            options: Some(NotifyOptions::new().description("Waiting for deployment")),
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["severity"], "success");
        assert_eq!(json["message"], "Deleted");
        assert_eq!(json["options"]["description"], "Waiting for deployment");
        assert!(json["options"].get("id").is_none());

        let bare = Notification {
            severity: Severity::Info,
            message: "hi".to_string(),
            options: None,
        };
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_renderer_skips_empty_messages() {
        let output = render_all(&[Notification {
            severity: Severity::Info,
            message: String::new(),
            options: None,
        }]);
        assert!(output.is_empty());
    }

    #[test]
    fn test_renderer_prints_description_indented() {
        let output = render_all(&[Notification {
            severity: Severity::Error,
            message: "Delete failed".to_string(),
            options: Some(NotifyOptions::new().description("404 Not Found")),
        }]);
        assert_eq!(output, "✖ Delete failed\n    404 Not Found\n");
    }

    #[test]
    fn test_renderer_resolves_loading_by_id() {
        let mut renderer = TerminalRenderer::new();
        let mut out = Vec::new();

        renderer
            .render(
                &Notification {
                    severity: Severity::Loading,
                    message: "Publishing…".to_string(),
                    options: Some(NotifyOptions::new().id("abc")),
                },
                &mut out,
            )
            .unwrap();
        assert_eq!(renderer.pending_count(), 1);

        renderer
            .render(
                &Notification {
                    severity: Severity::Success,
                    message: "Published".to_string(),
                    options: Some(NotifyOptions::new().id("abc")),
                },
                &mut out,
            )
            .unwrap();
        assert_eq!(renderer.pending_count(), 0);

        let output = String::from_utf8(out).unwrap();
        assert_eq!(output, "… Publishing…\n  └ ✔ Published\n");
    }
}
