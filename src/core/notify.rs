//! Server Notifications
//!
//! Broadcasts server-initiated MCP notifications (tool list changes, resource
//! list changes, progress) to every connected transport.

use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::core::protocol::MCPNotification;

const CHANNEL_CAPACITY: usize = 256;

pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
pub const PROGRESS: &str = "notifications/progress";

/// Cloneable handle for publishing notifications.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<MCPNotification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all notifications published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<MCPNotification> {
        self.tx.subscribe()
    }

    /// Publish a notification. Having no subscribers is not an error.
    pub fn send(&self, notification: MCPNotification) {
        let method = notification.method.clone();
        match self.tx.send(notification) {
            Ok(receivers) => tracing::debug!(%method, receivers, "notification sent"),
            Err(_) => tracing::trace!(%method, "notification dropped, no subscribers"),
        }
    }

    pub fn tools_changed(&self) {
        self.send(MCPNotification::new(TOOLS_LIST_CHANGED, None));
    }

    pub fn resources_changed(&self) {
        self.send(MCPNotification::new(RESOURCES_LIST_CHANGED, None));
    }

    pub fn progress(&self, token: &Value, progress: f64, total: Option<f64>, message: Option<String>) {
        let mut params = json!({
            "progressToken": token,
            "progress": progress,
        });
        if let Some(total) = total {
            params["total"] = json!(total);
        }
        if let Some(message) = message {
            params["message"] = json!(message);
        }
        self.send(MCPNotification::new(PROGRESS, Some(params)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.tools_changed();
        notifier.progress(&json!("tok"), 1.0, Some(5.0), Some("step".into()));

        assert_eq!(rx.recv().await.unwrap().method, TOOLS_LIST_CHANGED);
        let progress = rx.recv().await.unwrap();
        assert_eq!(progress.method, PROGRESS);
        let params = progress.params.unwrap();
        assert_eq!(params["progressToken"], "tok");
        assert_eq!(params["total"], 5.0);
        assert_eq!(params["message"], "step");
    }

    #[test]
    fn send_without_subscribers_is_silent() {
        Notifier::new().resources_changed();
    }
}
