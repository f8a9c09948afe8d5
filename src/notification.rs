//! Notifications
//!
//! Ledger events are handed to a [`Notifier`] after the unit of work that
//! produced them has committed. Delivery runs on its own task; a failed or
//! slow notifier is logged and never touches the committed mutation.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{LedgerEvent, OperationContext};

/// Notification delivery errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outbound channel for ledger events (email, push, message bus)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError>;
}

/// Writes every event to the log
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(event_type = event.event_type(), payload = %payload, "Ledger event");
        Ok(())
    }
}

/// Fire-and-forget front of a [`Notifier`]
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn logging() -> Self {
        Self::new(Arc::new(LoggingNotifier))
    }

    /// Deliver `event` in the background. Must be called from within a
    /// Tokio runtime.
    pub fn publish(&self, event: LedgerEvent, context: &OperationContext) {
        let notifier = self.notifier.clone();
        let correlation_id = context.correlation_id;

        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                tracing::warn!(
                    event_type = event.event_type(),
                    correlation_id = ?correlation_id,
                    error = %e,
                    "Notification failed; ledger state unaffected"
                );
            }
        });
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::logging()
    }
}
