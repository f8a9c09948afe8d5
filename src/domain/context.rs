//! Operation Context
//!
//! Metadata about the current operation, attached to log lines and stamped
//! on the transactions it produces.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::Channel;

/// Context for an operation, used for tracing and transaction metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Teller, customer or service that initiated the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<Uuid>,

    /// Origin channel recorded on transactions
    pub channel: Channel,
}

impl OperationContext {
    /// Create a new empty context (teller channel)
    pub fn new() -> Self {
        Self {
            correlation_id: None,
            initiated_by: None,
            channel: Channel::default(),
        }
    }

    /// Context for scheduled jobs
    pub fn system() -> Self {
        Self::new().with_channel(Channel::System)
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_initiator(mut self, initiated_by: Uuid) -> Self {
        self.initiated_by = Some(initiated_by);
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let initiator = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let context = OperationContext::new()
            .with_initiator(initiator)
            .with_correlation_id(correlation_id)
            .with_channel(Channel::Atm);

        assert_eq!(context.initiated_by, Some(initiator));
        assert_eq!(context.correlation_id, Some(correlation_id));
        assert_eq!(context.channel, Channel::Atm);
    }

    #[test]
    fn test_ensure_correlation_id() {
        let mut context = OperationContext::new();
        assert!(context.correlation_id.is_none());

        let id = context.ensure_correlation_id();
        assert_eq!(context.correlation_id, Some(id));

        // Calling again should return the same ID
        assert_eq!(context.ensure_correlation_id(), id);
    }

    #[test]
    fn test_system_context_channel() {
        assert_eq!(OperationContext::system().channel, Channel::System);
    }
}
