//! Outbound custody events.
//!
//! The decryption subsystem listens for [`CustodyEvent::AccessAuthorized`];
//! the stake subsystem listens for [`CustodyEvent::DisputeResolved`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::dispute::{DisputeStatus, StakeDisposition};
use crate::recovery::RecoveryFailure;
use crate::types::Identity;

/// Buffered events per subscriber before lagging.
const EVENT_CAPACITY: usize = 256;

/// Event emitted on a custody state transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustodyEvent {
    /// Threshold reached; the requester may decrypt the record
    AccessAuthorized {
        request_id: String,
        target_record_id: String,
        requester: Identity,
        approvals: usize,
        authorized_at: DateTime<Utc>,
    },
    /// Request refused by an authority
    AccessRejected {
        request_id: String,
        rejected_by: Identity,
        reason: String,
    },
    /// Request timed out
    AccessExpired { request_id: String },
    /// Dispute reached its final disposition
    DisputeResolved {
        dispute_id: String,
        request_id: String,
        status: DisputeStatus,
        disposition: StakeDisposition,
        stake_at_risk: u64,
    },
    /// Quorum reconstructed an interrupted session
    RecoveryCompleted {
        session_id: String,
        original_request_id: String,
    },
    /// Recovery session failed
    RecoveryFailed {
        session_id: String,
        original_request_id: String,
        reason: RecoveryFailure,
    },
}

/// Broadcast channel shared by the coordinators.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CustodyEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CustodyEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: CustodyEvent) {
        if self.sender.send(event).is_err() {
            debug!("Custody event published with no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(CustodyEvent::AccessExpired {
            request_id: "req-1".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            CustodyEvent::AccessExpired {
                request_id: "req-1".to_string()
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(CustodyEvent::AccessExpired {
            request_id: "req-1".to_string(),
        });
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CustodyEvent::RecoveryCompleted {
            session_id: "s-1".to_string(),
            original_request_id: "req-1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "recovery_completed");
        assert_eq!(json["session_id"], "s-1");
    }
}
