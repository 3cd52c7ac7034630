//! Store connection events.

use serde::{Deserialize, Serialize};

/// A change observed on a store connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    /// The connection was lost or could not be established.
    ConnectionFailed {
        /// Store endpoint.
        endpoint: String,
        /// Failure category reported by the transport.
        failure: String,
    },
    /// A previously failed connection is usable again.
    ConnectionRestored {
        /// Store endpoint.
        endpoint: String,
    },
    /// A cluster hash slot moved to another node.
    HashSlotMoved {
        /// The slot that moved, when known.
        slot: Option<u16>,
        /// Node that served the slot before.
        old_endpoint: String,
        /// Node now serving the slot.
        new_endpoint: String,
    },
    /// The server replied with an error message.
    ErrorMessage {
        /// Store endpoint.
        endpoint: String,
        /// The server's message.
        message: String,
    },
    /// The server announced maintenance (loading, failover, ...).
    Maintenance {
        /// Notification type as reported by the server.
        notification: String,
    },
}

impl StoreEvent {
    /// Short event name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "ConnectionFailed",
            Self::ConnectionRestored { .. } => "ConnectionRestored",
            Self::HashSlotMoved { .. } => "HashSlotMoved",
            Self::ErrorMessage { .. } => "ErrorMessage",
            Self::Maintenance { .. } => "Maintenance",
        }
    }
}
