use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event received from the server's push stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEvent {
    pub event_type: String,
    pub data: String,
    pub received_at: DateTime<Utc>,
}

impl ServerEvent {
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
            received_at: Utc::now(),
        }
    }
}

/// Derived from the client's connection flags at query time, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Reconnecting,
}

/// What subscribers receive, in stream order.
#[derive(Debug, Clone)]
pub enum EventNotice {
    Event(ServerEvent),
    ConnectionChanged(bool),
    Error(String),
}
