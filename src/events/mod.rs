pub mod client;
pub mod parser;
pub mod types;

pub use client::{EventClient, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY};
pub use parser::{SseFrame, SseParser};
pub use types::{ConnectionStatus, EventNotice, ServerEvent};
