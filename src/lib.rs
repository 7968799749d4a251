pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod server;

pub use chat::{ChatClient, ChatHistory, ChatMessage, ChatRole};
pub use config::OpenCodeConfig;
pub use error::{CompanionError, Result};
pub use events::{EventClient, EventNotice, ServerEvent};
pub use server::{ServerManager, ServerRegistry, ServerStatus};
