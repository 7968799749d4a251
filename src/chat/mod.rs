pub mod client;
pub mod history;
pub mod types;

pub use client::ChatClient;
pub use history::ChatHistory;
pub use types::{
    ChatMessage, ChatRole, MessageEnvelope, MessageRequest, ModelSelection, SessionInfo,
};
