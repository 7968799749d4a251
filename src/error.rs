use thiserror::Error;

/// Errors surfaced by the companion core.
#[derive(Error, Debug)]
pub enum CompanionError {
    #[error("OpenCode executable not found. Make sure 'opencode' is installed and available in PATH")]
    ExecutableNotFound,

    #[error("Failed to spawn OpenCode server: {0}")]
    Spawn(String),

    #[error("OpenCode server did not become ready within {0} seconds")]
    ReadinessTimeout(u64),

    #[error("OpenCode server is unavailable: {0}")]
    ServerUnavailable(String),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response from OpenCode server (HTTP {status}): {body}")]
    Protocol { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode server response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CompanionError>;

/// String conversion for embedders that surface errors as plain text.
impl From<CompanionError> for String {
    fn from(err: CompanionError) -> String {
        err.to_string()
    }
}
