use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerStatus {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Error = 3,
}

impl ServerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerStatus::Stopped,
            1 => ServerStatus::Starting,
            2 => ServerStatus::Running,
            _ => ServerStatus::Error,
        }
    }
}

/// The one status cell shared by the start routine, the health-check loop
/// and the process-exit hook. All transitions go through here.
#[derive(Debug)]
pub struct AtomicServerStatus(AtomicU8);

impl AtomicServerStatus {
    pub fn new(status: ServerStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn load(&self) -> ServerStatus {
        ServerStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, status: ServerStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }

    pub fn compare_exchange(
        &self,
        current: ServerStatus,
        new: ServerStatus,
    ) -> Result<ServerStatus, ServerStatus> {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(ServerStatus::from_u8)
            .map_err(ServerStatus::from_u8)
    }
}

impl Default for AtomicServerStatus {
    fn default() -> Self {
        Self::new(ServerStatus::Stopped)
    }
}

/// Snapshot of a managed server, safe to hand to embedders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub port: u16,
    pub base_url: String,
    pub status: ServerStatus,
    pub pid: Option<u32>,
    pub ready: bool,
}
