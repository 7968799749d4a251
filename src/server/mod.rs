pub mod locator;
pub mod manager;
pub mod port;
pub mod process;
pub mod registry;
pub mod types;

pub use locator::{ExecutableLocator, SystemLocator};
pub use manager::{ManagerTimings, ServerManager};
pub use port::{find_available_port, is_port_reachable, DEFAULT_PORT};
pub use process::{OpenCodeSpawner, ProcessSpawner, ServerProcess, READY_MARKER};
pub use registry::ServerRegistry;
pub use types::{AtomicServerStatus, ServerInfo, ServerStatus};
