use crate::server::manager::ServerManager;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One manager per project directory, constructed and torn down
/// explicitly by the embedder instead of looked up ambiently.
pub struct ServerRegistry {
    managers: RwLock<HashMap<PathBuf, Arc<ServerManager>>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self {
            managers: RwLock::new(HashMap::new()),
        }
    }

    fn key_for(project_dir: &Path) -> PathBuf {
        project_dir
            .canonicalize()
            .unwrap_or_else(|_| project_dir.to_path_buf())
    }

    pub async fn get_or_create(&self, project_dir: &Path) -> Arc<ServerManager> {
        let key = Self::key_for(project_dir);

        if let Some(manager) = self.managers.read().await.get(&key) {
            return manager.clone();
        }

        let mut managers = self.managers.write().await;
        // Re-check under the write lock; another caller may have won.
        if let Some(manager) = managers.get(&key) {
            return manager.clone();
        }

        debug!(project_dir = %key.display(), "creating server manager");
        let manager = Arc::new(ServerManager::new(key.clone()));
        managers.insert(key, manager.clone());
        manager
    }

    pub async fn get(&self, project_dir: &Path) -> Option<Arc<ServerManager>> {
        let key = Self::key_for(project_dir);
        self.managers.read().await.get(&key).cloned()
    }

    /// Removes the manager for a project and stops its server.
    pub async fn remove_and_shutdown(&self, project_dir: &Path) {
        let key = Self::key_for(project_dir);
        let removed = self.managers.write().await.remove(&key);
        if let Some(manager) = removed {
            info!(project_dir = %key.display(), "shutting down server manager");
            manager.shutdown().await;
        }
    }

    pub async fn shutdown_all(&self) {
        let managers: Vec<_> = self.managers.write().await.drain().collect();
        for (dir, manager) in managers {
            info!(project_dir = %dir.display(), "shutting down server manager");
            manager.shutdown().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.managers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.managers.read().await.is_empty()
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
