use crate::error::{CompanionError, Result};
use crate::server::locator::{ExecutableLocator, SystemLocator};
use crate::server::port::{find_available_port, is_port_reachable, DEFAULT_PORT};
use crate::server::process::{OpenCodeSpawner, ProcessSpawner, ServerProcess};
use crate::server::types::{AtomicServerStatus, ServerInfo, ServerStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Poll cadence and bounds for the start sequence and the health loop.
/// Defaults mirror a local developer machine; slow CI environments can
/// stretch them instead of patching constants.
#[derive(Debug, Clone)]
pub struct ManagerTimings {
    pub poll_interval: Duration,
    pub ready_poll_attempts: u32,
    pub startup_wait_attempts: u32,
    pub health_interval: Duration,
    pub stop_grace: Duration,
    pub probe_timeout: Duration,
}

impl Default for ManagerTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            ready_poll_attempts: 15,
            startup_wait_attempts: 15,
            health_interval: Duration::from_secs(10),
            stop_grace: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

struct ServerHandle {
    port: u16,
    base_url: String,
    process: ServerProcess,
    started_at: Instant,
}

/// Owns the lifecycle of one local OpenCode server: Stopped -> Starting
/// -> Running or Error, with a periodic health check while Running.
///
/// The status cell and the process readiness flag are the only state
/// shared between the start routine, the health loop and the exit hook;
/// every transition goes through compare-exchange on the status cell.
pub struct ServerManager {
    project_dir: PathBuf,
    status: Arc<AtomicServerStatus>,
    state: Arc<RwLock<Option<ServerHandle>>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    locator: Arc<dyn ExecutableLocator>,
    spawner: Arc<dyn ProcessSpawner>,
    http: reqwest::Client,
    default_port: u16,
    timings: ManagerTimings,
}

impl ServerManager {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            status: Arc::new(AtomicServerStatus::default()),
            state: Arc::new(RwLock::new(None)),
            health_task: Mutex::new(None),
            locator: Arc::new(SystemLocator),
            spawner: Arc::new(OpenCodeSpawner),
            http: reqwest::Client::new(),
            default_port: DEFAULT_PORT,
            timings: ManagerTimings::default(),
        }
    }

    pub fn with_locator(mut self, locator: Arc<dyn ExecutableLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_timings(mut self, timings: ManagerTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn status(&self) -> ServerStatus {
        self.status.load()
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub async fn base_url(&self) -> Option<String> {
        self.state.read().await.as_ref().map(|h| h.base_url.clone())
    }

    pub async fn port(&self) -> Option<u16> {
        self.state.read().await.as_ref().map(|h| h.port)
    }

    pub async fn info(&self) -> Option<ServerInfo> {
        let state = self.state.read().await;
        state.as_ref().map(|h| ServerInfo {
            port: h.port,
            base_url: h.base_url.clone(),
            status: self.status.load(),
            pid: h.process.pid(),
            ready: h.process.is_ready(),
        })
    }

    pub async fn uptime(&self) -> Option<Duration> {
        let state = self.state.read().await;
        state.as_ref().map(|h| h.started_at.elapsed())
    }

    /// Starts the managed server. Idempotent while Running; a call that
    /// observes an in-flight start waits for that start's outcome instead
    /// of spawning a second process. Returns whether the server ended up
    /// Running.
    pub async fn start(&self) -> bool {
        match self.status.load() {
            ServerStatus::Running => return true,
            ServerStatus::Starting => return self.wait_for_startup().await,
            _ => {}
        }

        let claimed = self
            .status
            .compare_exchange(ServerStatus::Stopped, ServerStatus::Starting)
            .is_ok()
            || self
                .status
                .compare_exchange(ServerStatus::Error, ServerStatus::Starting)
                .is_ok();

        if !claimed {
            // Lost the race; defer to whoever claimed the start.
            return match self.status.load() {
                ServerStatus::Running => true,
                ServerStatus::Starting => self.wait_for_startup().await,
                _ => false,
            };
        }

        info!(project_dir = %self.project_dir.display(), "starting OpenCode server");

        match self.run_start_sequence().await {
            Ok(port) => {
                if self
                    .status
                    .compare_exchange(ServerStatus::Starting, ServerStatus::Running)
                    .is_ok()
                {
                    self.spawn_health_loop().await;
                    info!(port, "OpenCode server started");
                    true
                } else {
                    // stop() raced us; tear the fresh process down again.
                    warn!("start aborted, server was stopped while starting");
                    self.teardown_process().await;
                    false
                }
            }
            Err(err) => {
                error!(error = %err, "failed to start OpenCode server");
                let _ = self
                    .status
                    .compare_exchange(ServerStatus::Starting, ServerStatus::Error);
                false
            }
        }
    }

    /// Stops the managed server. No-op when already Stopped.
    pub async fn stop(&self) {
        if self.status.load() == ServerStatus::Stopped {
            debug!("server is already stopped");
            return;
        }

        info!(status = ?self.status.load(), "stopping OpenCode server");
        self.status.store(ServerStatus::Stopped);
        self.cancel_health_loop().await;
        self.teardown_process().await;
        info!("OpenCode server stop sequence completed");
    }

    /// Stop plus final resource teardown; the manager is still usable
    /// afterwards but embedders should treat it as gone.
    pub async fn shutdown(&self) {
        debug!(project_dir = %self.project_dir.display(), "shutting down server manager");
        self.stop().await;
    }

    /// Whether a Running server is responsive. A bare HTTP failure while
    /// the process is alive and the port reachable still counts as
    /// healthy; only process death or unreachability marks it down.
    pub async fn is_healthy(&self) -> bool {
        Self::check_health(
            &self.status,
            &self.state,
            &self.http,
            self.timings.probe_timeout,
        )
        .await
    }

    async fn check_health(
        status: &AtomicServerStatus,
        state: &RwLock<Option<ServerHandle>>,
        http: &reqwest::Client,
        probe_timeout: Duration,
    ) -> bool {
        if status.load() != ServerStatus::Running {
            debug!(status = ?status.load(), "not healthy, server is not running");
            return false;
        }

        let port = {
            let state = state.read().await;
            let Some(handle) = state.as_ref() else {
                warn!("not healthy, no server handle");
                return false;
            };
            if !handle.process.is_alive() {
                warn!("not healthy, server process is not running");
                return false;
            }
            if !handle.process.is_ready() {
                debug!("server process is running but never signalled ready");
                return false;
            }
            handle.port
        };

        if !is_port_reachable(port, probe_timeout).await {
            warn!(port, "not healthy, server port is not reachable");
            return false;
        }

        let url = format!("http://127.0.0.1:{}/config", port);
        match http.get(&url).timeout(probe_timeout).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => {
                    let healthy = !body.trim().is_empty();
                    debug!(healthy, bytes = body.len(), "HTTP health check result");
                    healthy
                }
                Err(err) => {
                    debug!(error = %err, "health check body read failed, process alive, considering healthy");
                    true
                }
            },
            Err(err) => {
                // The endpoint may be momentarily busy; the process and
                // port checks above already passed.
                debug!(error = %err, "HTTP health check failed, process alive, considering healthy");
                true
            }
        }
    }

    async fn run_start_sequence(&self) -> Result<u16> {
        // Drop any leftover handle from a previous run before the port
        // probe, so a crashed-but-lingering process cannot hold the port.
        self.teardown_process().await;

        let port = find_available_port(self.default_port).await;
        let base_url = format!("http://localhost:{}", port);
        info!(port, "allocated server port");

        let executable = self
            .locator
            .locate(&self.project_dir)
            .await
            .ok_or(CompanionError::ExecutableNotFound)?;

        let status = self.status.clone();
        let exit_hook = Box::new(move || {
            if status
                .compare_exchange(ServerStatus::Running, ServerStatus::Error)
                .is_ok()
            {
                warn!("server process exited unexpectedly, marking error");
            }
        });

        let process = self
            .spawner
            .spawn_server(&executable, port, &self.project_dir, exit_hook)
            .await?;

        *self.state.write().await = Some(ServerHandle {
            port,
            base_url,
            process,
            started_at: Instant::now(),
        });

        if self.wait_for_ready(port).await {
            Ok(port)
        } else {
            self.teardown_process().await;
            let bound =
                self.timings.poll_interval.as_secs() * u64::from(self.timings.ready_poll_attempts);
            Err(CompanionError::ReadinessTimeout(bound.max(1)))
        }
    }

    /// Readiness is a race between the output-scan marker and direct port
    /// reachability; either vote is then settled with a final probe that
    /// must succeed before the server counts as ready.
    async fn wait_for_ready(&self, port: u16) -> bool {
        for attempt in 1..=self.timings.ready_poll_attempts {
            tokio::time::sleep(self.timings.poll_interval).await;

            let (alive, marker_seen) = {
                let state = self.state.read().await;
                match state.as_ref() {
                    Some(handle) => (handle.process.is_alive(), handle.process.is_ready()),
                    None => (false, false),
                }
            };

            if !alive {
                warn!("server process terminated while waiting for ready signal");
                return false;
            }

            let reachable = is_port_reachable(port, self.timings.probe_timeout).await;
            if marker_seen || reachable {
                debug!(attempt, marker_seen, reachable, "readiness vote received");
                // Give the server a moment to finish binding, then gate
                // on the port actually accepting connections.
                tokio::time::sleep(self.timings.poll_interval).await;
                if is_port_reachable(port, self.timings.probe_timeout).await {
                    if let Some(handle) = self.state.read().await.as_ref() {
                        handle.process.mark_ready();
                    }
                    return true;
                }
                warn!(attempt, "readiness signalled but port not reachable yet");
            } else {
                debug!(
                    attempt,
                    max = self.timings.ready_poll_attempts,
                    "waiting for server ready"
                );
            }
        }

        warn!("server failed to become ready within the timeout");
        false
    }

    /// A caller that observed Starting waits here for the in-flight
    /// start's terminal state instead of launching a second process.
    async fn wait_for_startup(&self) -> bool {
        for _ in 0..self.timings.startup_wait_attempts {
            match self.status.load() {
                ServerStatus::Running => return true,
                ServerStatus::Error | ServerStatus::Stopped => return false,
                ServerStatus::Starting => {
                    tokio::time::sleep(self.timings.poll_interval).await;
                }
            }
        }
        self.status.load() == ServerStatus::Running
    }

    async fn spawn_health_loop(&self) {
        let status = self.status.clone();
        let state = self.state.clone();
        let http = self.http.clone();
        let interval = self.timings.health_interval;
        let probe_timeout = self.timings.probe_timeout;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                if status.load() != ServerStatus::Running {
                    break;
                }
                if !Self::check_health(&status, &state, &http, probe_timeout).await {
                    warn!("health check failed, marking server as errored");
                    let _ = status.compare_exchange(ServerStatus::Running, ServerStatus::Error);
                    break;
                }
            }
        });

        let mut guard = self.health_task.lock().await;
        if let Some(old) = guard.replace(task) {
            old.abort();
        }
    }

    async fn cancel_health_loop(&self) {
        if let Some(task) = self.health_task.lock().await.take() {
            debug!("cancelling health check task");
            task.abort();
        }
    }

    async fn teardown_process(&self) {
        let handle = self.state.write().await.take();
        if let Some(handle) = handle {
            handle.process.terminate(self.timings.stop_grace).await;
        }
    }
}
