use crate::error::{CompanionError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Substring in the server's output that signals it has bound its port.
pub const READY_MARKER: &str = "listening on";

/// Invoked once when the process exits, on whichever task observed it.
pub type ExitHook = Box<dyn FnOnce() + Send + 'static>;

/// Spawns the server process for a manager. The trait seam exists so
/// tests can substitute a harmless process for the real binary.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    async fn spawn_server(
        &self,
        executable: &Path,
        port: u16,
        work_dir: &Path,
        exit_hook: ExitHook,
    ) -> Result<ServerProcess>;
}

pub struct OpenCodeSpawner;

#[async_trait]
impl ProcessSpawner for OpenCodeSpawner {
    async fn spawn_server(
        &self,
        executable: &Path,
        port: u16,
        work_dir: &Path,
        exit_hook: ExitHook,
    ) -> Result<ServerProcess> {
        info!(
            executable = %executable.display(),
            port,
            work_dir = %work_dir.display(),
            "starting OpenCode server process"
        );

        let mut command = Command::new(executable);
        command
            .arg("serve")
            .arg("--port")
            .arg(port.to_string())
            .arg("--hostname")
            .arg("localhost")
            .current_dir(work_dir);

        ServerProcess::spawn_command(command, exit_hook).await
    }
}

/// A supervised server process: owns exactly one child for its lifetime,
/// scans its output for the readiness marker and reports its exit.
pub struct ServerProcess {
    pid: Option<u32>,
    ready: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    exit_rx: watch::Receiver<bool>,
}

impl ServerProcess {
    pub(crate) async fn spawn_command(mut command: Command, exit_hook: ExitHook) -> Result<Self> {
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| CompanionError::Spawn(e.to_string()))?;

        let pid = child.id();
        let ready = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = watch::channel(false);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(scan_stream(stdout, ready.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scan_stream(stderr, ready.clone(), "stderr"));
        }

        // The monitor task owns the child. Its wait() returning is the
        // only place an unexpected exit becomes visible to the rest of
        // the system without waiting on the health poll.
        let monitor_ready = ready.clone();
        let monitor_exited = exited.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            match status {
                Ok(status) => warn!(code = ?status.code(), "server process exited"),
                Err(err) => warn!(error = %err, "failed to wait on server process"),
            }
            monitor_ready.store(false, Ordering::SeqCst);
            monitor_exited.store(true, Ordering::SeqCst);
            let _ = exit_tx.send(true);
            exit_hook();
        });

        debug!(pid = ?pid, "server process spawned");
        Ok(Self {
            pid,
            ready,
            exited,
            exit_rx,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }

    /// True once the readiness marker has been seen in the output.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Readiness can also be established by a successful port probe.
    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Graceful stop with bounded escalation: TERM, wait up to the grace
    /// period, then KILL. Calling this on a dead process is a no-op.
    pub async fn terminate(&self, grace: Duration) {
        if !self.is_alive() {
            debug!("terminate requested for a process that already exited");
            return;
        }

        let Some(pid) = self.pid else {
            return;
        };

        info!(pid, "terminating server process");
        let _ = Command::new("kill").arg(pid.to_string()).output().await;

        if self.wait_for_exit(grace).await {
            info!(pid, "server process terminated gracefully");
            return;
        }

        warn!(pid, "server process did not stop in time, killing");
        let _ = Command::new("kill")
            .arg("-9")
            .arg(pid.to_string())
            .output()
            .await;
        self.wait_for_exit(Duration::from_secs(1)).await;
    }

    /// Waits for the exit notification, bounded. Returns whether the
    /// process is known to have exited.
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let mut rx = self.exit_rx.clone();
        let waited = tokio::time::timeout(timeout, async {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        waited.is_ok() || !self.is_alive()
    }
}

async fn scan_stream<R>(stream: R, ready: Arc<AtomicBool>, source: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(source, line = %line, "server output");
        // Some builds log the marker to stderr, so both streams scan.
        if line.contains(READY_MARKER) && !ready.swap(true, Ordering::SeqCst) {
            info!(source, "server ready marker detected");
        }
    }
}
