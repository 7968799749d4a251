use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

const EXECUTABLE_NAME: &str = "opencode";

/// Finds the OpenCode binary. Re-run on every server start; results are
/// never cached since the search is cheap next to process startup.
#[async_trait]
pub trait ExecutableLocator: Send + Sync {
    async fn locate(&self, project_dir: &Path) -> Option<PathBuf>;
}

/// Searches the system with a fixed strategy order: direct PATH
/// invocation, login-shell `which` (picks up version-manager PATH
/// entries), well-known install directories, then project-relative paths.
pub struct SystemLocator;

#[async_trait]
impl ExecutableLocator for SystemLocator {
    async fn locate(&self, project_dir: &Path) -> Option<PathBuf> {
        info!("searching for OpenCode executable");

        if let Some(path) = Self::check_direct().await {
            info!(path = %path.display(), "found OpenCode on PATH");
            return Some(path);
        }

        if let Some(path) = Self::check_login_shell().await {
            info!(path = %path.display(), "found OpenCode via login-shell which");
            return Some(path);
        }

        if let Some(path) = Self::check_well_known_paths() {
            info!(path = %path.display(), "found OpenCode in a well-known directory");
            return Some(path);
        }

        if let Some(path) = Self::check_project_paths(project_dir) {
            info!(path = %path.display(), "found OpenCode in the project directory");
            return Some(path);
        }

        debug!("OpenCode executable not found by any strategy");
        None
    }
}

impl SystemLocator {
    async fn check_direct() -> Option<PathBuf> {
        let status = Command::new(EXECUTABLE_NAME)
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Some(PathBuf::from(EXECUTABLE_NAME)),
            Ok(status) => {
                debug!(code = ?status.code(), "direct PATH check exited non-zero");
                None
            }
            Err(err) => {
                debug!(error = %err, "direct PATH check failed");
                None
            }
        }
    }

    async fn check_login_shell() -> Option<PathBuf> {
        // A login shell sees PATH entries injected by version managers
        // that a plain spawned process would miss.
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let output = Command::new(&shell)
            .arg("-l")
            .arg("-c")
            .arg(format!("which {}", EXECUTABLE_NAME))
            .output()
            .await;

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!(shell, code = ?output.status.code(), "login-shell which exited non-zero");
                return None;
            }
            Err(err) => {
                debug!(shell, error = %err, "login-shell which failed");
                return None;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = PathBuf::from(stdout.lines().next()?.trim());
        if is_executable(&path) {
            Some(path)
        } else {
            debug!(path = %path.display(), "which returned a non-executable path");
            None
        }
    }

    fn check_well_known_paths() -> Option<PathBuf> {
        let home = dirs::home_dir();

        let mut candidates = vec![PathBuf::from("/usr/local/bin").join(EXECUTABLE_NAME)];

        if let Some(home) = &home {
            // nvm installs one bin directory per node version.
            let nvm_versions = home.join(".nvm/versions/node");
            if let Ok(entries) = std::fs::read_dir(&nvm_versions) {
                for entry in entries.flatten() {
                    candidates.push(entry.path().join("bin").join(EXECUTABLE_NAME));
                }
            }
            candidates.push(home.join("node_modules/.bin").join(EXECUTABLE_NAME));
        }

        candidates.push(PathBuf::from("/opt/homebrew/bin").join(EXECUTABLE_NAME));

        if let Some(home) = &home {
            candidates.push(home.join(".local/bin").join(EXECUTABLE_NAME));
        }

        candidates.into_iter().find(|path| is_executable(path))
    }

    fn check_project_paths(project_dir: &Path) -> Option<PathBuf> {
        let candidates = [
            project_dir.join(EXECUTABLE_NAME),
            project_dir.join("bin").join(EXECUTABLE_NAME),
            project_dir.join("node_modules/.bin").join(EXECUTABLE_NAME),
        ];

        candidates.into_iter().find(|path| is_executable(path))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
