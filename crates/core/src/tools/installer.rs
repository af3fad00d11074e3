//! Install task runner: one external install process per call.

use super::ToolDescriptor;
use super::npm::NpmCli;
use crate::error::ToolError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs or updates one tool.
///
/// Cancelling `cancel` must terminate the external process and resolve to
/// [`ToolError::Interrupted`].
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install `tool`, resolving once the external process has exited.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InstallFailed`] on a non-zero exit,
    /// [`ToolError::Launch`] if the process cannot be started, and
    /// [`ToolError::Interrupted`] when cancelled.
    async fn install(&self, tool: &ToolDescriptor, cancel: CancellationToken) -> Result<(), ToolError>;
}

/// Installs through `npm install --global <package>@latest --force`.
#[derive(Debug, Clone)]
pub struct NpmInstaller {
    npm: NpmCli,
    grace: Duration,
}

impl NpmInstaller {
    /// Create an installer using the given npm settings.
    #[must_use]
    pub fn new(npm: NpmCli) -> Self {
        Self {
            npm,
            grace: Duration::from_secs(2),
        }
    }

    /// How long a terminated installer may take to exit before it is killed.
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

#[async_trait]
impl Installer for NpmInstaller {
    async fn install(&self, tool: &ToolDescriptor, cancel: CancellationToken) -> Result<(), ToolError> {
        let args = self.npm.install_args(&tool.package);
        let mut cmd = self.npm.command();
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so teardown reaches npm's node children too.
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| ToolError::Launch {
            tool: tool.name.clone(),
            message: e.to_string(),
        })?;
        let pid = child.id();
        info!(tool = %tool.name, package = %tool.package, ?pid, "Installing tool");
        debug!(tool = %tool.name, program = %self.npm.program().display(), ?args, "Installer command");

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            () = cancel.cancelled() => None,
        };

        let Some(status) = waited else {
            terminate(&mut child, pid, self.grace).await;
            info!(tool = %tool.name, ?pid, "Install interrupted");
            return Err(ToolError::Interrupted {
                tool: tool.name.clone(),
            });
        };

        let status = status.map_err(|e| ToolError::Launch {
            tool: tool.name.clone(),
            message: format!("failed to wait for installer: {e}"),
        })?;

        let stderr = match stderr_reader {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        let elapsed_ms = start.elapsed().as_millis();

        if status.success() {
            info!(tool = %tool.name, elapsed_ms, "Tool installed");
            Ok(())
        } else {
            warn!(tool = %tool.name, code = ?status.code(), elapsed_ms, "Install failed");
            Err(ToolError::InstallFailed {
                tool: tool.name.clone(),
                status: status.code(),
                stderr,
            })
        }
    }
}

/// Ask the installer's process group to stop, then force-kill after `grace`.
async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            send_group_signal(pid, libc::SIGTERM);
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                debug!(pid, "Installer exited after SIGTERM");
                return;
            }
            warn!(pid, "Force killing installer after grace period");
            send_group_signal(pid, libc::SIGKILL);
        }
    }

    #[cfg(not(unix))]
    let _ = (pid, grace);

    if let Err(e) = child.kill().await {
        debug!(error = %e, "Installer already gone");
    }
}

#[cfg(unix)]
fn send_group_signal(pid: u32, signal: libc::c_int) {
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: negative pid addresses the process group created for this child
    // via `process_group(0)`; the signals used only request or force exit.
    #[expect(unsafe_code, reason = "Required for POSIX signal handling")]
    unsafe {
        libc::kill(-pid, signal);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn fake_npm(dir: &Path, body: &str) -> PathBuf {
        let script = dir.join("npm");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[tokio::test]
    async fn test_successful_install() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("args");
        let script = fake_npm(dir.path(), &format!("echo \"$@\" > {}", marker.display()));

        let installer = NpmInstaller::new(NpmCli::new(&script));
        installer
            .install(&ToolDescriptor::lint(), CancellationToken::new())
            .await
            .unwrap();

        let args = std::fs::read_to_string(marker).unwrap();
        assert_eq!(args.trim(), "install --global eslint@latest --force");
    }

    #[tokio::test]
    async fn test_failed_install_captures_stderr() {
        let dir = TempDir::new().unwrap();
        let script = fake_npm(dir.path(), "echo 'npm ERR! code E404' >&2\nexit 3");

        let installer = NpmInstaller::new(NpmCli::new(&script));
        let err = installer
            .install(&ToolDescriptor::qa_kit(), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ToolError::InstallFailed { tool, status, stderr } => {
                assert_eq!(tool, "devpack-qa");
                assert_eq!(status, Some(3));
                assert!(stderr.contains("E404"));
            }
            other => panic!("Expected InstallFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let installer = NpmInstaller::new(NpmCli::new("/definitely/not/npm"));
        let err = installer
            .install(&ToolDescriptor::lint(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_cancel_terminates_process() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = fake_npm(
            dir.path(),
            &format!("echo $$ > {}\nexec sleep 30", pid_file.display()),
        );

        let installer = NpmInstaller::new(NpmCli::new(&script))
            .with_grace_period(Duration::from_millis(500));
        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { installer.install(&ToolDescriptor::lint(), cancel).await })
        };

        // Wait for the script to report its pid.
        let mut pid = None;
        for _ in 0..100 {
            if let Ok(contents) = std::fs::read_to_string(&pid_file) {
                if let Ok(parsed) = contents.trim().parse::<i32>() {
                    pid = Some(parsed);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let pid = pid.expect("installer never started");

        let started = Instant::now();
        cancel.cancel();
        let result = task.await.unwrap();

        assert!(matches!(result, Err(ToolError::Interrupted { .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
        // SAFETY: signal 0 only checks for existence.
        #[allow(unsafe_code)]
        let alive = unsafe { libc::kill(pid, 0) == 0 };
        assert!(!alive, "installer process {pid} still running");
    }
}
