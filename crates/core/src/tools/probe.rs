//! Installed-version detection.

use super::ToolDescriptor;
use super::npm::{NpmCli, modules_dir};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Determines whether a tool is installed and, if so, its version.
///
/// Implementations never fail: a missing tool and a broken install both
/// answer `None`, which the coordinator treats as "needs install".
#[async_trait]
pub trait VersionProbe: Send + Sync {
    /// The installed version of `tool`, or `None` if absent or not runnable.
    async fn probe(&self, tool: &ToolDescriptor) -> Option<String>;
}

/// Probes by running `<tool> -v`, falling back to the package manifest in
/// the installation prefix.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    npm: NpmCli,
    timeout: Duration,
}

impl CommandProbe {
    /// Create a probe sharing the npm settings used for installs.
    #[must_use]
    pub fn new(npm: NpmCli) -> Self {
        Self {
            npm,
            timeout: Duration::from_secs(10),
        }
    }

    /// Bound how long a single version command may run.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_version_flag(&self, tool: &ToolDescriptor) -> Option<String> {
        let mut cmd = Command::new(launcher_name(&tool.probe_command, cfg!(windows)));
        cmd.arg("-v")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(path) = self.npm.search_path() {
            cmd.env("PATH", path);
        }

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                normalize_version(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(Ok(output)) => {
                debug!(tool = %tool.name, status = ?output.status.code(), "Version command failed");
                None
            }
            Ok(Err(e)) => {
                debug!(tool = %tool.name, error = %e, "Version command could not be launched");
                None
            }
            Err(_) => {
                debug!(tool = %tool.name, timeout_ms = self.timeout.as_millis(), "Version command timed out");
                None
            }
        }
    }

    async fn read_installed_manifest(&self, tool: &ToolDescriptor) -> Option<String> {
        let prefix = self.npm.prefix().await?;
        let manifest = modules_dir(&prefix).join(&tool.package).join("package.json");
        let contents = tokio::fs::read_to_string(&manifest).await.ok()?;
        let json: serde_json::Value = serde_json::from_str(&contents).ok()?;
        let version = json.get("version")?.as_str()?;
        debug!(tool = %tool.name, manifest = %manifest.display(), version, "Found installed package manifest");
        normalize_version(version)
    }
}

#[async_trait]
impl VersionProbe for CommandProbe {
    async fn probe(&self, tool: &ToolDescriptor) -> Option<String> {
        if let Some(version) = self.run_version_flag(tool).await {
            return Some(version);
        }
        self.read_installed_manifest(tool).await
    }
}

/// npm installs Windows shims as `<name>.cmd`, which `CreateProcess` does
/// not find from the bare name.
fn launcher_name(command: &str, windows: bool) -> String {
    if windows && Path::new(command).extension().is_none() {
        format!("{command}.cmd")
    } else {
        command.to_string()
    }
}

/// Extract a comparable version from a version command's output.
///
/// Takes the first non-empty line, keeps its last word and strips a
/// leading `v`, so `"v8.57.0\n"` and `"eslint 8.57.0"` both yield `8.57.0`.
#[must_use]
pub fn normalize_version(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let word = line.split_whitespace().last()?;
    let version = word.strip_prefix('v').unwrap_or(word);
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}
