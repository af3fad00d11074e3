//! npm CLI command construction and installation-prefix resolution.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Where tools are installed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstallScope {
    /// The package manager's global prefix.
    #[default]
    Global,
    /// A private prefix directory (workspace cache).
    Scoped(PathBuf),
}

/// Thin wrapper around the `npm` executable.
///
/// Builds argument lists for the install, view and config commands and
/// knows where globally installed packages and binaries live.
#[derive(Debug, Clone)]
pub struct NpmCli {
    program: PathBuf,
    registry: Option<String>,
    scope: InstallScope,
    lookup_timeout: Duration,
}

impl NpmCli {
    /// Create a wrapper for the given program.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            registry: None,
            scope: InstallScope::Global,
            lookup_timeout: Duration::from_secs(10),
        }
    }

    /// Use a registry mirror for installs and queries.
    #[must_use]
    pub fn with_registry(mut self, registry: Option<String>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the install scope.
    #[must_use]
    pub fn with_scope(mut self, scope: InstallScope) -> Self {
        self.scope = scope;
        self
    }

    /// Bound the time spent on `npm config get prefix`.
    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// The npm executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The configured install scope.
    #[must_use]
    pub fn scope(&self) -> &InstallScope {
        &self.scope
    }

    /// A fresh command for the npm executable.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(path) = self.search_path() {
            cmd.env("PATH", path);
        }
        cmd
    }

    /// Arguments for a forced global install of the latest published version.
    #[must_use]
    pub fn install_args(&self, package: &str) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            "--global".to_string(),
            format!("{package}@latest"),
            "--force".to_string(),
        ];
        self.push_common_args(&mut args);
        args
    }

    /// Arguments for querying the newest published version.
    #[must_use]
    pub fn view_args(&self, package: &str) -> Vec<String> {
        let mut args = vec!["view".to_string(), package.to_string(), "version".to_string()];
        if let Some(registry) = &self.registry {
            args.push("--registry".to_string());
            args.push(registry.clone());
        }
        args
    }

    fn push_common_args(&self, args: &mut Vec<String>) {
        if let Some(registry) = &self.registry {
            args.push("--registry".to_string());
            args.push(registry.clone());
        }
        if let InstallScope::Scoped(prefix) = &self.scope {
            args.push("--prefix".to_string());
            args.push(prefix.display().to_string());
        }
    }

    /// Resolve the installation prefix.
    ///
    /// A scoped install answers immediately; otherwise `npm config get prefix`
    /// is consulted. Returns `None` when npm is missing or prints nothing.
    pub async fn prefix(&self) -> Option<PathBuf> {
        if let InstallScope::Scoped(prefix) = &self.scope {
            return Some(prefix.clone());
        }

        let mut cmd = self.command();
        cmd.args(["config", "get", "prefix"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.lookup_timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                debug!(status = ?output.status.code(), "npm config get prefix failed");
                return None;
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Failed to run npm config get prefix");
                return None;
            }
            Err(_) => {
                debug!("npm config get prefix timed out");
                return None;
            }
        };

        let prefix = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if prefix.is_empty() {
            None
        } else {
            Some(PathBuf::from(prefix))
        }
    }

    /// PATH with the scoped bin folder prepended, if the scope is private.
    #[must_use]
    pub fn search_path(&self) -> Option<OsString> {
        let InstallScope::Scoped(prefix) = &self.scope else {
            return None;
        };
        let mut paths = vec![bin_dir(prefix)];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths).ok()
    }
}

impl Default for NpmCli {
    fn default() -> Self {
        Self::new(default_program())
    }
}

/// The platform's npm executable name.
#[must_use]
pub fn default_program() -> &'static str {
    if cfg!(windows) { "npm.cmd" } else { "npm" }
}

/// Directory holding installed packages under a prefix.
#[must_use]
pub fn modules_dir(prefix: &Path) -> PathBuf {
    if cfg!(windows) {
        prefix.join("node_modules")
    } else {
        prefix.join("lib").join("node_modules")
    }
}

/// Directory holding package binaries under a prefix.
#[must_use]
pub fn bin_dir(prefix: &Path) -> PathBuf {
    if cfg!(windows) {
        prefix.to_path_buf()
    } else {
        prefix.join("bin")
    }
}
