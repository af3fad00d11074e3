//! Latest-version lookup against the package registry.

use super::npm::NpmCli;
use super::probe::normalize_version;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, warn};

/// Asks the package registry for the newest published version of a package.
///
/// `None` means the registry could not answer; callers must not read it as
/// "outdated".
#[async_trait]
pub trait RegistryQuery: Send + Sync {
    /// The latest published version of `package`, if the registry answered.
    async fn latest(&self, package: &str) -> Option<String>;
}

/// Registry lookup through `npm view <package> version`.
#[derive(Debug, Clone)]
pub struct NpmRegistry {
    npm: NpmCli,
    timeout: Duration,
}

impl NpmRegistry {
    /// Create a query sharing the npm settings (and mirror) used for installs.
    #[must_use]
    pub fn new(npm: NpmCli) -> Self {
        Self {
            npm,
            timeout: Duration::from_secs(30),
        }
    }

    /// Bound how long a registry round trip may take.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RegistryQuery for NpmRegistry {
    async fn latest(&self, package: &str) -> Option<String> {
        let mut cmd = self.npm.command();
        cmd.args(self.npm.view_args(package))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(%package, error = %e, "Failed to run registry query");
                return None;
            }
            Err(_) => {
                warn!(%package, timeout_secs = self.timeout.as_secs(), "Registry query timed out");
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(%package, stderr = %stderr.trim(), "Registry query failed");
            return None;
        }

        let latest = normalize_version(&String::from_utf8_lossy(&output.stdout));
        debug!(%package, ?latest, "Registry answered");
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_npm_is_absent() {
        let registry = NpmRegistry::new(NpmCli::new("/definitely/not/npm"));
        assert_eq!(registry.latest("eslint").await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_view_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("npm");
        // Echo the package name back so the argument order is checked too.
        std::fs::write(&script, "#!/bin/sh\n[ \"$1\" = view ] && [ \"$3\" = version ] && echo 9.9.$2\n")
            .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let registry = NpmRegistry::new(NpmCli::new(&script));
        assert_eq!(registry.latest("1").await, Some("9.9.1".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_registry_error_is_absent() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("npm");
        std::fs::write(&script, "#!/bin/sh\necho 'npm ERR! network' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let registry = NpmRegistry::new(NpmCli::new(&script));
        assert_eq!(registry.latest("eslint").await, None);
    }
}
