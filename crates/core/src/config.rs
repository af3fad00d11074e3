//! Provisioning configuration.
//!
//! Defaults are overridden by environment variables, which the CLI may
//! override again with flags.
//!
//! # Environment Variables
//!
//! - `DEVPACK_NPM`: package-manager program - default: `npm` (`npm.cmd` on Windows)
//! - `DEVPACK_REGISTRY`: registry mirror passed as `--registry` - default: npm's own
//! - `DEVPACK_INSTALL_PREFIX`: scoped install directory - default: global prefix
//! - `DEVPACK_STATE_DIR`: where the last-check timestamp lives - default: `~/.devpack/state`
//! - `DEVPACK_COOLDOWN_SECS`: cool-down window, `0` disables - default: `3600`
//! - `DEVPACK_PROBE_TIMEOUT_SECS`: version probe timeout - default: `10`
//! - `DEVPACK_QUERY_TIMEOUT_SECS`: registry query timeout - default: `30`

use crate::tools::{InstallScope, NpmCli, default_program};
use crate::{Error, Result};
use std::env;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_COOLDOWN_SECS: u64 = 60 * 60;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Settings shared by the prober, registry query and installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// The npm executable.
    pub npm_program: PathBuf,
    /// Registry mirror URL, if any.
    pub registry: Option<String>,
    /// Global or scoped installation.
    pub install_scope: InstallScope,
    /// Directory of the persisted last-check store; `None` uses the default.
    pub state_dir: Option<PathBuf>,
    /// Skip non-forced boots younger than this; `None` never skips.
    pub cooldown: Option<Duration>,
    /// Timeout for version probes and prefix lookups.
    pub probe_timeout: Duration,
    /// Timeout for registry queries.
    pub query_timeout: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            npm_program: PathBuf::from(default_program()),
            registry: None,
            install_scope: InstallScope::Global,
            state_dir: None,
            cooldown: Some(Duration::from_secs(DEFAULT_COOLDOWN_SECS)),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

impl ProvisionConfig {
    /// Load defaults overridden by `DEVPACK_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(program) = non_empty_var("DEVPACK_NPM") {
            config.npm_program = PathBuf::from(program);
        }
        config.registry = non_empty_var("DEVPACK_REGISTRY");
        if let Some(prefix) = non_empty_var("DEVPACK_INSTALL_PREFIX") {
            config.install_scope = InstallScope::Scoped(PathBuf::from(prefix));
        }
        config.state_dir = non_empty_var("DEVPACK_STATE_DIR").map(PathBuf::from);

        if let Some(secs) = parse_secs("DEVPACK_COOLDOWN_SECS")? {
            config.cooldown = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = parse_secs("DEVPACK_PROBE_TIMEOUT_SECS")? {
            config.probe_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs("DEVPACK_QUERY_TIMEOUT_SECS")? {
            config.query_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// The npm wrapper described by this configuration.
    #[must_use]
    pub fn npm(&self) -> NpmCli {
        NpmCli::new(&self.npm_program)
            .with_registry(self.registry.clone())
            .with_scope(self.install_scope.clone())
            .with_lookup_timeout(self.probe_timeout)
    }

    /// Resolve the state directory, falling back to `~/.devpack/state`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no home directory is known.
    pub fn resolved_state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::state::FileCheckStore::default_state_dir(),
        }
    }

    /// Install directory for the QA kit of one organization workspace.
    ///
    /// Lives under `<state_dir>/workspaces/`, keyed by a hash of `root` so
    /// every repository gets its own prefix.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the state directory cannot be
    /// resolved.
    pub fn workspace_prefix(&self, root: &Path) -> Result<PathBuf> {
        Ok(self
            .resolved_state_dir()?
            .join("workspaces")
            .join(workspace_key(root)))
    }

    /// This configuration with installs scoped to `root`'s workspace prefix.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the state directory cannot be
    /// resolved.
    pub fn for_workspace(&self, root: &Path) -> Result<Self> {
        Ok(Self {
            install_scope: InstallScope::Scoped(self.workspace_prefix(root)?),
            cooldown: None,
            ..self.clone()
        })
    }
}

fn workspace_key(root: &Path) -> String {
    let digest = Sha256::digest(root.to_string_lossy().as_bytes());
    hex::encode(&digest[..8])
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_secs(name: &str) -> Result<Option<u64>> {
    non_empty_var(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| {
                Error::configuration(format!("{name} must be a whole number of seconds: {e}"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 7] = [
        "DEVPACK_NPM",
        "DEVPACK_REGISTRY",
        "DEVPACK_INSTALL_PREFIX",
        "DEVPACK_STATE_DIR",
        "DEVPACK_COOLDOWN_SECS",
        "DEVPACK_PROBE_TIMEOUT_SECS",
        "DEVPACK_QUERY_TIMEOUT_SECS",
    ];

    fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
        VARS.iter().map(|v| (*v, None)).collect()
    }

    #[test]
    fn test_defaults_without_env() {
        temp_env::with_vars(cleared(), || {
            let config = ProvisionConfig::from_env().unwrap();
            assert_eq!(config, ProvisionConfig::default());
            assert_eq!(config.cooldown, Some(Duration::from_secs(3600)));
        });
    }

    #[test]
    fn test_env_overrides() {
        let mut vars = cleared();
        vars.extend([
            ("DEVPACK_NPM", Some("/opt/node/bin/npm")),
            ("DEVPACK_REGISTRY", Some("https://registry.npmmirror.com")),
            ("DEVPACK_INSTALL_PREFIX", Some("/tmp/devpack-cache")),
            ("DEVPACK_COOLDOWN_SECS", Some("0")),
            ("DEVPACK_QUERY_TIMEOUT_SECS", Some("5")),
        ]);
        temp_env::with_vars(vars, || {
            let config = ProvisionConfig::from_env().unwrap();
            assert_eq!(config.npm_program, PathBuf::from("/opt/node/bin/npm"));
            assert_eq!(config.registry.as_deref(), Some("https://registry.npmmirror.com"));
            assert_eq!(
                config.install_scope,
                InstallScope::Scoped(PathBuf::from("/tmp/devpack-cache"))
            );
            assert_eq!(config.cooldown, None);
            assert_eq!(config.query_timeout, Duration::from_secs(5));
        });
    }

    #[test]
    fn test_invalid_number_is_error() {
        let mut vars = cleared();
        vars.push(("DEVPACK_COOLDOWN_SECS", Some("an hour")));
        temp_env::with_vars(vars, || {
            let err = ProvisionConfig::from_env().unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }));
            assert!(err.to_string().contains("DEVPACK_COOLDOWN_SECS"));
        });
    }

    #[test]
    fn test_explicit_state_dir() {
        let config = ProvisionConfig {
            state_dir: Some(PathBuf::from("/var/lib/devpack")),
            ..ProvisionConfig::default()
        };
        assert_eq!(
            config.resolved_state_dir().unwrap(),
            PathBuf::from("/var/lib/devpack")
        );
    }

    #[test]
    fn test_workspace_prefix_per_root() {
        let config = ProvisionConfig {
            state_dir: Some(PathBuf::from("/var/lib/devpack")),
            ..ProvisionConfig::default()
        };
        let web = config.workspace_prefix(Path::new("/src/web")).unwrap();
        let api = config.workspace_prefix(Path::new("/src/api")).unwrap();

        assert!(web.starts_with("/var/lib/devpack/workspaces"));
        assert_eq!(web.file_name().unwrap().len(), 16);
        assert_ne!(web, api);
        assert_eq!(web, config.workspace_prefix(Path::new("/src/web")).unwrap());
    }

    #[test]
    fn test_for_workspace_scopes_installs() {
        let config = ProvisionConfig {
            state_dir: Some(PathBuf::from("/var/lib/devpack")),
            registry: Some("https://registry.npmmirror.com".to_string()),
            ..ProvisionConfig::default()
        };
        let scoped = config.for_workspace(Path::new("/src/web")).unwrap();

        assert_eq!(
            scoped.install_scope,
            InstallScope::Scoped(config.workspace_prefix(Path::new("/src/web")).unwrap())
        );
        assert_eq!(scoped.registry, config.registry);
        assert_eq!(scoped.cooldown, None);
    }
}
