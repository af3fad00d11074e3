//! Repository lookups through the git command line.

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Answers the two questions the repository gate needs.
#[async_trait]
pub trait RepoInspector: Send + Sync {
    /// Top-level directory of the git tree containing `dir`, `None` when
    /// `dir` is not inside a repository.
    async fn repo_root(&self, dir: &Path) -> Result<Option<PathBuf>>;

    /// Push URL of the `origin` remote, `None` when there is none.
    async fn push_remote_url(&self, root: &Path) -> Result<Option<String>>;
}

/// [`RepoInspector`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    /// Use `program` as the git executable.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run git in `dir`; `Ok(None)` on a non-zero exit.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<Option<String>> {
        let output = Command::new(&self.program)
            .args(["-c", "submodule.recurse=false"])
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::Launch {
                dir: dir.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            debug!(
                dir = %dir.display(),
                ?args,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git command failed"
            );
            return Ok(None);
        }

        String::from_utf8(output.stdout)
            .map(Some)
            .map_err(|_| Error::Encoding {
                dir: dir.to_path_buf(),
            })
    }
}

#[async_trait]
impl RepoInspector for GitCli {
    async fn repo_root(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(prefix) = self.run(dir, &["rev-parse", "--show-prefix"]).await? else {
            return Ok(None);
        };
        let root = determine_root(dir, &prefix);
        debug!(dir = %dir.display(), prefix = %prefix.trim(), ?root, "Resolved repository root");
        Ok(root)
    }

    async fn push_remote_url(&self, root: &Path) -> Result<Option<String>> {
        let url = self
            .run(root, &["remote", "get-url", "--push", "origin"])
            .await?
            .map(|out| out.trim().to_string())
            .filter(|url| !url.is_empty());
        Ok(url)
    }
}

/// Derive the repository root from `dir` and git's `--show-prefix` output.
///
/// The prefix is `dir` relative to the root with a trailing `/`; it is
/// empty at the root itself. Returns `None` when `dir` does not end with
/// the prefix (for example across a symlink).
#[must_use]
pub fn determine_root(dir: &Path, show_prefix: &str) -> Option<PathBuf> {
    let prefix = show_prefix.trim().trim_end_matches('/');
    if prefix.is_empty() {
        return Some(dir.to_path_buf());
    }

    let prefix = Path::new(prefix);
    if !dir.ends_with(prefix) {
        return None;
    }
    dir.ancestors()
        .nth(prefix.components().count())
        .map(Path::to_path_buf)
}
