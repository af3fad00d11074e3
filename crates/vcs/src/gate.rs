//! Repository gate for opportunistic, per-workspace provisioning.
//!
//! Every directory and every repository root is evaluated at most once per
//! process, and the organization check is memoized per root. The caches
//! only grow; [`RepoGate::clear`] empties them at teardown.

use crate::git::RepoInspector;
use crate::remote::OrgMatcher;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Result of evaluating one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// This directory, or its repository, was evaluated before.
    AlreadyEvaluated,
    /// Not inside a git repository (or git could not tell).
    NotARepository,
    /// A repository whose push remote is not the organization's.
    Foreign(PathBuf),
    /// A repository pushed to the organization's hosting domain.
    OrgOwned(PathBuf),
}

impl GateDecision {
    /// The repository root when the organization owns it.
    #[must_use]
    pub fn org_root(&self) -> Option<&Path> {
        match self {
            Self::OrgOwned(root) => Some(root),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct DetectionCache {
    scanned_dirs: HashSet<PathBuf>,
    scanned_roots: HashSet<PathBuf>,
    org_owned: HashMap<PathBuf, bool>,
}

/// Decides which opened directories warrant provisioning the QA kit.
pub struct RepoGate {
    inspector: Arc<dyn RepoInspector>,
    matcher: OrgMatcher,
    cache: Mutex<DetectionCache>,
}

impl RepoGate {
    /// Create a gate with empty caches.
    #[must_use]
    pub fn new(inspector: Arc<dyn RepoInspector>, matcher: OrgMatcher) -> Self {
        Self {
            inspector,
            matcher,
            cache: Mutex::new(DetectionCache::default()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, DetectionCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluate `dir`, consulting git only for unseen directories and roots.
    pub async fn evaluate(&self, dir: &Path) -> GateDecision {
        if !self.cache().scanned_dirs.insert(dir.to_path_buf()) {
            return GateDecision::AlreadyEvaluated;
        }

        let root = match self.inspector.repo_root(dir).await {
            Ok(Some(root)) => root,
            Ok(None) => {
                debug!(dir = %dir.display(), "Not a git repository");
                return GateDecision::NotARepository;
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Could not inspect directory");
                return GateDecision::NotARepository;
            }
        };

        if !self.cache().scanned_roots.insert(root.clone()) {
            return GateDecision::AlreadyEvaluated;
        }

        if self.is_org_owned(&root).await {
            info!(root = %root.display(), domain = %self.matcher.domain(), "Organization repository detected");
            GateDecision::OrgOwned(root)
        } else {
            GateDecision::Foreign(root)
        }
    }

    /// Whether the repository at `root` pushes to the organization.
    ///
    /// Memoized for the lifetime of the gate; remote changes are not seen.
    pub async fn is_org_owned(&self, root: &Path) -> bool {
        let cached = self.cache().org_owned.get(root).copied();
        if let Some(owned) = cached {
            return owned;
        }

        let owned = match self.inspector.push_remote_url(root).await {
            Ok(Some(url)) => {
                let owned = self.matcher.matches(&url);
                debug!(root = %root.display(), %url, owned, "Checked push remote");
                owned
            }
            Ok(None) => false,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Could not read push remote");
                false
            }
        };
        self.cache().org_owned.insert(root.to_path_buf(), owned);
        owned
    }

    /// Forget everything evaluated so far.
    pub fn clear(&self) {
        *self.cache() = DetectionCache::default();
    }
}

impl std::fmt::Debug for RepoGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoGate")
            .field("matcher", &self.matcher)
            .field("cache", &*self.cache())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every directory under `/work/<name>` is a repository rooted there.
    struct FakeInspector {
        remotes: HashMap<PathBuf, String>,
        root_calls: AtomicUsize,
        remote_calls: AtomicUsize,
    }

    impl FakeInspector {
        fn new(remotes: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                remotes: remotes
                    .iter()
                    .map(|(root, url)| (PathBuf::from(root), (*url).to_string()))
                    .collect(),
                root_calls: AtomicUsize::new(0),
                remote_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RepoInspector for FakeInspector {
        async fn repo_root(&self, dir: &Path) -> Result<Option<PathBuf>> {
            self.root_calls.fetch_add(1, Ordering::SeqCst);
            let root: PathBuf = dir.components().take(3).collect();
            Ok(root.starts_with("/work").then_some(root))
        }

        async fn push_remote_url(&self, root: &Path) -> Result<Option<String>> {
            self.remote_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.remotes.get(root).cloned())
        }
    }

    fn gate(inspector: &Arc<FakeInspector>) -> RepoGate {
        RepoGate::new(inspector.clone(), OrgMatcher::new("git.devpack.dev"))
    }

    #[tokio::test]
    async fn test_org_repository_detected_once() {
        let inspector = FakeInspector::new(&[("/work/app", "git@git.devpack.dev:web/app.git")]);
        let gate = gate(&inspector);

        assert_eq!(
            gate.evaluate(Path::new("/work/app/src")).await,
            GateDecision::OrgOwned(PathBuf::from("/work/app"))
        );
        assert_eq!(
            gate.evaluate(Path::new("/work/app/src")).await,
            GateDecision::AlreadyEvaluated
        );
        // A sibling directory resolves the root again but the root is cached.
        assert_eq!(
            gate.evaluate(Path::new("/work/app/docs")).await,
            GateDecision::AlreadyEvaluated
        );
        assert_eq!(inspector.root_calls.load(Ordering::SeqCst), 2);
        assert_eq!(inspector.remote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_foreign_and_plain_directories() {
        let inspector = FakeInspector::new(&[("/work/oss", "https://github.com/rust-lang/rust")]);
        let gate = gate(&inspector);

        assert_eq!(
            gate.evaluate(Path::new("/work/oss/src")).await,
            GateDecision::Foreign(PathBuf::from("/work/oss"))
        );
        assert_eq!(
            gate.evaluate(Path::new("/tmp/scratch")).await,
            GateDecision::NotARepository
        );
        // No remote at all is not organization-owned.
        assert!(!gate.is_org_owned(Path::new("/work/no-remote")).await);
    }

    #[tokio::test]
    async fn test_org_check_memoized() {
        let inspector = FakeInspector::new(&[("/work/app", "git@git.devpack.dev:web/app.git")]);
        let gate = gate(&inspector);

        for _ in 0..3 {
            assert!(gate.is_org_owned(Path::new("/work/app")).await);
        }
        assert_eq!(inspector.remote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_forgets_everything() {
        let inspector = FakeInspector::new(&[("/work/app", "git@git.devpack.dev:web/app.git")]);
        let gate = gate(&inspector);

        assert!(gate.evaluate(Path::new("/work/app")).await.org_root().is_some());
        gate.clear();
        assert!(gate.evaluate(Path::new("/work/app")).await.org_root().is_some());
        assert_eq!(inspector.remote_calls.load(Ordering::SeqCst), 2);
    }
}
