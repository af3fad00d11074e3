//! Repository detection for devpack
//!
//! Resolves the top-level directory of a git tree and its push remote, and
//! gates per-workspace provisioning on the remote belonging to the
//! organization's hosting domain.

mod error;
pub mod gate;
pub mod git;
pub mod remote;

pub use error::{Error, Result};
pub use gate::{GateDecision, RepoGate};
pub use git::{GitCli, RepoInspector, determine_root};
pub use remote::{DEFAULT_ORG_DOMAIN, OrgMatcher, host_of};
