//! Managed tools and the three leaf operations performed on them.
//!
//! # Architecture
//!
//! - [`ToolDescriptor`] - static description of one managed tool
//! - [`VersionProbe`] - "is it installed, and which version?"
//! - [`RegistryQuery`] - "what is the newest published version?"
//! - [`Installer`] - "install or update it now"
//!
//! Each leaf is a trait so the coordinator can be driven by fakes in tests.
//! The production implementations shell out to the package manager through
//! [`NpmCli`].

mod installer;
mod npm;
mod probe;
mod registry;

pub use installer::{Installer, NpmInstaller};
pub use npm::{InstallScope, NpmCli, bin_dir, default_program, modules_dir};
pub use probe::{CommandProbe, VersionProbe, normalize_version};
pub use registry::{NpmRegistry, RegistryQuery};

use serde::{Deserialize, Serialize};

/// Logical name of the lint tool.
pub const LINT_TOOL: &str = "eslint";

/// Logical name of the internal QA kit.
pub const QA_KIT: &str = "devpack-qa";

/// Static description of a managed tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Logical name, also the key of its work record.
    pub name: String,
    /// Package identifier in the registry (e.g. "@devpack/qakit").
    pub package: String,
    /// Executable invoked with a version flag to probe the install.
    pub probe_command: String,
}

impl ToolDescriptor {
    /// Create a new descriptor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        package: impl Into<String>,
        probe_command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            probe_command: probe_command.into(),
        }
    }

    /// The generic lint tool.
    #[must_use]
    pub fn lint() -> Self {
        Self::new(LINT_TOOL, "eslint", "eslint")
    }

    /// The internal QA kit.
    #[must_use]
    pub fn qa_kit() -> Self {
        Self::new(QA_KIT, "@devpack/qakit", "devpack-qa")
    }
}

impl std::fmt::Display for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.package)
    }
}

/// The tools managed by a default boot session.
#[must_use]
pub fn default_tools() -> Vec<ToolDescriptor> {
    vec![ToolDescriptor::lint(), ToolDescriptor::qa_kit()]
}
