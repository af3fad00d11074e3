//! Error types for the devpack-core crate

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for devpack-core operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(devpack_core::config::invalid))]
    Configuration {
        /// The error message describing the configuration issue
        message: String,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(devpack_core::io::error))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable
        path: Option<Box<std::path::Path>>,
        /// Description of the operation that failed
        operation: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(devpack_core::serialization))]
    Serialization {
        /// The error message describing the serialization issue
        message: String,
    },

    /// One or more tool pipelines of a boot session failed
    #[error("devpack boot failed, as: {}", join_failures(.failures))]
    #[diagnostic(
        code(devpack_core::boot::failed),
        help("Run `devpack fix boot` to retry, or check your registry mirror settings")
    )]
    BootFailed {
        /// Every per-tool failure, in completion order
        failures: Vec<ToolError>,
    },

    /// A single tool pipeline failed outside a boot session
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tool(#[from] ToolError),

    /// A reserved command that has no implementation yet
    #[error("Command `{command}` is not implemented")]
    #[diagnostic(code(devpack_core::command::not_implemented))]
    NotImplemented {
        /// The command name as exposed to the host
        command: String,
    },

    /// A tool name that is not managed by this coordinator
    #[error("Unknown tool: {name}")]
    #[diagnostic(code(devpack_core::tool::unknown))]
    UnknownTool {
        /// The requested logical name
        name: String,
    },
}

impl Error {
    /// Create a configuration error with a message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an I/O error with context
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(|p| p.into_boxed_path()),
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a not-implemented error for a reserved command
    pub fn not_implemented(command: impl Into<String>) -> Self {
        Self::NotImplemented {
            command: command.into(),
        }
    }
}

fn join_failures(failures: &[ToolError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single tool pipeline.
///
/// Cloneable because one in-flight pipeline may be awaited by several callers.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ToolError {
    /// The installer process exited with a non-zero status
    #[error("installing {tool} failed ({}): {}", describe_status(.status), .stderr.trim())]
    #[diagnostic(code(devpack_core::install::failed))]
    InstallFailed {
        /// Logical tool name
        tool: String,
        /// Exit code, `None` when terminated by a signal
        status: Option<i32>,
        /// Captured standard error of the installer
        stderr: String,
    },

    /// The installer process could not be started
    #[error("could not launch installer for {tool}: {message}")]
    #[diagnostic(code(devpack_core::install::launch))]
    Launch {
        /// Logical tool name
        tool: String,
        /// The spawn error
        message: String,
    },

    /// Teardown terminated the install before it finished
    #[error("installing {tool} was interrupted")]
    #[diagnostic(code(devpack_core::install::interrupted))]
    Interrupted {
        /// Logical tool name
        tool: String,
    },
}

impl ToolError {
    /// The logical name of the tool this failure belongs to.
    #[must_use]
    pub fn tool(&self) -> &str {
        match self {
            Self::InstallFailed { tool, .. }
            | Self::Launch { tool, .. }
            | Self::Interrupted { tool } => tool,
        }
    }

    /// Whether this failure is a deliberate teardown rather than an error.
    #[must_use]
    pub const fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

#[allow(clippy::ref_option)]
fn describe_status(status: &Option<i32>) -> String {
    status.map_or_else(
        || "terminated by signal".to_string(),
        |code| format!("exit code {code}"),
    )
}

/// Result type for devpack-core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_failed_joins_messages() {
        let error = Error::BootFailed {
            failures: vec![
                ToolError::InstallFailed {
                    tool: "eslint".to_string(),
                    status: Some(1),
                    stderr: "EACCES\n".to_string(),
                },
                ToolError::Launch {
                    tool: "devpack-qa".to_string(),
                    message: "No such file or directory".to_string(),
                },
            ],
        };

        assert_eq!(
            error.to_string(),
            "devpack boot failed, as: installing eslint failed (exit code 1): EACCES; \
             could not launch installer for devpack-qa: No such file or directory"
        );
    }

    #[test]
    fn test_install_failed_without_exit_code() {
        let error = ToolError::InstallFailed {
            tool: "eslint".to_string(),
            status: None,
            stderr: String::new(),
        };
        assert!(error.to_string().contains("terminated by signal"));
        assert_eq!(error.tool(), "eslint");
        assert!(!error.is_interrupt());
    }

    #[test]
    fn test_not_implemented() {
        let error = Error::not_implemented("fix-qakit");
        assert_eq!(error.to_string(), "Command `fix-qakit` is not implemented");
    }

    #[test]
    fn test_interrupted_is_interrupt() {
        let error = ToolError::Interrupted {
            tool: "devpack-qa".to_string(),
        };
        assert!(error.is_interrupt());
        assert_eq!(error.tool(), "devpack-qa");
    }
}
