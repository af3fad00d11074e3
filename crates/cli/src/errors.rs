//! CLI error type and exit codes

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Process exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    Failure,
    Usage,
    Interrupted,
}

impl Exit {
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Usage => 2,
            Self::Interrupted => 130,
        }
    }
}

/// CLI-specific error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] devpack_core::Error),

    #[error("Cannot open {}: {source}", path.display())]
    #[diagnostic(
        code(devpack::cli::invalid_path),
        help("Pass existing files or directories")
    )]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render output: {message}")]
    #[diagnostic(code(devpack::cli::output))]
    Output { message: String },
}

impl CliError {
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Exit status for this error.
    pub const fn exit(&self) -> Exit {
        match self {
            Self::Core(devpack_core::Error::NotImplemented { .. }) | Self::InvalidPath { .. } => {
                Exit::Usage
            }
            _ => Exit::Failure,
        }
    }
}
