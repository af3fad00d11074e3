//! Error types for the devpack-vcs crate

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while asking git about a directory
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// git could not be started
    #[error("Failed to run git in {}: {source}", dir.display())]
    #[diagnostic(
        code(devpack_vcs::git::launch),
        help("Make sure git is installed and on PATH")
    )]
    Launch {
        /// Working directory of the attempted command
        dir: PathBuf,
        /// The spawn error
        #[source]
        source: std::io::Error,
    },

    /// git produced output that is not valid UTF-8
    #[error("git printed non UTF-8 output for {}", dir.display())]
    #[diagnostic(code(devpack_vcs::git::encoding))]
    Encoding {
        /// Working directory of the command
        dir: PathBuf,
    },
}

/// Result type for devpack-vcs operations
pub type Result<T> = std::result::Result<T, Error>;
