//! Core provisioning engine for devpack
//!
//! This crate keeps two command-line tools (a lint tool and the internal QA
//! kit) installed and up to date:
//! - [`tools`]: tool descriptors plus the version probe, registry query and
//!   install runner leaves
//! - [`provision`]: the [`Coordinator`] state machine that deduplicates
//!   requests, decides install-vs-skip and aggregates a boot session
//! - [`report`]: the progress/outcome callback boundary
//! - [`state`]: the persisted last-check timestamp behind the cool-down
//! - [`config`]: environment-driven settings
//!
//! # Example
//!
//! ```no_run
//! use devpack_core::{Coordinator, LoggingReporter, ProvisionConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> devpack_core::Result<()> {
//! let config = ProvisionConfig::from_env()?;
//! let coordinator = Coordinator::from_config(&config, Arc::new(LoggingReporter))?;
//! coordinator.ensure_provisioned(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod provision;
pub mod report;
pub mod state;
pub mod tools;

pub use config::ProvisionConfig;
pub use error::{Error, Result, ToolError};
pub use provision::{
    BootReport, Coordinator, CoordinatorBuilder, Plan, SessionOutcome, ToolAction, ToolOutcome,
    ToolStatus,
};
pub use report::{LoggingReporter, NoopReporter, Reporter};
pub use state::{CheckStore, FileCheckStore, MemoryCheckStore};
pub use tools::{ToolDescriptor, default_tools};
