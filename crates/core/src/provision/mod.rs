//! Provisioning state machine.
//!
//! Per tool: `Idle -> Probing -> (UpToDate | Installing) -> Idle`.
//! Per session: `Idle -> InProgress -> Idle`.
//!
//! The [`Coordinator`] owns the per-tool work records and the session flag.
//! Concurrent requests for the same tool attach to one shared pipeline, so
//! at most one install process per tool is ever in flight.

mod coordinator;
mod session;
mod work;

pub use coordinator::{Coordinator, CoordinatorBuilder, ToolStatus};

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// What a pipeline decided after probing and querying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Plan {
    /// Installed and not known to be stale.
    Keep {
        /// The installed version
        version: String,
    },
    /// Not installed, or not runnable.
    Install,
    /// Installed but older than the registry's latest.
    Update {
        /// The installed version
        from: String,
        /// The registry's latest version
        to: String,
    },
}

impl Plan {
    /// Whether this plan launches the installer.
    #[must_use]
    pub const fn needs_install(&self) -> bool {
        !matches!(self, Self::Keep { .. })
    }
}

/// Decide the plan for one tool.
///
/// An absent probe always installs. A missing `latest` means staleness is
/// unknown, so an installed tool is kept rather than forcibly reinstalled.
#[must_use]
pub fn plan(installed: Option<&str>, latest: Option<&str>) -> Plan {
    match (installed, latest) {
        (None, _) => Plan::Install,
        (Some(current), Some(latest)) if current != latest => Plan::Update {
            from: current.to_string(),
            to: latest.to_string(),
        },
        (Some(current), _) => Plan::Keep {
            version: current.to_string(),
        },
    }
}

/// What a settled pipeline did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToolAction {
    /// Nothing to do.
    UpToDate {
        /// The installed version
        version: String,
    },
    /// Freshly installed.
    Installed,
    /// Reinstalled at the latest version.
    Updated {
        /// Version before the update
        from: String,
        /// Version the registry reported as latest
        to: String,
    },
}

/// Result of one successful tool pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    /// Logical tool name
    pub name: String,
    /// What the pipeline did
    #[serde(flatten)]
    pub action: ToolAction,
}

impl ToolOutcome {
    /// Whether the installer ran for this tool.
    #[must_use]
    pub const fn installed(&self) -> bool {
        !matches!(self.action, ToolAction::UpToDate { .. })
    }
}

impl fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            ToolAction::UpToDate { version } => write!(f, "{} {version} is up to date", self.name),
            ToolAction::Installed => write!(f, "installed {}", self.name),
            ToolAction::Updated { from, to } => write!(f, "updated {} {from} -> {to}", self.name),
        }
    }
}

/// Aggregate of a successful boot session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootReport {
    /// Per-tool outcomes in completion order
    pub outcomes: Vec<ToolOutcome>,
    /// Wall time of the session
    pub elapsed: Duration,
}

impl BootReport {
    /// Number of tools the installer ran for.
    #[must_use]
    pub fn installed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.installed()).count()
    }
}

/// How a call to [`Coordinator::ensure_provisioned`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every pipeline settled successfully.
    Completed(BootReport),
    /// Another session was in progress; nothing was queued.
    AlreadyRunning,
    /// The last successful check is inside the cool-down window.
    CooledDown {
        /// When the last successful check happened
        last_check: chrono::DateTime<chrono::Utc>,
    },
    /// Teardown interrupted the session.
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plan_cases() {
        assert_eq!(plan(None, Some("9.0.0")), Plan::Install);
        assert_eq!(plan(None, None), Plan::Install);
        assert_eq!(
            plan(Some("8.57.0"), Some("9.0.0")),
            Plan::Update {
                from: "8.57.0".to_string(),
                to: "9.0.0".to_string()
            }
        );
        assert_eq!(
            plan(Some("9.0.0"), Some("9.0.0")),
            Plan::Keep {
                version: "9.0.0".to_string()
            }
        );
        assert_eq!(
            plan(Some("9.0.0"), None),
            Plan::Keep {
                version: "9.0.0".to_string()
            }
        );
    }

    #[test]
    fn test_outcome_display() {
        let outcome = ToolOutcome {
            name: "eslint".to_string(),
            action: ToolAction::Updated {
                from: "8.0.0".to_string(),
                to: "9.1.0".to_string(),
            },
        };
        assert_eq!(outcome.to_string(), "updated eslint 8.0.0 -> 9.1.0");
        assert!(outcome.installed());
    }

    #[test]
    fn test_installed_count() {
        let report = BootReport {
            outcomes: vec![
                ToolOutcome {
                    name: "eslint".to_string(),
                    action: ToolAction::Installed,
                },
                ToolOutcome {
                    name: "devpack-qa".to_string(),
                    action: ToolAction::UpToDate {
                        version: "1.2.0".to_string(),
                    },
                },
            ],
            elapsed: Duration::from_millis(10),
        };
        assert_eq!(report.installed_count(), 1);
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let outcome = ToolOutcome {
            name: "devpack-qa".to_string(),
            action: ToolAction::UpToDate {
                version: "1.2.0".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["name"], "devpack-qa");
        assert_eq!(json["action"], "up_to_date");
        assert_eq!(json["version"], "1.2.0");
    }

    proptest! {
        #[test]
        fn plan_installs_only_when_absent_or_stale(
            installed in proptest::option::of("[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}"),
            latest in proptest::option::of("[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}"),
        ) {
            let decided = plan(installed.as_deref(), latest.as_deref());
            let stale = matches!((&installed, &latest), (Some(i), Some(l)) if i != l);
            prop_assert_eq!(decided.needs_install(), installed.is_none() || stale);
        }
    }
}
