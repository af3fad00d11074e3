//! Command dispatch for the devpack CLI

use crate::cli::{Commands, FixCommands};
use crate::errors::{CliError, Exit};
use crate::reporter::TerminalReporter;
use devpack_core::tools::QA_KIT;
use devpack_core::{Coordinator, ProvisionConfig, SessionOutcome, ToolStatus};
use devpack_vcs::{GateDecision, RepoGate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Long-lived state shared by every command in this process.
pub struct App {
    pub config: ProvisionConfig,
    pub coordinator: Coordinator,
    pub gate: RepoGate,
    pub reporter: Arc<TerminalReporter>,
    workspaces: Mutex<HashMap<PathBuf, Coordinator>>,
}

impl App {
    pub fn new(
        config: ProvisionConfig,
        coordinator: Coordinator,
        gate: RepoGate,
        reporter: Arc<TerminalReporter>,
    ) -> Self {
        Self {
            config,
            coordinator,
            gate,
            reporter,
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    /// The QA-kit coordinator of an organization workspace, created on first use.
    fn workspace(&self, root: &Path) -> Result<Coordinator, CliError> {
        let mut workspaces = self
            .workspaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = workspaces.get(root) {
            return Ok(existing.clone());
        }
        let coordinator = Coordinator::for_workspace(&self.config, root)?;
        workspaces.insert(root.to_path_buf(), coordinator.clone());
        Ok(coordinator)
    }

    /// Terminate running installs and drop every cache.
    pub async fn teardown(&self) {
        self.coordinator.teardown().await;
        let workspaces: Vec<Coordinator> = self
            .workspaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, coordinator)| coordinator)
            .collect();
        for workspace in workspaces {
            workspace.teardown().await;
        }
        self.gate.clear();
    }
}

#[instrument(skip(app), fields(correlation_id = %crate::tracing::correlation_id()))]
pub async fn execute(command: Commands, app: &App) -> Result<Exit, CliError> {
    match command {
        Commands::Boot => boot(app, false).await,
        Commands::Fix {
            subcommand: FixCommands::Boot,
        } => boot(app, true).await,
        Commands::Fix {
            subcommand: FixCommands::Qakit,
        } => {
            app.coordinator.fix_qa_kit()?;
            Ok(Exit::Success)
        }
        Commands::Open { paths } => open(app, &paths).await,
        Commands::Status { json } => status(app, json).await,
    }
}

async fn boot(app: &App, force_refresh: bool) -> Result<Exit, CliError> {
    match app.coordinator.ensure_provisioned(force_refresh).await? {
        SessionOutcome::Completed(report) => {
            debug!(installed = report.installed_count(), "Boot completed");
            app.reporter.dismiss().await;
            Ok(Exit::Success)
        }
        SessionOutcome::AlreadyRunning => {
            info!("A boot session is already running");
            Ok(Exit::Success)
        }
        SessionOutcome::CooledDown { last_check } => {
            info!(last_check = %last_check.to_rfc3339(), "Tools were checked recently");
            Ok(Exit::Success)
        }
        SessionOutcome::Interrupted => Ok(Exit::Interrupted),
    }
}

/// Directory to evaluate for an opened path: the path itself or its parent.
fn directory_of(path: &Path) -> Result<PathBuf, CliError> {
    let canonical = path.canonicalize().map_err(|source| CliError::InvalidPath {
        path: path.to_path_buf(),
        source,
    })?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Ok(canonical
            .parent()
            .map_or_else(|| canonical.clone(), Path::to_path_buf))
    }
}

async fn open(app: &App, paths: &[PathBuf]) -> Result<Exit, CliError> {
    let mut exit = Exit::Success;
    for path in paths {
        let dir = directory_of(path)?;
        let GateDecision::OrgOwned(root) = app.gate.evaluate(&dir).await else {
            continue;
        };

        let workspace = app.workspace(&root)?;
        match workspace.provision(QA_KIT).await {
            Ok(outcome) => info!(root = %root.display(), %outcome, "Workspace QA kit ready"),
            Err(devpack_core::Error::Tool(e)) if e.is_interrupt() => return Ok(Exit::Interrupted),
            Err(e) => {
                warn!(root = %root.display(), error = %e, "QA kit provisioning failed");
                exit = Exit::Failure;
            }
        }
    }
    Ok(exit)
}

#[allow(clippy::print_stdout)]
async fn status(app: &App, json: bool) -> Result<Exit, CliError> {
    let statuses = app.coordinator.inspect().await;
    if json {
        let rendered = serde_json::to_string_pretty(&statuses)
            .map_err(|e| CliError::output(e.to_string()))?;
        println!("{rendered}");
    } else {
        for status in &statuses {
            println!("{}", format_status(status));
        }
    }
    Ok(Exit::Success)
}

fn format_status(status: &ToolStatus) -> String {
    let installed = status.installed.as_deref().unwrap_or("not installed");
    let latest = status.latest.as_deref().unwrap_or("unknown");
    let note = if status.plan.needs_install() {
        "  (needs install)"
    } else {
        ""
    };
    format!(
        "{:<12} {:<16} installed: {installed:<14} latest: {latest}{note}",
        status.name, status.package
    )
}
