use super::session::SessionFlag;
use super::work::{Pipeline, WorkRecords};
use super::{BootReport, Plan, SessionOutcome, ToolAction, ToolOutcome, plan};
use crate::config::ProvisionConfig;
use crate::error::ToolError;
use crate::report::{NoopReporter, Reporter};
use crate::state::{CheckStore, FileCheckStore, within_cooldown};
use crate::tools::{
    CommandProbe, Installer, NpmInstaller, NpmRegistry, RegistryQuery, ToolDescriptor,
    VersionProbe, default_tools,
};
use crate::{Error, Result};
use chrono::Utc;
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installed and latest versions of one tool, without side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    /// Logical tool name
    pub name: String,
    /// Registry package identifier
    pub package: String,
    /// Probed version, `None` when absent
    pub installed: Option<String>,
    /// Registry's latest version, `None` when unknown
    pub latest: Option<String>,
    /// What a boot would do
    pub plan: Plan,
}

/// Owns the work records and session flag for one process.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    tools: Vec<ToolDescriptor>,
    probe: Arc<dyn VersionProbe>,
    registry: Arc<dyn RegistryQuery>,
    installer: Arc<dyn Installer>,
    reporter: Arc<dyn Reporter>,
    store: Option<Arc<dyn CheckStore>>,
    cooldown: Option<Duration>,
    session: SessionFlag,
    records: Mutex<WorkRecords>,
    shutdown: Mutex<CancellationToken>,
    next_task: AtomicU64,
}

impl Inner {
    fn records(&self) -> MutexGuard<'_, WorkRecords> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown_token(&self) -> MutexGuard<'_, CancellationToken> {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tool(&self, name: &str) -> Result<&ToolDescriptor> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::UnknownTool {
                name: name.to_string(),
            })
    }

    async fn within_cooldown(&self) -> Option<chrono::DateTime<Utc>> {
        let (store, cooldown) = (self.store.as_ref()?, self.cooldown?);
        match store.last_check().await {
            Ok(Some(last)) if within_cooldown(last, Utc::now(), cooldown) => Some(last),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Could not read last check, ignoring cool-down");
                None
            }
        }
    }

    async fn record_success(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.record_check(Utc::now()).await {
                warn!(error = %e, "Could not persist last check");
            }
        }
    }
}

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder {
    tools: Vec<ToolDescriptor>,
    probe: Arc<dyn VersionProbe>,
    registry: Arc<dyn RegistryQuery>,
    installer: Arc<dyn Installer>,
    reporter: Arc<dyn Reporter>,
    store: Option<Arc<dyn CheckStore>>,
    cooldown: Option<Duration>,
}

impl CoordinatorBuilder {
    /// Replace the managed tools.
    #[must_use]
    pub fn tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    /// Route session callbacks to `reporter`.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Persist the last successful check in `store`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn CheckStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Skip non-forced sessions within `cooldown` of the last success.
    #[must_use]
    pub fn cooldown(mut self, cooldown: Option<Duration>) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Coordinator {
        Coordinator {
            inner: Arc::new(Inner {
                tools: self.tools,
                probe: self.probe,
                registry: self.registry,
                installer: self.installer,
                reporter: self.reporter,
                store: self.store,
                cooldown: self.cooldown,
                session: SessionFlag::default(),
                records: Mutex::new(WorkRecords::default()),
                shutdown: Mutex::new(CancellationToken::new()),
                next_task: AtomicU64::new(0),
            }),
        }
    }
}

impl Coordinator {
    /// Start building a coordinator from its three leaf collaborators.
    ///
    /// Defaults: the two managed tools, no reporter, no persisted state.
    #[must_use]
    pub fn builder(
        probe: Arc<dyn VersionProbe>,
        registry: Arc<dyn RegistryQuery>,
        installer: Arc<dyn Installer>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            tools: default_tools(),
            probe,
            registry,
            installer,
            reporter: Arc::new(NoopReporter),
            store: None,
            cooldown: None,
        }
    }

    /// Wire the npm-backed collaborators and the file state store.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the state directory cannot be
    /// resolved.
    pub fn from_config(config: &ProvisionConfig, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let store = FileCheckStore::new(config.resolved_state_dir()?);
        debug!(
            npm = %config.npm_program.display(),
            registry = ?config.registry,
            state = %store.state_file().display(),
            "Configured coordinator"
        );

        Ok(Self::npm_builder(config)
            .reporter(reporter)
            .store(Arc::new(store))
            .cooldown(config.cooldown)
            .build())
    }

    /// A coordinator that manages only the QA kit of one organization
    /// workspace, installed under that workspace's own prefix.
    ///
    /// Its work records are separate from the boot coordinator's and from
    /// every other workspace's.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the state directory cannot be
    /// resolved.
    pub fn for_workspace(config: &ProvisionConfig, root: &Path) -> Result<Self> {
        let config = config.for_workspace(root)?;
        debug!(
            root = %root.display(),
            scope = ?config.install_scope,
            "Configured workspace coordinator"
        );
        Ok(Self::npm_builder(&config)
            .tools(vec![ToolDescriptor::qa_kit()])
            .build())
    }

    fn npm_builder(config: &ProvisionConfig) -> CoordinatorBuilder {
        let npm = config.npm();
        Self::builder(
            Arc::new(CommandProbe::new(npm.clone()).with_timeout(config.probe_timeout)),
            Arc::new(NpmRegistry::new(npm.clone()).with_timeout(config.query_timeout)),
            Arc::new(NpmInstaller::new(npm)),
        )
    }

    /// The managed tools.
    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.inner.tools
    }

    /// Run one boot session over every managed tool.
    ///
    /// Returns [`SessionOutcome::AlreadyRunning`] without queuing work when
    /// a session is in progress. With `force_refresh`, settled results from
    /// earlier sessions are discarded and the cool-down is ignored; installs
    /// still running are attached to, never killed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BootFailed`] when any pipeline failed for a reason
    /// other than teardown. Sibling pipelines always run to completion.
    pub async fn ensure_provisioned(&self, force_refresh: bool) -> Result<SessionOutcome> {
        let Some(_session) = self.inner.session.try_begin() else {
            return Ok(SessionOutcome::AlreadyRunning);
        };

        if force_refresh {
            let discarded = self.inner.records().discard_settled();
            debug!(discarded, "Forced refresh cleared settled pipelines");
        } else if let Some(last_check) = self.inner.within_cooldown().await {
            info!(last_check = %last_check.to_rfc3339(), "Within cool-down, skipping boot");
            return Ok(SessionOutcome::CooledDown { last_check });
        }

        let started = Instant::now();
        let total = self.inner.tools.len();
        self.inner.reporter.on_start(total);
        info!(tools = total, force_refresh, "Boot session started");

        let mut pending: FuturesUnordered<_> = self
            .inner
            .tools
            .iter()
            .map(|tool| self.pipeline(tool))
            .collect();

        let mut outcomes = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut completed = 0;
        while let Some(result) = pending.next().await {
            completed += 1;
            let message = match &result {
                Ok(outcome) => Some(outcome.to_string()),
                Err(e) if e.is_interrupt() => None,
                Err(e) => Some(e.to_string()),
            };
            if let Some(message) = message {
                self.inner.reporter.on_progress(fraction(completed, total), &message);
            }
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => failures.push(e),
            }
        }

        let elapsed = started.elapsed();
        if failures.iter().any(|f| !f.is_interrupt()) {
            failures.retain(|f| !f.is_interrupt());
            let error = Error::BootFailed { failures };
            warn!(elapsed_ms = elapsed.as_millis(), error = %error, "Boot session failed");
            self.inner.reporter.on_failure(&error);
            return Err(error);
        }
        if !failures.is_empty() {
            info!("Boot session interrupted by teardown");
            return Ok(SessionOutcome::Interrupted);
        }

        self.inner.record_success().await;
        let report = BootReport { outcomes, elapsed };
        info!(
            installed = report.installed_count(),
            elapsed_ms = elapsed.as_millis(),
            "Boot session done"
        );
        self.inner.reporter.on_success(&report);
        Ok(SessionOutcome::Completed(report))
    }

    /// Provision a single tool outside any session.
    ///
    /// Attaches to the tool's in-flight or memoized pipeline if there is
    /// one, so overlapping calls never start a second install.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTool`] for a name that is not managed and
    /// [`Error::Tool`] when the pipeline failed.
    pub async fn provision(&self, name: &str) -> Result<ToolOutcome> {
        let tool = self.inner.tool(name)?;
        self.pipeline(tool).await.map_err(Error::from)
    }

    /// Probe and query every tool without installing anything.
    pub async fn inspect(&self) -> Vec<ToolStatus> {
        let probes = self.inner.tools.iter().map(|tool| async move {
            let installed = self.inner.probe.probe(tool).await;
            let latest = self.inner.registry.latest(&tool.package).await;
            ToolStatus {
                name: tool.name.clone(),
                package: tool.package.clone(),
                plan: plan(installed.as_deref(), latest.as_deref()),
                installed,
                latest,
            }
        });
        futures::future::join_all(probes).await
    }

    /// The reserved "fix QA kit" command.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::NotImplemented`].
    pub fn fix_qa_kit(&self) -> Result<()> {
        Err(Error::not_implemented("fix qakit"))
    }

    /// Terminate every running install and discard every work record.
    ///
    /// Resolves once all discarded pipelines have settled, so no external
    /// process outlives the call. The coordinator stays usable afterwards.
    pub async fn teardown(&self) {
        let token = std::mem::take(&mut *self.inner.shutdown_token());
        token.cancel();

        let pipelines = self.inner.records().drain();
        info!(pipelines = pipelines.len(), "Tearing down coordinator");
        futures::future::join_all(pipelines).await;
    }

    /// Whether a boot session is in progress.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.inner.session.is_in_progress()
    }

    /// Names of tools that currently have a work record.
    #[must_use]
    pub fn tracked_tools(&self) -> Vec<String> {
        self.inner.records().names()
    }

    /// Names of tools whose install process is running.
    #[must_use]
    pub fn running_installs(&self) -> Vec<String> {
        self.inner.records().running()
    }

    /// Attach to, or start, the pipeline for `tool`.
    fn pipeline(&self, tool: &ToolDescriptor) -> Pipeline {
        let mut records = self.inner.records();
        let record = records.entry(&tool.name);
        if let Some(existing) = record.reusable_pipeline() {
            debug!(tool = %tool.name, "Attaching to existing pipeline");
            return existing;
        }

        let cancel = self.inner.shutdown_token().child_token();
        let name = tool.name.clone();
        let handle = tokio::spawn(run_pipeline(Arc::clone(&self.inner), tool.clone(), cancel));
        let pipeline = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(ToolError::Interrupted { tool: name }),
                Err(e) => Err(ToolError::Launch {
                    tool: name,
                    message: format!("pipeline task failed: {e}"),
                }),
            }
        }
        .boxed()
        .shared();

        record.pipeline = Some(pipeline.clone());
        pipeline
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("tools", &self.inner.tools)
            .field("cooldown", &self.inner.cooldown)
            .field("in_progress", &self.is_in_progress())
            .finish_non_exhaustive()
    }
}

/// Probe, query, decide, and install one tool.
async fn run_pipeline(
    inner: Arc<Inner>,
    tool: ToolDescriptor,
    cancel: CancellationToken,
) -> std::result::Result<ToolOutcome, ToolError> {
    let decide = async {
        let installed = inner.probe.probe(&tool).await;
        // The registry cannot change the decision for an absent tool.
        let latest = match &installed {
            Some(_) => inner.registry.latest(&tool.package).await,
            None => None,
        };
        debug!(tool = %tool.name, ?installed, ?latest, "Probed tool");
        plan(installed.as_deref(), latest.as_deref())
    };

    let decided = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        decided = decide => Some(decided),
    };
    let Some(decided) = decided else {
        return Err(ToolError::Interrupted { tool: tool.name });
    };

    let action = match decided {
        Plan::Keep { version } => {
            debug!(tool = %tool.name, %version, "Tool is up to date");
            return Ok(ToolOutcome {
                name: tool.name,
                action: ToolAction::UpToDate { version },
            });
        }
        Plan::Install => ToolAction::Installed,
        Plan::Update { from, to } => ToolAction::Updated { from, to },
    };

    let task_id = inner.next_task.fetch_add(1, Ordering::Relaxed);
    inner.records().start_task(&tool.name, task_id);
    let result = inner.installer.install(&tool, cancel).await;
    if let Some(task) = inner.records().finish_task(&tool.name, task_id) {
        debug!(
            tool = %tool.name,
            elapsed_ms = task.started.elapsed().as_millis(),
            "Install task exited"
        );
    }

    result.map(|()| ToolOutcome {
        name: tool.name,
        action,
    })
}

#[allow(clippy::cast_precision_loss)]
fn fraction(completed: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        completed as f64 / total as f64
    }
}
