//! Per-tool work records.

use super::ToolOutcome;
use crate::error::ToolError;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::time::Instant;

/// A tool pipeline that any number of callers can await.
pub(super) type Pipeline = Shared<BoxFuture<'static, Result<ToolOutcome, ToolError>>>;

/// An install process currently running for a tool.
#[derive(Debug, Clone, Copy)]
pub(super) struct RunningTask {
    pub(super) id: u64,
    pub(super) started: Instant,
}

/// Mutable state for one tool name.
#[derive(Default)]
pub(super) struct WorkRecord {
    pub(super) pipeline: Option<Pipeline>,
    pub(super) task: Option<RunningTask>,
}

impl WorkRecord {
    /// A pipeline callers may attach to: in flight, or settled successfully.
    ///
    /// Failed pipelines are not reused, so the next request retries.
    pub(super) fn reusable_pipeline(&self) -> Option<Pipeline> {
        let pipeline = self.pipeline.as_ref()?;
        match pipeline.peek() {
            Some(Err(_)) => None,
            _ => Some(pipeline.clone()),
        }
    }

    fn is_settled(&self) -> bool {
        self.pipeline.as_ref().is_some_and(|p| p.peek().is_some())
    }
}

/// Work records keyed by logical tool name.
#[derive(Default)]
pub(super) struct WorkRecords {
    records: HashMap<String, WorkRecord>,
}

impl WorkRecords {
    pub(super) fn entry(&mut self, name: &str) -> &mut WorkRecord {
        self.records.entry(name.to_string()).or_default()
    }

    /// Forget settled pipelines; in-flight ones (and their processes) stay.
    pub(super) fn discard_settled(&mut self) -> usize {
        let mut discarded = 0;
        for record in self.records.values_mut() {
            if record.is_settled() {
                record.pipeline = None;
                discarded += 1;
            }
        }
        self.records
            .retain(|_, record| record.pipeline.is_some() || record.task.is_some());
        discarded
    }

    pub(super) fn start_task(&mut self, name: &str, id: u64) {
        if let Some(record) = self.records.get_mut(name) {
            record.task = Some(RunningTask {
                id,
                started: Instant::now(),
            });
        }
    }

    /// Clear the task handle, unless a newer task has replaced it.
    pub(super) fn finish_task(&mut self, name: &str, id: u64) -> Option<RunningTask> {
        let record = self.records.get_mut(name)?;
        if record.task.is_some_and(|task| task.id == id) {
            return record.task.take();
        }
        None
    }

    /// Remove every record, returning their pipelines.
    pub(super) fn drain(&mut self) -> Vec<Pipeline> {
        self.records
            .drain()
            .filter_map(|(_, record)| record.pipeline)
            .collect()
    }

    pub(super) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        names
    }

    pub(super) fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| record.task.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::ToolAction;
    use futures::FutureExt;

    fn ready(result: Result<ToolOutcome, ToolError>) -> Pipeline {
        futures::future::ready(result).boxed().shared()
    }

    fn up_to_date(name: &str) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome {
            name: name.to_string(),
            action: ToolAction::UpToDate {
                version: "1.0.0".to_string(),
            },
        })
    }

    #[tokio::test]
    async fn test_failed_pipeline_not_reused() {
        let mut records = WorkRecords::default();
        let failed = ready(Err(ToolError::Launch {
            tool: "eslint".to_string(),
            message: "boom".to_string(),
        }));
        let _ = failed.clone().await;
        records.entry("eslint").pipeline = Some(failed);
        assert!(records.entry("eslint").reusable_pipeline().is_none());

        let ok = ready(up_to_date("eslint"));
        let _ = ok.clone().await;
        records.entry("eslint").pipeline = Some(ok);
        assert!(records.entry("eslint").reusable_pipeline().is_some());
    }

    #[tokio::test]
    async fn test_discard_settled_keeps_in_flight() {
        let mut records = WorkRecords::default();
        let done = ready(up_to_date("eslint"));
        let _ = done.clone().await;
        records.entry("eslint").pipeline = Some(done);
        records.entry("devpack-qa").pipeline =
            Some(futures::future::pending().boxed().shared());

        assert_eq!(records.discard_settled(), 1);
        assert_eq!(records.names(), vec!["devpack-qa".to_string()]);
    }

    #[test]
    fn test_finish_task_ignores_stale_id() {
        let mut records = WorkRecords::default();
        records.entry("eslint");
        records.start_task("eslint", 2);
        assert!(records.finish_task("eslint", 1).is_none());
        assert_eq!(records.running(), vec!["eslint".to_string()]);
        assert!(records.finish_task("eslint", 2).is_some());
        assert!(records.running().is_empty());
    }
}
