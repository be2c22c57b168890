// Stuck-work reaper: periodic cleanup of wedged agents, workflows, and
// orphan queue entries
//
// Runs on a fixed cadence as a detached background task. Everything it does
// is also safe to run concurrently with live schedulers: it only touches
// rows that have already exceeded their time budget.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use taskforge_core::{
    OrchestratorConfig, QueueEntryStatus, Result, WorkflowEvent, WorkflowStatus,
};
use taskforge_storage::{Database, EventPublisher};

use crate::queue::QueueEngine;

/// Counts from one reaper sweep.
#[derive(Debug, Default)]
pub struct ReaperReport {
    pub failed_agents: u64,
    pub failed_workflows: u64,
    pub skipped_orphans: u64,
}

pub struct Reaper {
    db: Database,
    queue: QueueEngine,
    events: EventPublisher,
    config: OrchestratorConfig,
}

impl Reaper {
    pub fn new(
        db: Database,
        queue: QueueEngine,
        events: EventPublisher,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            queue,
            events,
            config,
        }
    }

    /// Spawn the periodic sweep as a background task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.reaper_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The immediate first tick would race startup recovery.
            interval.tick().await;
            loop {
                interval.tick().await;
                match self.sweep().await {
                    Ok(report) => {
                        if report.failed_agents > 0
                            || report.failed_workflows > 0
                            || report.skipped_orphans > 0
                        {
                            info!(
                                failed_agents = report.failed_agents,
                                failed_workflows = report.failed_workflows,
                                skipped_orphans = report.skipped_orphans,
                                "reaper sweep cleaned up stuck work"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "reaper sweep failed"),
                }
            }
        })
    }

    /// One sweep: timed-out agents, stalled workflows, orphaned entries.
    pub async fn sweep(&self) -> Result<ReaperReport> {
        let mut report = ReaperReport::default();
        let now = Utc::now();

        // Agents past their time budget.
        let agent_cutoff = now
            - chrono::Duration::from_std(self.config.agent_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(60));
        for execution in self.db.timed_out_agent_executions(agent_cutoff).await? {
            warn!(
                agent_execution_id = execution.id,
                workflow_id = execution.workflow_id,
                agent_type = %execution.agent_type,
                "reaping timed-out agent execution"
            );
            self.db
                .update_agent_execution_status(
                    execution.id,
                    taskforge_core::AgentExecutionStatus::Failed,
                    Some("timeout"),
                )
                .await?;
            self.fail_workflow(execution.workflow_id, "agent timeout")
                .await?;
            report.failed_agents += 1;
        }

        // Workflows with no agent progress inside the workflow budget.
        let workflow_cutoff = now
            - chrono::Duration::from_std(self.config.workflow_timeout)
                .unwrap_or_else(|_| chrono::Duration::hours(2));
        for workflow in self.db.stuck_active_workflows(workflow_cutoff).await? {
            warn!(
                workflow_id = workflow.id,
                status = %workflow.status,
                "reaping stuck workflow"
            );
            self.db
                .fail_running_executions(workflow.id, "timeout")
                .await?;
            self.fail_workflow(workflow.id, "no agent progress within workflow timeout")
                .await?;
            report.failed_workflows += 1;
        }

        // Orphans under already-terminal parents.
        for entry in self.db.orphaned_pending_entries().await? {
            self.db
                .update_queue_entry_status(
                    entry.id,
                    QueueEntryStatus::Skipped,
                    Some("parent workflow already terminal"),
                )
                .await?;
            report.skipped_orphans += 1;
        }

        Ok(report)
    }

    async fn fail_workflow(&self, workflow_id: i64, reason: &str) -> Result<()> {
        let workflow = self.db.get_workflow(workflow_id).await?;

        self.db
            .update_workflow_status(workflow_id, WorkflowStatus::Failed)
            .await?;
        if let Some(entry) = self.db.queue_entry_for_child(workflow_id).await? {
            self.db
                .update_queue_entry_status(entry.id, QueueEntryStatus::Failed, Some(reason))
                .await?;
        }
        self.events
            .publish(WorkflowEvent::WorkflowFailed {
                workflow_id,
                error: reason.to_string(),
            })
            .await;

        // The scheduler task that drove this tree is presumed dead - nothing
        // else will advance the ancestors. Re-enter the queue engine to
        // cascade the failed entry up to the root; a poisoned queue never
        // yields new work, so this only propagates.
        if let Some(parent_id) = workflow.and_then(|w| w.parent_workflow_id) {
            self.queue.advance(parent_id).await?;
        }

        Ok(())
    }
}
