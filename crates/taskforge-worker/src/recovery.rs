// Crash recovery: runs once at process start, before the scheduler accepts
// work
//
// Interrupted trees are detected by staleness: an active-executing workflow
// whose row has not been touched within the freshness window was abandoned
// by a dead process. Running it twice in a row is a no-op the second time.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{info, warn};

use taskforge_core::{OrchestratorConfig, QueueEntryStatus, Result, WorkflowEvent};
use taskforge_storage::{Database, EventPublisher, TreeLock};

/// What a recovery pass found and fixed.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub cleared_locks: u64,
    pub recovered_workflow_ids: Vec<i64>,
    /// Parents whose queues should be re-advanced (auto-advance set).
    pub advance_parent_ids: Vec<i64>,
    pub skipped_orphans: u64,
}

pub struct Recovery {
    db: Database,
    lock: TreeLock,
    events: EventPublisher,
    config: OrchestratorConfig,
}

impl Recovery {
    pub fn new(
        db: Database,
        lock: TreeLock,
        events: EventPublisher,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            lock,
            events,
            config,
        }
    }

    pub async fn run(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        // 1. Locks from prior processes are meaningless now.
        report.cleared_locks = self.lock.clear_all().await?;
        if report.cleared_locks > 0 {
            info!(cleared = report.cleared_locks, "cleared stale tree locks");
        }

        // 2. Reset interrupted workflows to a resumable state.
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.recovery_freshness)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let stale = self.db.stale_active_workflows(cutoff).await?;
        let mut advance_parents = BTreeSet::new();

        for workflow in stale {
            warn!(
                workflow_id = workflow.id,
                status = %workflow.status,
                "recovering interrupted workflow"
            );
            self.db
                .fail_running_executions(workflow.id, "recovered-from-interrupt")
                .await?;
            self.db.reset_workflow(workflow.id, false).await?;
            // The entry must go back to pending too, otherwise the parent
            // queue holds an in_progress entry no executor owns.
            self.db.reset_queue_entry_for_child(workflow.id).await?;
            self.events
                .publish(WorkflowEvent::WorkflowUpdated {
                    workflow_id: workflow.id,
                    status: "pending".to_string(),
                })
                .await;

            report.recovered_workflow_ids.push(workflow.id);
            if let Some(parent_id) = workflow.parent_workflow_id {
                advance_parents.insert(parent_id);
            }
        }
        report.advance_parent_ids = advance_parents.into_iter().collect();

        // 3. Orphans: pending entries under a terminal parent never run.
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

        info!(
            recovered = report.recovered_workflow_ids.len(),
            orphans = report.skipped_orphans,
            "recovery pass complete"
        );

        Ok(report)
    }
}
