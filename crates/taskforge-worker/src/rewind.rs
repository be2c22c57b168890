// Checkpoint rewind: truncate a tree back to a committed checkpoint
//
// Everything strictly after the checkpoint node - its descendants, its later
// siblings, and their descendants - is cancelled, given a short grace period
// so active executors observe the cancellation, then deleted with all
// dependent rows. The checkpoint node itself is reset to pending with its
// commit preserved so the caller can reset source control.

use std::collections::BTreeSet;

use tracing::info;

use taskforge_core::{
    OrchestratorConfig, OrchestratorError, QueueEntryStatus, Result, WorkflowEvent, WorkflowStatus,
};
use taskforge_storage::{Database, EventPublisher, WorkflowRow};

/// Result of a rewind, handed back to the caller for the source-control
/// reset.
#[derive(Debug, Clone)]
pub struct RewindOutcome {
    pub checkpoint_workflow_id: i64,
    pub checkpoint_commit: String,
    pub target_module: String,
    pub reset_workflow_ids: Vec<i64>,
    pub removed_workflow_ids: Vec<i64>,
}

pub struct CheckpointRewind {
    db: Database,
    events: EventPublisher,
    config: OrchestratorConfig,
}

impl CheckpointRewind {
    pub fn new(db: Database, events: EventPublisher, config: OrchestratorConfig) -> Self {
        Self { db, events, config }
    }

    pub async fn rewind(
        &self,
        root_id: i64,
        checkpoint_workflow_id: Option<i64>,
    ) -> Result<RewindOutcome> {
        let checkpoint = self.resolve_checkpoint(root_id, checkpoint_workflow_id).await?;
        let commit = checkpoint.checkpoint_commit.clone().ok_or_else(|| {
            OrchestratorError::invalid_state(format!(
                "workflow {} has no checkpoint commit",
                checkpoint.id
            ))
        })?;

        info!(
            root_id,
            checkpoint_workflow_id = checkpoint.id,
            commit = %commit,
            "rewinding tree to checkpoint"
        );

        // Removal set: the checkpoint's descendants, its strictly-later
        // siblings, and their descendants.
        let mut removal: BTreeSet<i64> = BTreeSet::new();
        for descendant in self.db.descendants(checkpoint.id).await? {
            removal.insert(descendant.id);
        }
        if let Some(parent_id) = checkpoint.parent_workflow_id {
            let siblings = self.db.list_children(parent_id).await?;
            for sibling in siblings_after(&siblings, &checkpoint) {
                removal.insert(sibling.id);
                for descendant in self.db.descendants(sibling.id).await? {
                    removal.insert(descendant.id);
                }
            }
        }

        // Cancel first so any executor mid-step aborts between steps.
        for id in &removal {
            self.db
                .update_workflow_status(*id, WorkflowStatus::Cancelled)
                .await?;
            if let Some(entry) = self.db.queue_entry_for_child(*id).await? {
                self.db
                    .update_queue_entry_status(entry.id, QueueEntryStatus::Cancelled, None)
                    .await?;
            }
        }
        tokio::time::sleep(self.config.rewind_grace).await;

        let removed: Vec<i64> = removal.into_iter().collect();
        self.db.delete_workflows_with_dependents(&removed).await?;

        // Reset the checkpoint node for re-execution; the commit survives.
        self.db.reset_workflow(checkpoint.id, true).await?;
        self.db.reset_queue_entry_for_child(checkpoint.id).await?;
        self.events
            .publish(WorkflowEvent::WorkflowUpdated {
                workflow_id: checkpoint.id,
                status: "pending".to_string(),
            })
            .await;

        info!(
            checkpoint_workflow_id = checkpoint.id,
            removed = removed.len(),
            "rewind complete"
        );

        Ok(RewindOutcome {
            checkpoint_workflow_id: checkpoint.id,
            checkpoint_commit: commit,
            target_module: checkpoint.target_module.clone(),
            reset_workflow_ids: vec![checkpoint.id],
            removed_workflow_ids: removed,
        })
    }

    /// Either the named node (which must carry a commit) or the most recent
    /// completed checkpoint in the subtree.
    async fn resolve_checkpoint(
        &self,
        root_id: i64,
        checkpoint_workflow_id: Option<i64>,
    ) -> Result<WorkflowRow> {
        match checkpoint_workflow_id {
            Some(id) => {
                let workflow = self
                    .db
                    .get_workflow(id)
                    .await?
                    .ok_or(OrchestratorError::NotFound(id))?;
                if workflow.checkpoint_commit.is_none() {
                    return Err(OrchestratorError::invalid_state(format!(
                        "workflow {} has no checkpoint commit",
                        id
                    )));
                }
                Ok(workflow)
            }
            None => self
                .db
                .subtree_checkpoints(root_id)
                .await?
                .into_iter()
                .find(|w| w.status == WorkflowStatus::Completed.to_string())
                .ok_or_else(|| {
                    OrchestratorError::invalid_state(format!(
                        "no completed checkpoint in subtree of workflow {}",
                        root_id
                    ))
                }),
        }
    }
}

/// Siblings ordered strictly after the checkpoint by `(execution_order, id)`.
fn siblings_after<'a>(
    siblings: &'a [WorkflowRow],
    checkpoint: &WorkflowRow,
) -> Vec<&'a WorkflowRow> {
    siblings
        .iter()
        .filter(|s| {
            s.id != checkpoint.id
                && (s.execution_order, s.id) > (checkpoint.execution_order, checkpoint.id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn workflow(id: i64, execution_order: i32) -> WorkflowRow {
        WorkflowRow {
            id,
            workflow_type: "feature".to_string(),
            target_module: "m".to_string(),
            status: "completed".to_string(),
            payload: serde_json::json!({}),
            plan_json: None,
            branch_name: None,
            parent_workflow_id: Some(1),
            workflow_depth: 1,
            execution_order,
            auto_execute_children: true,
            is_paused: false,
            pause_reason: None,
            checkpoint_commit: None,
            checkpoint_created_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn later_siblings_selected() {
        let siblings = vec![workflow(10, 0), workflow(11, 1), workflow(12, 2)];
        let checkpoint = workflow(11, 1);
        let after = siblings_after(&siblings, &checkpoint);
        assert_eq!(after.iter().map(|w| w.id).collect::<Vec<_>>(), vec![12]);
    }

    #[test]
    fn equal_order_breaks_ties_by_id() {
        let siblings = vec![workflow(10, 0), workflow(11, 0), workflow(12, 0)];
        let checkpoint = workflow(11, 0);
        let after = siblings_after(&siblings, &checkpoint);
        assert_eq!(after.iter().map(|w| w.id).collect::<Vec<_>>(), vec![12]);
    }

    #[test]
    fn checkpoint_itself_excluded() {
        let siblings = vec![workflow(10, 0)];
        let checkpoint = workflow(10, 0);
        assert!(siblings_after(&siblings, &checkpoint).is_empty());
    }

    #[test]
    fn earlier_siblings_retained() {
        let siblings = vec![workflow(10, 0), workflow(11, 1)];
        let checkpoint = workflow(11, 1);
        assert!(siblings_after(&siblings, &checkpoint).is_empty());
    }
}
