// Tree executor: one tokio task per executing workflow tree
//
// Request handlers stay short - they enqueue a tree here and return. The
// spawned task owns the scheduler loop (and through it the tree lock) for
// the tree's lifetime. Redirects chain: when a scheduler run ends with a
// replacement root, a fresh task is started for it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use taskforge_core::{
    OrchestratorError, QueueEntryStatus, Result, WorkflowEvent, WorkflowStatus,
};
use taskforge_storage::{Database, EventPublisher};

use crate::scheduler::Scheduler;

pub struct TreeExecutor {
    db: Database,
    scheduler: Arc<Scheduler>,
    events: EventPublisher,
    /// Active trees (root workflow id -> task handle)
    active_trees: Arc<RwLock<HashMap<i64, JoinHandle<()>>>>,
}

impl TreeExecutor {
    pub fn new(db: Database, scheduler: Arc<Scheduler>, events: EventPublisher) -> Self {
        Self {
            db,
            scheduler,
            events,
            active_trees: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start (or no-op if already running) the execution task for a tree.
    pub async fn start_tree(&self, root_id: i64) -> Result<()> {
        {
            let mut trees = self.active_trees.write().await;
            if let Some(handle) = trees.get(&root_id) {
                if !handle.is_finished() {
                    info!(root_id, "tree already executing in this process");
                    return Ok(());
                }
            }

            let scheduler = Arc::clone(&self.scheduler);
            let active_trees = Arc::clone(&self.active_trees);
            let handle = tokio::spawn(async move {
                // Redirects chain inside the task: each replacement root is
                // driven to termination in turn.
                let mut current_root = root_id;
                loop {
                    match scheduler.run(current_root).await {
                        Ok(Some(redirect_root_id)) => {
                            info!(
                                root_id = current_root,
                                redirect_root_id, "tree redirected; driving replacement"
                            );
                            current_root = redirect_root_id;
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!(root_id = current_root, error = %e, "tree execution errored");
                            break;
                        }
                    }
                }
                active_trees.write().await.remove(&root_id);
            });

            trees.insert(root_id, handle);
        }

        info!(root_id, "tree execution task started");
        Ok(())
    }

    /// Cooperative cancel: mark the workflow (and its entry) cancelled. The
    /// in-flight agent finishes or times out; the runner aborts between
    /// steps.
    pub async fn cancel_workflow(&self, workflow_id: i64) -> Result<()> {
        let workflow = self
            .db
            .get_workflow(workflow_id)
            .await?
            .ok_or(OrchestratorError::NotFound(workflow_id))?;
        let status: WorkflowStatus = workflow
            .status
            .parse()
            .map_err(OrchestratorError::invariant)?;
        if status.is_terminal() {
            return Err(OrchestratorError::invalid_state(format!(
                "workflow {} is already {}",
                workflow_id, workflow.status
            )));
        }

        self.db
            .update_workflow_status(workflow_id, WorkflowStatus::Cancelled)
            .await?;
        if let Some(entry) = self.db.queue_entry_for_child(workflow_id).await? {
            self.db
                .update_queue_entry_status(entry.id, QueueEntryStatus::Cancelled, None)
                .await?;
        }
        self.events
            .publish(WorkflowEvent::WorkflowUpdated {
                workflow_id,
                status: "cancelled".to_string(),
            })
            .await;
        info!(workflow_id, "workflow cancelled (cooperative)");
        Ok(())
    }

    /// Reset a terminal workflow and re-drive its tree.
    pub async fn resume_workflow(&self, workflow_id: i64) -> Result<i64> {
        self.reset_for_reexecution(workflow_id, &["failed", "cancelled", "completed"])
            .await
    }

    /// Reset a failed/cancelled workflow (and its parent entry) and re-execute.
    pub async fn retry_workflow(&self, workflow_id: i64) -> Result<i64> {
        self.reset_for_reexecution(workflow_id, &["failed", "cancelled"])
            .await
    }

    async fn reset_for_reexecution(
        &self,
        workflow_id: i64,
        allowed_statuses: &[&str],
    ) -> Result<i64> {
        let workflow = self
            .db
            .get_workflow(workflow_id)
            .await?
            .ok_or(OrchestratorError::NotFound(workflow_id))?;
        if !allowed_statuses.contains(&workflow.status.as_str()) {
            return Err(OrchestratorError::invalid_state(format!(
                "workflow {} is {}; expected one of {:?}",
                workflow_id, workflow.status, allowed_statuses
            )));
        }

        self.db.reset_workflow(workflow_id, false).await?;
        self.db.reset_queue_entry_for_child(workflow_id).await?;
        self.events
            .publish(WorkflowEvent::WorkflowUpdated {
                workflow_id,
                status: "pending".to_string(),
            })
            .await;

        // Ancestors poisoned by this workflow's earlier failure must drop
        // out of their terminal state so the cascade can re-run them.
        let mut current = workflow.parent_workflow_id;
        while let Some(ancestor_id) = current {
            let Some(ancestor) = self.db.get_workflow(ancestor_id).await? else {
                break;
            };
            if matches!(ancestor.status.as_str(), "failed" | "cancelled") {
                self.db
                    .update_workflow_status(ancestor_id, WorkflowStatus::Running)
                    .await?;
                self.db.reset_queue_entry_for_child(ancestor_id).await?;
            }
            current = ancestor.parent_workflow_id;
        }

        let root_id = self.db.root_of(workflow_id).await?;
        self.start_tree(root_id).await?;
        Ok(root_id)
    }

    /// Skip a non-root workflow: mark its entry skipped and advance the
    /// parent queue.
    pub async fn skip_workflow(&self, workflow_id: i64) -> Result<()> {
        let workflow = self
            .db
            .get_workflow(workflow_id)
            .await?
            .ok_or(OrchestratorError::NotFound(workflow_id))?;
        if workflow.parent_workflow_id.is_none() {
            return Err(OrchestratorError::invalid_state(
                "cannot skip a root workflow",
            ));
        }

        let entry = self
            .db
            .queue_entry_for_child(workflow_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::invariant(format!(
                    "non-root workflow {} has no queue entry",
                    workflow_id
                ))
            })?;
        self.db
            .update_queue_entry_status(entry.id, QueueEntryStatus::Skipped, None)
            .await?;
        self.db
            .update_workflow_status(workflow_id, WorkflowStatus::Cancelled)
            .await?;
        self.events
            .publish(WorkflowEvent::WorkflowUpdated {
                workflow_id,
                status: "cancelled".to_string(),
            })
            .await;

        let root_id = self.db.root_of(workflow_id).await?;
        self.start_tree(root_id).await?;
        Ok(())
    }

    pub async fn is_running(&self, root_id: i64) -> bool {
        let trees = self.active_trees.read().await;
        trees
            .get(&root_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn active_count(&self) -> usize {
        self.active_trees.read().await.len()
    }

    /// Abort every tree task. Workflow state stays in the DB; the next
    /// startup's recovery pass resets anything left mid-step.
    pub async fn shutdown(&self) {
        let mut trees = self.active_trees.write().await;
        for (root_id, handle) in trees.drain() {
            warn!(root_id, "aborting tree task on shutdown");
            handle.abort();
        }
    }
}
