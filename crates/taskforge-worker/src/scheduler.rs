// Scheduler: drives one workflow tree to termination
//
// The loop follows the advanced child: leaves run the agent sequence,
// parents advance their queue. The tree lock is acquired inside advance and
// held across each leaf execution; single-node trees take the lock here
// since they never pass through advance.

use tracing::{info, warn};

use taskforge_core::{
    OrchestratorConfig, Parent, QueueEntryStatus, Result, WorkflowEvent, WorkflowStatus,
};
use taskforge_storage::{Database, EventPublisher, TreeLock, WorkflowRow};

use crate::queue::QueueEngine;
use crate::runner::{AgentRunner, RunOutcome};

enum LeafResult {
    /// Continue driving the tree at this workflow (none = tree idle/done).
    Next(Option<i64>),
    /// The user redirected; a replacement root was created.
    Redirected(i64),
}

pub struct Scheduler {
    db: Database,
    queue: QueueEngine,
    runner: AgentRunner,
    lock: TreeLock,
    events: EventPublisher,
    config: OrchestratorConfig,
}

impl Scheduler {
    pub fn new(
        db: Database,
        queue: QueueEngine,
        runner: AgentRunner,
        lock: TreeLock,
        events: EventPublisher,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            queue,
            runner,
            lock,
            events,
            config,
        }
    }

    /// Drive the tree rooted at `root_id` until it terminates or stalls.
    ///
    /// Returns the id of a replacement root when the user redirected the
    /// work mid-tree; the caller starts a fresh task for it.
    pub async fn run(&self, root_id: i64) -> Result<Option<i64>> {
        info!(root_id, "scheduler starting tree");

        let mut current = Some(root_id);
        while let Some(workflow_id) = current {
            let Some(workflow) = self.db.get_workflow(workflow_id).await? else {
                warn!(workflow_id, "workflow disappeared while scheduled");
                break;
            };

            if workflow.status == WorkflowStatus::Cancelled.to_string() {
                info!(workflow_id, "tree drive stopped at cancelled workflow");
                break;
            }

            let has_children = self.db.has_queue_entries(workflow_id).await?;
            if !has_children {
                match self.execute_leaf(&workflow).await? {
                    LeafResult::Redirected(new_root_id) => return Ok(Some(new_root_id)),
                    LeafResult::Next(next) => current = next,
                }
            } else {
                if !workflow.auto_execute_children {
                    info!(
                        workflow_id,
                        "auto-execute disabled; queue advances only on operator request"
                    );
                    break;
                }
                // A parent node entering the loop is waiting on its children.
                if workflow.status == WorkflowStatus::Pending.to_string() {
                    self.db
                        .update_workflow_status(workflow_id, WorkflowStatus::Running)
                        .await?;
                    self.events
                        .publish(WorkflowEvent::WorkflowUpdated {
                            workflow_id,
                            status: "running".to_string(),
                        })
                        .await;
                }
                current = self.queue.advance(workflow_id).await?;
            }
        }

        info!(root_id, "scheduler finished tree");
        Ok(None)
    }

    /// Run a leaf's agent sequence, then advance its parent queue.
    async fn execute_leaf(&self, workflow: &WorkflowRow) -> Result<LeafResult> {
        let is_root_leaf = workflow.parent_workflow_id.is_none();
        if is_root_leaf {
            // Single-node tree: no advance call serializes it, so the
            // scheduler takes the lock itself.
            if !self.lock.acquire(workflow.id, self.config.lock_ttl).await? {
                info!(
                    workflow_id = workflow.id,
                    "tree already held by another executor"
                );
                return Ok(LeafResult::Next(None));
            }
        }

        let outcome = self.runner.run(workflow).await;

        if is_root_leaf {
            self.lock.release(workflow.id).await?;
        }

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                // Don't leave the tree lock pinned until its TTL expires.
                if !is_root_leaf {
                    let root_id = self.db.root_of(workflow.id).await?;
                    self.lock.release(root_id).await.ok();
                }
                return Err(e);
            }
        };

        match outcome {
            RunOutcome::Redirected { new_root_id } => {
                if let Some(parent_id) = workflow.parent_workflow_id {
                    // The cancelled leaf still needs its entry resolved.
                    self.record_leaf_entry(workflow.id).await?;
                    self.queue.advance(parent_id).await?;
                }
                Ok(LeafResult::Redirected(new_root_id))
            }
            RunOutcome::Completed | RunOutcome::Failed | RunOutcome::Cancelled => {
                match Parent::from_option(workflow.parent_workflow_id) {
                    Parent::Child(parent_id) => {
                        // Reflect the leaf's fate in its queue entry before
                        // advancing; failure propagation and the completion
                        // cascade live in the queue engine.
                        self.record_leaf_entry(workflow.id).await?;
                        Ok(LeafResult::Next(self.queue.advance(parent_id).await?))
                    }
                    Parent::Root => Ok(LeafResult::Next(None)),
                }
            }
        }
    }

    /// Copy the leaf workflow's terminal status onto its queue entry.
    async fn record_leaf_entry(&self, workflow_id: i64) -> Result<()> {
        let Some(workflow) = self.db.get_workflow(workflow_id).await? else {
            return Ok(());
        };
        let Some(entry) = self.db.queue_entry_for_child(workflow_id).await? else {
            return Ok(());
        };

        let (status, error) = match workflow.status.as_str() {
            "completed" => (QueueEntryStatus::Completed, None),
            "failed" => (QueueEntryStatus::Failed, Some("workflow execution failed")),
            "cancelled" => (QueueEntryStatus::Cancelled, None),
            _ => return Ok(()),
        };

        self.db
            .update_queue_entry_status(entry.id, status, error)
            .await?;
        Ok(())
    }
}
