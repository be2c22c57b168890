// Queue engine: dependency-aware advancement, failure propagation,
// completion cascade
//
// `advance` is the only way work moves through a tree. It always runs under
// the tree lock (acquired on the root); when it hands a leaf back to the
// scheduler the lock is retained across the leaf execution, renewing the TTL
// on the next advance.

use futures::future::BoxFuture;
use tracing::{info, warn};

use taskforge_core::{
    OrchestratorConfig, QueueEntryStatus, Result, WorkflowEvent, WorkflowStatus,
};
use taskforge_storage::{Database, EventPublisher, QueueEntryRow, TreeLock};

/// Outcome of the next-executable scan over one parent's queue.
#[derive(Debug)]
enum NextExecutable {
    /// A pending entry whose dependencies are all completed.
    Ready(QueueEntryRow),
    /// Another executor is mid-step (active-executing descendant or an
    /// in_progress entry); wait.
    Busy,
    /// Every entry is terminal; the parent needs its terminal check.
    Drained,
    /// Only pending entries remain and none can ever run.
    Deadlock,
}

#[derive(Clone)]
pub struct QueueEngine {
    db: Database,
    lock: TreeLock,
    events: EventPublisher,
    config: OrchestratorConfig,
}

impl QueueEngine {
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

    /// Decide what runs next in `parent`'s queue.
    async fn next_executable(&self, parent_id: i64, root_id: i64) -> Result<NextExecutable> {
        // Another executor mid-step anywhere in this tree means wait.
        let subtree = self.db.descendants(root_id).await?;
        if subtree.iter().any(|w| {
            w.status
                .parse::<WorkflowStatus>()
                .map(|s| s.is_active_executing())
                .unwrap_or(false)
        }) {
            return Ok(NextExecutable::Busy);
        }

        if let Some(entry) = self.db.next_executable_child(parent_id).await? {
            return Ok(NextExecutable::Ready(entry));
        }

        let entries = self.db.queue_entries(parent_id).await?;
        if entries.iter().any(|e| e.status == "in_progress") {
            return Ok(NextExecutable::Busy);
        }

        let all_terminal = entries.iter().all(|e| {
            matches!(
                e.status.as_str(),
                "completed" | "failed" | "skipped" | "cancelled"
            )
        });
        if all_terminal {
            return Ok(NextExecutable::Drained);
        }

        Ok(NextExecutable::Deadlock)
    }

    /// Advance `parent`'s queue under the tree lock.
    ///
    /// Returns the id of the next child to execute, with the lock retained
    /// for the caller. Returns `None` when there is nothing to execute right
    /// now (busy, terminal, or deadlocked); the lock is released on every
    /// `None` and error path.
    pub fn advance(&self, parent_id: i64) -> BoxFuture<'_, Result<Option<i64>>> {
        Box::pin(async move {
            let root_id = self.db.root_of(parent_id).await?;
            if !self.lock.acquire(root_id, self.config.lock_ttl).await? {
                // Another process holds this tree; it will advance.
                return Ok(None);
            }

            match self.advance_locked(parent_id, root_id).await {
                Ok(next) => Ok(next),
                Err(e) => {
                    self.lock.release(root_id).await.ok();
                    Err(e)
                }
            }
        })
    }

    async fn advance_locked(&self, parent_id: i64, root_id: i64) -> Result<Option<i64>> {
        let next = self.next_executable(parent_id, root_id).await?;

        // A failure anywhere below poisons the parent before anything else
        // runs: siblings after a failed one are never executed.
        if !matches!(next, NextExecutable::Busy) {
            if let Some(failed_id) = self.db.subtree_first_failure(parent_id).await? {
                return self.propagate_failure(parent_id, root_id, failed_id).await;
            }
        }

        let deadlocked = matches!(next, NextExecutable::Deadlock);
        match next {
            NextExecutable::Ready(entry) => {
                self.db
                    .update_queue_entry_status(entry.id, QueueEntryStatus::InProgress, None)
                    .await?;
                info!(
                    parent_workflow_id = parent_id,
                    child_workflow_id = entry.child_workflow_id,
                    execution_order = entry.execution_order,
                    "queue entry selected for execution"
                );
                // Lock retained: the caller executes this child under it.
                Ok(Some(entry.child_workflow_id))
            }
            NextExecutable::Busy => {
                self.lock.release(root_id).await?;
                Ok(None)
            }
            NextExecutable::Drained | NextExecutable::Deadlock => {
                if !deadlocked && self.is_recursively_complete(parent_id).await? {
                    return self.complete_parent(parent_id, root_id).await;
                }

                if deadlocked {
                    warn!(
                        parent_workflow_id = parent_id,
                        "queue has only pending entries with unsatisfiable dependencies; \
                         suspected deadlock - retry or skip to make progress"
                    );
                }

                self.lock.release(root_id).await?;
                Ok(None)
            }
        }
    }

    /// A failed descendant poisons the parent: mark it failed, mark its own
    /// queue entry failed, then keep propagating upward.
    async fn propagate_failure(
        &self,
        parent_id: i64,
        root_id: i64,
        failed_descendant: i64,
    ) -> Result<Option<i64>> {
        let error = format!("child workflow {} failed", failed_descendant);
        warn!(
            parent_workflow_id = parent_id,
            failed_descendant, "propagating failure to parent"
        );

        self.db
            .update_workflow_status(parent_id, WorkflowStatus::Failed)
            .await?;
        self.events
            .publish(WorkflowEvent::WorkflowFailed {
                workflow_id: parent_id,
                error: error.clone(),
            })
            .await;

        let grandparent = self
            .db
            .get_workflow(parent_id)
            .await?
            .and_then(|w| w.parent_workflow_id);

        if let Some(entry) = self.db.queue_entry_for_child(parent_id).await? {
            self.db
                .update_queue_entry_status(entry.id, QueueEntryStatus::Failed, Some(&error))
                .await?;
        }

        self.lock.release(root_id).await?;

        match grandparent {
            Some(grandparent_id) => self.advance(grandparent_id).await,
            None => Ok(None),
        }
    }

    /// All children done and none failed: complete the parent and cascade.
    async fn complete_parent(&self, parent_id: i64, root_id: i64) -> Result<Option<i64>> {
        info!(parent_workflow_id = parent_id, "all children complete");

        self.db
            .update_workflow_status(parent_id, WorkflowStatus::Completed)
            .await?;
        self.events
            .publish(WorkflowEvent::WorkflowUpdated {
                workflow_id: parent_id,
                status: "completed".to_string(),
            })
            .await;

        let grandparent = self
            .db
            .get_workflow(parent_id)
            .await?
            .and_then(|w| w.parent_workflow_id);

        if let Some(entry) = self.db.queue_entry_for_child(parent_id).await? {
            self.db
                .update_queue_entry_status(entry.id, QueueEntryStatus::Completed, None)
                .await?;
        }

        self.lock.release(root_id).await?;

        match grandparent {
            Some(grandparent_id) => self.advance(grandparent_id).await,
            None => Ok(None),
        }
    }

    /// Completion requires: no pending/in_progress entries, no failed
    /// entries, and every completed child that has its own queue is itself
    /// recursively complete.
    fn is_recursively_complete(&self, parent_id: i64) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let entries = self.db.queue_entries(parent_id).await?;

            for entry in &entries {
                match entry.status.as_str() {
                    "pending" | "in_progress" | "failed" => return Ok(false),
                    _ => {}
                }
            }

            for entry in entries.iter().filter(|e| e.status == "completed") {
                if self.db.has_queue_entries(entry.child_workflow_id).await?
                    && !self
                        .is_recursively_complete(entry.child_workflow_id)
                        .await?
                {
                    return Ok(false);
                }
            }

            Ok(true)
        })
    }
}
