// Repository layer for database operations
//
// Single-row mutations are atomic statements; multi-row operations (child
// creation, rewind deletion) wrap in a transaction. Status writes keep the
// completed_at invariant: set iff the target status is terminal.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use taskforge_core::{
    AgentExecutionStatus, QueueEntryStatus, QueueStatus, WorkflowStatus, MAX_TREE_DEPTH,
};

use crate::models::*;

const WORKFLOW_COLUMNS: &str = "id, workflow_type, target_module, status, payload, plan_json, branch_name, parent_workflow_id, workflow_depth, execution_order, auto_execute_children, is_paused, pause_reason, checkpoint_commit, checkpoint_created_at, created_at, updated_at, completed_at";

const QUEUE_COLUMNS: &str = "id, parent_workflow_id, child_workflow_id, execution_order, status, depends_on, error_message, created_at, started_at, completed_at";

const AGENT_EXECUTION_COLUMNS: &str = "id, workflow_id, agent_type, status, input, output, error_message, retry_count, started_at, completed_at, created_at";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============================================
    // Workflows
    // ============================================

    /// Create a root workflow (depth 0, no parent).
    pub async fn create_workflow(&self, input: CreateWorkflow) -> Result<WorkflowRow> {
        let sql = format!(
            "INSERT INTO workflows (workflow_type, target_module, payload, branch_name, auto_execute_children)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {WORKFLOW_COLUMNS}"
        );
        let row = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(&input.workflow_type)
            .bind(&input.target_module)
            .bind(&input.payload)
            .bind(&input.branch_name)
            .bind(input.auto_execute_children)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    /// Create a child workflow plus its queue entry in one transaction.
    pub async fn create_child_workflow(
        &self,
        parent: &WorkflowRow,
        input: CreateWorkflow,
        execution_order: i32,
        depends_on: &[i32],
    ) -> Result<(WorkflowRow, QueueEntryRow)> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO workflows (workflow_type, target_module, payload, branch_name, auto_execute_children, parent_workflow_id, workflow_depth, execution_order)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {WORKFLOW_COLUMNS}"
        );
        let child = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(&input.workflow_type)
            .bind(&input.target_module)
            .bind(&input.payload)
            .bind(&input.branch_name)
            .bind(input.auto_execute_children)
            .bind(parent.id)
            .bind(parent.workflow_depth + 1)
            .bind(execution_order)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO workflow_queue (parent_workflow_id, child_workflow_id, execution_order, depends_on)
             VALUES ($1, $2, $3, $4)
             RETURNING {QUEUE_COLUMNS}"
        );
        let entry = sqlx::query_as::<_, QueueEntryRow>(&sql)
            .bind(parent.id)
            .bind(child.id)
            .bind(execution_order)
            .bind(serde_json::json!(depends_on))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((child, entry))
    }

    pub async fn get_workflow(&self, id: i64) -> Result<Option<WorkflowRow>> {
        let sql = format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1");
        let row = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    pub async fn list_root_workflows(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowRow>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {WORKFLOW_COLUMNS} FROM workflows
                     WHERE parent_workflow_id IS NULL AND status = $1
                     ORDER BY created_at DESC
                     LIMIT $2 OFFSET $3"
                );
                sqlx::query_as::<_, WorkflowRow>(&sql)
                    .bind(status)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {WORKFLOW_COLUMNS} FROM workflows
                     WHERE parent_workflow_id IS NULL
                     ORDER BY created_at DESC
                     LIMIT $1 OFFSET $2"
                );
                sqlx::query_as::<_, WorkflowRow>(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows)
    }

    pub async fn list_children(&self, parent_id: i64) -> Result<Vec<WorkflowRow>> {
        let sql = format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows
             WHERE parent_workflow_id = $1
             ORDER BY execution_order ASC"
        );
        let rows = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Update a workflow's status. `completed_at` is set exactly when the
    /// target status is terminal, cleared otherwise.
    pub async fn update_workflow_status(
        &self,
        id: i64,
        status: WorkflowStatus,
    ) -> Result<Option<WorkflowRow>> {
        let sql = format!(
            "UPDATE workflows
             SET status = $2,
                 completed_at = CASE WHEN $3 THEN NOW() ELSE NULL END,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {WORKFLOW_COLUMNS}"
        );
        let row = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(id)
            .bind(status.to_string())
            .bind(status.is_terminal())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    pub async fn set_paused(
        &self,
        id: i64,
        is_paused: bool,
        reason: Option<&str>,
    ) -> Result<Option<WorkflowRow>> {
        let sql = format!(
            "UPDATE workflows
             SET is_paused = $2, pause_reason = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {WORKFLOW_COLUMNS}"
        );
        let row = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(id)
            .bind(is_paused)
            .bind(reason)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    pub async fn set_plan(&self, id: i64, plan: &serde_json::Value) -> Result<()> {
        sqlx::query("UPDATE workflows SET plan_json = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(plan)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record the checkpoint commit of a successfully completed workflow.
    pub async fn promote_checkpoint(&self, id: i64, commit: &str) -> Result<Option<WorkflowRow>> {
        let sql = format!(
            "UPDATE workflows
             SET checkpoint_commit = $2, checkpoint_created_at = NOW(), updated_at = NOW()
             WHERE id = $1
             RETURNING {WORKFLOW_COLUMNS}"
        );
        let row = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(id)
            .bind(commit)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// Reset a workflow to `pending` for retry/resume/rewind. Keeps
    /// `checkpoint_commit` so callers can reset source control against it.
    pub async fn reset_workflow(&self, id: i64, clear_plan: bool) -> Result<Option<WorkflowRow>> {
        let sql = format!(
            "UPDATE workflows
             SET status = 'pending',
                 completed_at = NULL,
                 is_paused = FALSE,
                 pause_reason = NULL,
                 plan_json = CASE WHEN $2 THEN NULL ELSE plan_json END,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {WORKFLOW_COLUMNS}"
        );
        let row = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(id)
            .bind(clear_plan)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// All workflows strictly below `root_id`, capped at the tree depth limit.
    pub async fn descendants(&self, root_id: i64) -> Result<Vec<WorkflowRow>> {
        let sql = format!(
            "WITH RECURSIVE subtree AS (
                 SELECT w.*, 0 AS rel_depth FROM workflows w WHERE w.parent_workflow_id = $1
                 UNION ALL
                 SELECT w.*, s.rel_depth + 1 FROM workflows w
                 JOIN subtree s ON w.parent_workflow_id = s.id
                 WHERE s.rel_depth < $2
             )
             SELECT {WORKFLOW_COLUMNS} FROM subtree
             ORDER BY workflow_depth ASC, execution_order ASC"
        );
        let rows = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(root_id)
            .bind(MAX_TREE_DEPTH as i32)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Walk `parent_workflow_id` up to the root, capped at the depth limit.
    /// On a cycle the node reached at the cap is returned rather than
    /// crashing (the cycle itself is logged as an invariant violation).
    pub async fn root_of(&self, id: i64) -> Result<i64> {
        let mut current = id;
        for _ in 0..MAX_TREE_DEPTH {
            let parent: Option<Option<i64>> =
                sqlx::query_scalar("SELECT parent_workflow_id FROM workflows WHERE id = $1")
                    .bind(current)
                    .fetch_optional(&self.pool)
                    .await?;

            match parent {
                Some(Some(parent_id)) => current = parent_id,
                Some(None) => return Ok(current),
                None => anyhow::bail!("workflow {} not found while walking to root", current),
            }
        }

        tracing::error!(
            workflow_id = id,
            reached = current,
            "parent chain exceeded depth cap; possible cycle"
        );
        Ok(current)
    }

    /// Active-executing workflows whose last update is older than `cutoff`.
    pub async fn stale_active_workflows(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<WorkflowRow>> {
        let sql = format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows
             WHERE status IN ('planning', 'coding', 'testing', 'reviewing', 'documenting', 'security_linting')
               AND updated_at < $1
             ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Active-executing workflows with no agent-execution progress since
    /// `cutoff`.
    pub async fn stuck_active_workflows(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<WorkflowRow>> {
        let sql = format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows w
             WHERE w.status IN ('planning', 'coding', 'testing', 'reviewing', 'documenting', 'security_linting')
               AND w.updated_at < $1
               AND NOT EXISTS (
                   SELECT 1 FROM agent_executions ae
                   WHERE ae.workflow_id = w.id
                     AND (ae.created_at > $1 OR ae.started_at > $1 OR ae.completed_at > $1)
               )
             ORDER BY w.id ASC"
        );
        let rows = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Workflows in the subtree rooted at `root_id` (inclusive) that carry a
    /// checkpoint commit, most recent first.
    pub async fn subtree_checkpoints(&self, root_id: i64) -> Result<Vec<WorkflowRow>> {
        let sql = format!(
            "WITH RECURSIVE subtree AS (
                 SELECT w.*, 0 AS rel_depth FROM workflows w WHERE w.id = $1
                 UNION ALL
                 SELECT w.*, s.rel_depth + 1 FROM workflows w
                 JOIN subtree s ON w.parent_workflow_id = s.id
                 WHERE s.rel_depth < $2
             )
             SELECT {WORKFLOW_COLUMNS} FROM subtree
             WHERE checkpoint_commit IS NOT NULL
             ORDER BY checkpoint_created_at DESC"
        );
        let rows = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(root_id)
            .bind(MAX_TREE_DEPTH as i32)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// First failed workflow or failed queue entry in the subtree below
    /// `parent_id`, if any.
    pub async fn subtree_first_failure(&self, parent_id: i64) -> Result<Option<i64>> {
        let failed: Option<i64> = sqlx::query_scalar(
            "WITH RECURSIVE subtree AS (
                 SELECT id, 0 AS rel_depth FROM workflows WHERE parent_workflow_id = $1
                 UNION ALL
                 SELECT w.id, s.rel_depth + 1 FROM workflows w
                 JOIN subtree s ON w.parent_workflow_id = s.id
                 WHERE s.rel_depth < $2
             )
             SELECT id FROM (
                 SELECT id FROM workflows
                 WHERE id IN (SELECT id FROM subtree) AND status = 'failed'
                 UNION
                 SELECT child_workflow_id AS id FROM workflow_queue
                 WHERE status = 'failed'
                   AND (parent_workflow_id = $1 OR parent_workflow_id IN (SELECT id FROM subtree))
             ) failures
             ORDER BY id ASC
             LIMIT 1",
        )
        .bind(parent_id)
        .bind(MAX_TREE_DEPTH as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(failed)
    }

    /// Delete the given workflows and every dependent row, in dependency
    /// order, inside one transaction. Used by checkpoint rewind.
    pub async fn delete_workflows_with_dependents(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM agent_executions WHERE workflow_id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM artifacts WHERE workflow_id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM execution_logs WHERE workflow_id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM workflow_messages WHERE workflow_id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM workflow_events WHERE workflow_id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM workflow_queue WHERE parent_workflow_id = ANY($1) OR child_workflow_id = ANY($1)",
        )
        .bind(ids)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM workflows WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    // ============================================
    // Queue entries
    // ============================================

    pub async fn queue_entries(&self, parent_id: i64) -> Result<Vec<QueueEntryRow>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM workflow_queue
             WHERE parent_workflow_id = $1
             ORDER BY execution_order ASC"
        );
        let rows = sqlx::query_as::<_, QueueEntryRow>(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    pub async fn queue_entry_for_child(&self, child_id: i64) -> Result<Option<QueueEntryRow>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM workflow_queue WHERE child_workflow_id = $1"
        );
        let row = sqlx::query_as::<_, QueueEntryRow>(&sql)
            .bind(child_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    pub async fn has_queue_entries(&self, parent_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM workflow_queue WHERE parent_workflow_id = $1)",
        )
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// The pending entry with the lowest execution_order whose dependencies
    /// are all completed, or none.
    pub async fn next_executable_child(&self, parent_id: i64) -> Result<Option<QueueEntryRow>> {
        let entries = self.queue_entries(parent_id).await?;
        Ok(select_next_executable(&entries).cloned())
    }

    /// Advance a queue entry's status. `started_at` is stamped when the entry
    /// first leaves `pending`; `completed_at` when it reaches a terminal
    /// status.
    pub async fn update_queue_entry_status(
        &self,
        entry_id: i64,
        status: QueueEntryStatus,
        error_message: Option<&str>,
    ) -> Result<Option<QueueEntryRow>> {
        let sql = format!(
            "UPDATE workflow_queue
             SET status = $2,
                 error_message = COALESCE($3, error_message),
                 started_at = CASE WHEN $2 <> 'pending' AND started_at IS NULL THEN NOW() ELSE started_at END,
                 completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END
             WHERE id = $1
             RETURNING {QUEUE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, QueueEntryRow>(&sql)
            .bind(entry_id)
            .bind(status.to_string())
            .bind(error_message)
            .bind(status.is_terminal())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// Reset a child's queue entry to `pending` for retry/resume.
    pub async fn reset_queue_entry_for_child(
        &self,
        child_id: i64,
    ) -> Result<Option<QueueEntryRow>> {
        let sql = format!(
            "UPDATE workflow_queue
             SET status = 'pending', started_at = NULL, completed_at = NULL, error_message = NULL
             WHERE child_workflow_id = $1
             RETURNING {QUEUE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, QueueEntryRow>(&sql)
            .bind(child_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    pub async fn queue_status(&self, parent_id: i64) -> Result<QueueStatus> {
        let row: QueueStatusRow = sqlx::query_as(
            "SELECT
                 COUNT(*) AS total,
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                 COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
                 COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                 COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                 COUNT(*) FILTER (WHERE status = 'skipped') AS skipped
             FROM workflow_queue
             WHERE parent_workflow_id = $1",
        )
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStatus {
            total: row.total,
            pending: row.pending,
            in_progress: row.in_progress,
            completed: row.completed,
            failed: row.failed,
            skipped: row.skipped,
        })
    }

    /// Pending entries whose parent workflow already failed or was cancelled.
    pub async fn orphaned_pending_entries(&self) -> Result<Vec<QueueEntryRow>> {
        let sql = format!(
            "SELECT {} FROM workflow_queue q
             JOIN workflows p ON p.id = q.parent_workflow_id
             WHERE q.status = 'pending' AND p.status IN ('failed', 'cancelled')
             ORDER BY q.id ASC",
            QUEUE_COLUMNS
                .split(", ")
                .map(|c| format!("q.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let rows = sqlx::query_as::<_, QueueEntryRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    // ============================================
    // Agent executions
    // ============================================

    pub async fn create_agent_execution(
        &self,
        input: CreateAgentExecution,
    ) -> Result<AgentExecutionRow> {
        let sql = format!(
            "INSERT INTO agent_executions (workflow_id, agent_type, input)
             VALUES ($1, $2, $3)
             RETURNING {AGENT_EXECUTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AgentExecutionRow>(&sql)
            .bind(input.workflow_id)
            .bind(&input.agent_type)
            .bind(&input.input)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    pub async fn update_agent_execution_status(
        &self,
        id: i64,
        status: AgentExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<Option<AgentExecutionRow>> {
        let terminal = matches!(
            status,
            AgentExecutionStatus::Completed | AgentExecutionStatus::Failed
        );
        let sql = format!(
            "UPDATE agent_executions
             SET status = $2,
                 error_message = COALESCE($3, error_message),
                 started_at = CASE WHEN $2 = 'running' AND started_at IS NULL THEN NOW() ELSE started_at END,
                 completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END
             WHERE id = $1
             RETURNING {AGENT_EXECUTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AgentExecutionRow>(&sql)
            .bind(id)
            .bind(status.to_string())
            .bind(error_message)
            .bind(terminal)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    pub async fn set_agent_execution_output(
        &self,
        id: i64,
        output: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query("UPDATE agent_executions SET output = $2 WHERE id = $1")
            .bind(id)
            .bind(output)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn agent_executions_for_workflow(
        &self,
        workflow_id: i64,
    ) -> Result<Vec<AgentExecutionRow>> {
        let sql = format!(
            "SELECT {AGENT_EXECUTION_COLUMNS} FROM agent_executions
             WHERE workflow_id = $1
             ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, AgentExecutionRow>(&sql)
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Running executions started before `cutoff` (reaper input).
    pub async fn timed_out_agent_executions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AgentExecutionRow>> {
        let sql = format!(
            "SELECT {AGENT_EXECUTION_COLUMNS} FROM agent_executions
             WHERE status = 'running' AND started_at IS NOT NULL AND started_at < $1
             ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, AgentExecutionRow>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Fail every running execution of a workflow (recovery, runner cleanup).
    pub async fn fail_running_executions(
        &self,
        workflow_id: i64,
        reason: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE agent_executions
             SET status = 'failed', error_message = $2, completed_at = NOW()
             WHERE workflow_id = $1 AND status = 'running'",
        )
        .bind(workflow_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ============================================
    // Artifacts
    // ============================================

    pub async fn create_artifact(&self, input: CreateArtifact) -> Result<ArtifactRow> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            "INSERT INTO artifacts (workflow_id, agent_execution_id, artifact_type, file_path, content, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, workflow_id, agent_execution_id, artifact_type, file_path, content, metadata, created_at",
        )
        .bind(input.workflow_id)
        .bind(input.agent_execution_id)
        .bind(&input.artifact_type)
        .bind(&input.file_path)
        .bind(&input.content)
        .bind(&input.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn artifacts_for_workflow(&self, workflow_id: i64) -> Result<Vec<ArtifactRow>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT id, workflow_id, agent_execution_id, artifact_type, file_path, content, metadata, created_at
             FROM artifacts
             WHERE workflow_id = $1
             ORDER BY id ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Messages
    // ============================================

    pub async fn create_message(&self, input: CreateMessage) -> Result<MessageRow> {
        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO workflow_messages (workflow_id, agent_execution_id, message_type, agent_type, content, metadata, action_type, action_status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id, workflow_id, agent_execution_id, message_type, agent_type, content, metadata, action_type, action_status, created_at",
        )
        .bind(input.workflow_id)
        .bind(input.agent_execution_id)
        .bind(&input.message_type)
        .bind(&input.agent_type)
        .bind(&input.content)
        .bind(&input.metadata)
        .bind(&input.action_type)
        .bind(&input.action_status)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn messages_for_workflow(
        &self,
        workflow_id: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, workflow_id, agent_execution_id, message_type, agent_type, content, metadata, action_type, action_status, created_at
             FROM workflow_messages
             WHERE workflow_id = $1
             ORDER BY created_at ASC
             LIMIT $2",
        )
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// The earliest pending actionable user message, consumed in created_at
    /// order by the interrupt poller.
    pub async fn earliest_pending_actionable(
        &self,
        workflow_id: i64,
    ) -> Result<Option<MessageRow>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, workflow_id, agent_execution_id, message_type, agent_type, content, metadata, action_type, action_status, created_at
             FROM workflow_messages
             WHERE workflow_id = $1
               AND message_type = 'user'
               AND action_status = 'pending'
               AND action_type IN ('pause', 'cancel', 'redirect', 'instruction')
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn update_message_action_status(
        &self,
        id: i64,
        action_status: &str,
    ) -> Result<Option<MessageRow>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "UPDATE workflow_messages
             SET action_status = $2
             WHERE id = $1
             RETURNING id, workflow_id, agent_execution_id, message_type, agent_type, content, metadata, action_type, action_status, created_at",
        )
        .bind(id)
        .bind(action_status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ============================================
    // Execution logs
    // ============================================

    pub async fn create_execution_log(
        &self,
        input: CreateExecutionLog,
    ) -> Result<ExecutionLogRow> {
        let row = sqlx::query_as::<_, ExecutionLogRow>(
            "INSERT INTO execution_logs (workflow_id, agent_execution_id, log_level, message, metadata)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, workflow_id, agent_execution_id, log_level, message, metadata, created_at",
        )
        .bind(input.workflow_id)
        .bind(input.agent_execution_id)
        .bind(&input.log_level)
        .bind(&input.message)
        .bind(&input.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn execution_logs(
        &self,
        workflow_id: i64,
        agent_execution_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ExecutionLogRow>> {
        let rows = match agent_execution_id {
            Some(execution_id) => {
                sqlx::query_as::<_, ExecutionLogRow>(
                    "SELECT id, workflow_id, agent_execution_id, log_level, message, metadata, created_at
                     FROM execution_logs
                     WHERE workflow_id = $1 AND agent_execution_id = $2
                     ORDER BY id ASC
                     LIMIT $3",
                )
                .bind(workflow_id)
                .bind(execution_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ExecutionLogRow>(
                    "SELECT id, workflow_id, agent_execution_id, log_level, message, metadata, created_at
                     FROM execution_logs
                     WHERE workflow_id = $1
                     ORDER BY id ASC
                     LIMIT $2",
                )
                .bind(workflow_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }

    // ============================================
    // Events (SSE notification stream for UI)
    // ============================================

    pub async fn create_event(&self, input: CreateEventRow) -> Result<EventRow> {
        // Next sequence number for this workflow
        let row = sqlx::query_as::<_, EventRow>(
            "INSERT INTO workflow_events (workflow_id, sequence, event_type, data)
             VALUES ($1, COALESCE((SELECT MAX(sequence) + 1 FROM workflow_events WHERE workflow_id = $1), 1), $2, $3)
             RETURNING id, workflow_id, sequence, event_type, data, created_at",
        )
        .bind(input.workflow_id)
        .bind(&input.event_type)
        .bind(&input.data)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn events_for_workflow(
        &self,
        workflow_id: i64,
        since_sequence: Option<i32>,
    ) -> Result<Vec<EventRow>> {
        let rows = if let Some(seq) = since_sequence {
            sqlx::query_as::<_, EventRow>(
                "SELECT id, workflow_id, sequence, event_type, data, created_at
                 FROM workflow_events
                 WHERE workflow_id = $1 AND sequence > $2
                 ORDER BY sequence ASC",
            )
            .bind(workflow_id)
            .bind(seq)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, EventRow>(
                "SELECT id, workflow_id, sequence, event_type, data, created_at
                 FROM workflow_events
                 WHERE workflow_id = $1
                 ORDER BY sequence ASC",
            )
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QueueStatusRow {
    total: i64,
    pending: i64,
    in_progress: i64,
    completed: i64,
    failed: i64,
    skipped: i64,
}

/// Pure selection over one parent's queue: the pending entry with the lowest
/// execution_order whose `depends_on` orders are all `completed`. A skipped
/// dependency does not satisfy the requirement.
pub fn select_next_executable(entries: &[QueueEntryRow]) -> Option<&QueueEntryRow> {
    let mut sorted: Vec<&QueueEntryRow> = entries.iter().collect();
    sorted.sort_by_key(|e| e.execution_order);

    for entry in sorted {
        if entry.status != "pending" {
            continue;
        }
        let deps_met = entry.depends_on_orders().iter().all(|order| {
            entries
                .iter()
                .any(|e| e.execution_order == *order && e.status == "completed")
        });
        if deps_met {
            return Some(entry);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(order: i32, status: &str, depends_on: &[i32]) -> QueueEntryRow {
        QueueEntryRow {
            id: order as i64 + 100,
            parent_workflow_id: 1,
            child_workflow_id: order as i64 + 200,
            execution_order: order,
            status: status.to_string(),
            depends_on: serde_json::json!(depends_on),
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn selects_lowest_pending_order() {
        let entries = vec![
            entry(0, "completed", &[]),
            entry(1, "pending", &[]),
            entry(2, "pending", &[]),
        ];
        let next = select_next_executable(&entries).unwrap();
        assert_eq!(next.execution_order, 1);
    }

    #[test]
    fn unmet_dependency_blocks_entry() {
        let entries = vec![entry(0, "pending", &[]), entry(1, "pending", &[0])];
        let next = select_next_executable(&entries).unwrap();
        assert_eq!(next.execution_order, 0);
    }

    #[test]
    fn completed_dependency_unblocks_entry() {
        let entries = vec![entry(0, "completed", &[]), entry(1, "pending", &[0])];
        let next = select_next_executable(&entries).unwrap();
        assert_eq!(next.execution_order, 1);
    }

    #[test]
    fn skipped_dependency_does_not_satisfy() {
        let entries = vec![entry(0, "skipped", &[]), entry(1, "pending", &[0])];
        assert!(select_next_executable(&entries).is_none());
    }

    #[test]
    fn no_pending_entries_returns_none() {
        let entries = vec![entry(0, "completed", &[]), entry(1, "failed", &[])];
        assert!(select_next_executable(&entries).is_none());
    }

    #[test]
    fn dependency_order_can_precede_out_of_order_ids() {
        // Dependency declared on a later-created but lower-order sibling
        let entries = vec![
            entry(2, "pending", &[1]),
            entry(1, "completed", &[]),
            entry(0, "completed", &[]),
        ];
        let next = select_next_executable(&entries).unwrap();
        assert_eq!(next.execution_order, 2);
    }
}
