// Interrupt protocol: pause/cancel/redirect/instruction signals polled
// between agent steps
//
// Signals travel through the workflow_messages table and are consumed in
// created_at order. Cancellation is cooperative - nothing here kills a
// running agent.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use taskforge_core::{
    ActionStatus, ActionType, InterruptKind, InterruptSignal, MessageType, OrchestratorError,
    Result, WorkflowEvent, WorkflowStatus,
};
use taskforge_storage::{CreateMessage, Database, EventPublisher};

/// Why a pause wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseWait {
    Unpaused,
    /// A new actionable message (or a direct cancellation on the workflow
    /// row) arrived mid-pause; the caller's poll loop consumes it.
    Interrupted,
    TimedOut,
}

#[derive(Clone)]
pub struct Interrupts {
    db: Database,
    events: EventPublisher,
    poll_interval: Duration,
}

impl Interrupts {
    pub fn new(db: Database, events: EventPublisher, poll_interval: Duration) -> Self {
        Self {
            db,
            events,
            poll_interval,
        }
    }

    /// The earliest pending actionable user message, if any; otherwise a
    /// synthesized pause signal when the workflow is flagged paused.
    pub async fn check(&self, workflow_id: i64) -> Result<Option<InterruptSignal>> {
        if let Some(message) = self.db.earliest_pending_actionable(workflow_id).await? {
            let action: ActionType = message
                .action_type
                .parse()
                .map_err(OrchestratorError::invariant)?;
            // The query only returns actionable types.
            let kind = InterruptKind::from_action(action).ok_or_else(|| {
                OrchestratorError::invariant(format!(
                    "non-actionable message {} returned from pending scan",
                    message.id
                ))
            })?;
            return Ok(Some(InterruptSignal {
                message_id: message.id,
                kind,
                content: message.content,
                metadata: message.metadata,
            }));
        }

        let workflow = self
            .db
            .get_workflow(workflow_id)
            .await?
            .ok_or(OrchestratorError::NotFound(workflow_id))?;
        if workflow.is_paused {
            return Ok(Some(InterruptSignal::synthesized_pause()));
        }

        Ok(None)
    }

    /// Flag the workflow paused, leave a system message, emit the event.
    pub async fn pause(&self, workflow_id: i64, reason: Option<&str>) -> Result<()> {
        self.db.set_paused(workflow_id, true, reason).await?;
        self.system_message(
            workflow_id,
            match reason {
                Some(reason) => format!("workflow paused: {}", reason),
                None => "workflow paused".to_string(),
            },
        )
        .await?;
        self.events
            .publish(WorkflowEvent::WorkflowPaused {
                workflow_id,
                reason: reason.map(str::to_string),
            })
            .await;
        info!(workflow_id, "workflow paused");
        Ok(())
    }

    /// Clear the paused flag, leave a system message, emit the event.
    pub async fn unpause(&self, workflow_id: i64) -> Result<()> {
        self.db.set_paused(workflow_id, false, None).await?;
        self.system_message(workflow_id, "workflow resumed".to_string())
            .await?;
        self.events
            .publish(WorkflowEvent::WorkflowUnpaused { workflow_id })
            .await;
        info!(workflow_id, "workflow unpaused");
        Ok(())
    }

    /// Mark a consumed signal processed. Message id 0 is the synthesized
    /// pause signal, which has no row to update.
    pub async fn mark_processed(&self, message_id: i64) -> Result<()> {
        if message_id == 0 {
            return Ok(());
        }
        self.db
            .update_message_action_status(message_id, &ActionStatus::Processed.to_string())
            .await?;
        Ok(())
    }

    /// Poll until the workflow is unpaused, a new signal arrives, or the
    /// timeout elapses. Cancel/redirect/instruction posted mid-pause must
    /// not sit invisible until unpause: each tick also looks at the pending
    /// message queue and at the workflow row itself (a DELETE writes
    /// `cancelled` straight to the row).
    pub async fn wait_while_paused(
        &self,
        workflow_id: i64,
        timeout: Duration,
    ) -> Result<PauseWait> {
        let deadline = Instant::now() + timeout;
        loop {
            let workflow = self
                .db
                .get_workflow(workflow_id)
                .await?
                .ok_or(OrchestratorError::NotFound(workflow_id))?;
            if !workflow.is_paused {
                return Ok(PauseWait::Unpaused);
            }
            if workflow.status == WorkflowStatus::Cancelled.to_string() {
                return Ok(PauseWait::Interrupted);
            }
            if self
                .db
                .earliest_pending_actionable(workflow_id)
                .await?
                .is_some()
            {
                return Ok(PauseWait::Interrupted);
            }
            if Instant::now() >= deadline {
                return Ok(PauseWait::TimedOut);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn system_message(&self, workflow_id: i64, content: String) -> Result<()> {
        let message = self
            .db
            .create_message(CreateMessage {
                workflow_id,
                agent_execution_id: None,
                message_type: MessageType::System.to_string(),
                agent_type: None,
                content,
                metadata: serde_json::json!({}),
                action_type: ActionType::Comment.to_string(),
                action_status: ActionStatus::Processed.to_string(),
            })
            .await?;
        self.events
            .publish(WorkflowEvent::MessageNew {
                workflow_id,
                message_id: message.id,
                message_type: message.message_type,
                action_type: message.action_type,
            })
            .await;
        Ok(())
    }
}
