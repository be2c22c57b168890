// Database-backed event publisher
//
// Lifecycle events are stored with auto-incrementing sequence numbers per
// workflow, enabling SSE streaming and event replay. Publishing is best
// effort from the orchestrator's point of view: a failed event write is
// logged, never turned into a workflow failure.

use anyhow::Result;

use taskforge_core::WorkflowEvent;

use crate::models::CreateEventRow;
use crate::repositories::Database;

#[derive(Clone)]
pub struct EventPublisher {
    db: Database,
}

impl EventPublisher {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist an event, returning its sequence number.
    pub async fn emit(&self, event: WorkflowEvent) -> Result<i32> {
        let row = self
            .db
            .create_event(CreateEventRow {
                workflow_id: event.workflow_id(),
                event_type: event.event_type().to_string(),
                data: event.to_json(),
            })
            .await?;

        Ok(row.sequence)
    }

    /// Emit and swallow failures (with a warning). Used on paths where the
    /// state transition has already committed and must not be rolled back
    /// because a notification write hiccuped.
    pub async fn publish(&self, event: WorkflowEvent) {
        let event_type = event.event_type();
        let workflow_id = event.workflow_id();
        if let Err(e) = self.emit(event).await {
            tracing::warn!(
                workflow_id,
                event_type,
                error = %e,
                "failed to persist workflow event"
            );
        }
    }
}
