// Agent runner: executes the fixed per-type agent sequence for one leaf
// workflow
//
// Suspension points are the interrupt poll before each step and the agent
// invocation itself; within a step execution is sequential and
// uninterruptible except by timeout.

use std::sync::Arc;

use tracing::{error, info, warn};

use taskforge_core::{
    agent_sequence, ActionStatus, ActionType, AgentArtifact, AgentExecutionStatus, AgentInput,
    AgentRegistry, AgentType, ArtifactType, InterruptKind, MessageType, OrchestratorConfig,
    OrchestratorError, Result, SourceControl, WorkflowEvent, WorkflowStatus, WorkflowType,
};
use taskforge_storage::{
    CreateAgentExecution, CreateArtifact, CreateExecutionLog, CreateMessage, CreateWorkflow,
    Database, EventPublisher, WorkflowRow,
};

use crate::interrupts::{Interrupts, PauseWait};

/// How a leaf workflow run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
    /// The user redirected the work; a replacement root workflow was created.
    Redirected { new_root_id: i64 },
}

enum InterruptOutcome {
    Continue,
    Cancelled,
    Redirected { new_root_id: i64 },
    PauseTimeout,
}

#[derive(Clone)]
pub struct AgentRunner {
    db: Database,
    registry: AgentRegistry,
    interrupts: Interrupts,
    source_control: Arc<dyn SourceControl>,
    events: EventPublisher,
    config: OrchestratorConfig,
}

impl AgentRunner {
    pub fn new(
        db: Database,
        registry: AgentRegistry,
        interrupts: Interrupts,
        source_control: Arc<dyn SourceControl>,
        events: EventPublisher,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            registry,
            interrupts,
            source_control,
            events,
            config,
        }
    }

    /// Run the whole agent sequence for a leaf workflow.
    pub async fn run(&self, workflow: &WorkflowRow) -> Result<RunOutcome> {
        let workflow_type: WorkflowType = workflow
            .workflow_type
            .parse()
            .map_err(OrchestratorError::invariant)?;
        let sequence = agent_sequence(workflow_type);

        info!(
            workflow_id = workflow.id,
            workflow_type = %workflow_type,
            steps = sequence.len(),
            "starting agent sequence"
        );

        let working_dir = self
            .source_control
            .prepare(workflow.id, &workflow.target_module)
            .await?;
        let task_description = workflow.task_description();

        let mut pending_instructions: Vec<String> = Vec::new();
        let mut last_seen_commit = self
            .source_control
            .head_commit(&working_dir)
            .await
            .unwrap_or(None);
        let mut checkpoint_candidate: Option<String> = None;

        for agent_type in sequence {
            match self
                .handle_interrupts(workflow, &mut pending_instructions)
                .await?
            {
                InterruptOutcome::Continue => {}
                InterruptOutcome::Cancelled => return Ok(RunOutcome::Cancelled),
                InterruptOutcome::Redirected { new_root_id } => {
                    return Ok(RunOutcome::Redirected { new_root_id })
                }
                InterruptOutcome::PauseTimeout => {
                    self.fail_workflow(workflow, "pause wait timed out").await?;
                    return Ok(RunOutcome::Failed);
                }
            }

            let Some(agent) = self.registry.get(*agent_type) else {
                let reason = format!("no agent registered for type {}", agent_type);
                self.fail_workflow(workflow, &reason).await?;
                return Ok(RunOutcome::Failed);
            };

            let prior_artifacts = self.prior_artifacts(workflow.id).await?;
            let input = AgentInput {
                workflow_id: workflow.id,
                working_dir: working_dir.clone(),
                task_description: task_description.clone(),
                prior_artifacts,
                pending_instructions: std::mem::take(&mut pending_instructions),
            };

            let execution = self
                .db
                .create_agent_execution(CreateAgentExecution {
                    workflow_id: workflow.id,
                    agent_type: agent_type.to_string(),
                    input: serde_json::to_value(&input)
                        .map_err(|e| OrchestratorError::invariant(e.to_string()))?,
                })
                .await?;
            self.db
                .update_agent_execution_status(execution.id, AgentExecutionStatus::Running, None)
                .await?;
            self.db
                .update_workflow_status(workflow.id, agent_type.workflow_status())
                .await?;
            self.events
                .publish(WorkflowEvent::WorkflowUpdated {
                    workflow_id: workflow.id,
                    status: agent_type.workflow_status().to_string(),
                })
                .await;
            self.events
                .publish(WorkflowEvent::AgentUpdated {
                    workflow_id: workflow.id,
                    agent_execution_id: execution.id,
                    agent_type: agent_type.to_string(),
                    status: "running".to_string(),
                })
                .await;
            self.log(
                workflow.id,
                Some(execution.id),
                "info",
                format!("agent {} started", agent_type),
            )
            .await;

            let outcome =
                tokio::time::timeout(self.config.agent_timeout, agent.execute(input)).await;

            let output = match outcome {
                Err(_elapsed) => {
                    error!(
                        workflow_id = workflow.id,
                        agent_type = %agent_type,
                        "agent exceeded its time budget"
                    );
                    self.db
                        .update_agent_execution_status(
                            execution.id,
                            AgentExecutionStatus::Failed,
                            Some("timeout"),
                        )
                        .await?;
                    self.fail_workflow(workflow, &format!("agent {} timed out", agent_type))
                        .await?;
                    return Ok(RunOutcome::Failed);
                }
                Ok(Err(e)) => {
                    self.db
                        .update_agent_execution_status(
                            execution.id,
                            AgentExecutionStatus::Failed,
                            Some(&e.to_string()),
                        )
                        .await?;
                    self.fail_workflow(
                        workflow,
                        &format!("agent {} failed: {}", agent_type, e),
                    )
                    .await?;
                    return Ok(RunOutcome::Failed);
                }
                Ok(Ok(output)) => output,
            };

            if !output.success {
                let reason = output
                    .summary
                    .clone()
                    .unwrap_or_else(|| format!("agent {} reported failure", agent_type));
                self.db
                    .update_agent_execution_status(
                        execution.id,
                        AgentExecutionStatus::Failed,
                        Some(&reason),
                    )
                    .await?;
                self.fail_workflow(workflow, &reason).await?;
                return Ok(RunOutcome::Failed);
            }

            for artifact in &output.artifacts {
                let row = self
                    .db
                    .create_artifact(CreateArtifact {
                        workflow_id: workflow.id,
                        agent_execution_id: execution.id,
                        artifact_type: artifact.artifact_type.to_string(),
                        file_path: artifact.file_path.clone(),
                        content: artifact.content.clone(),
                        metadata: artifact.metadata.clone(),
                    })
                    .await?;
                self.events
                    .publish(WorkflowEvent::ArtifactCreated {
                        workflow_id: workflow.id,
                        artifact_id: row.id,
                        artifact_type: row.artifact_type,
                    })
                    .await;
            }

            // A plan artifact doubles as the workflow's stored plan.
            if *agent_type == AgentType::Plan {
                if let Some(plan) = output
                    .artifacts
                    .iter()
                    .find(|a| a.artifact_type == ArtifactType::Plan)
                {
                    self.db
                        .set_plan(workflow.id, &serde_json::json!({ "plan": plan.content }))
                        .await?;
                }
            }

            self.db
                .set_agent_execution_output(
                    execution.id,
                    &serde_json::json!({
                        "success": true,
                        "summary": output.summary,
                        "artifact_count": output.artifacts.len(),
                    }),
                )
                .await?;
            self.db
                .update_agent_execution_status(execution.id, AgentExecutionStatus::Completed, None)
                .await?;
            self.events
                .publish(WorkflowEvent::AgentUpdated {
                    workflow_id: workflow.id,
                    agent_execution_id: execution.id,
                    agent_type: agent_type.to_string(),
                    status: "completed".to_string(),
                })
                .await;

            let summary = output
                .summary
                .clone()
                .unwrap_or_else(|| format!("{} step completed", agent_type));
            self.log(workflow.id, Some(execution.id), "info", summary.clone())
                .await;
            self.post_agent_comment(workflow.id, execution.id, *agent_type, summary)
                .await?;

            // New commits after code/test become checkpoint candidates.
            if matches!(*agent_type, AgentType::Code | AgentType::Test) {
                if let Ok(Some(head)) = self.source_control.head_commit(&working_dir).await {
                    if last_seen_commit.as_deref() != Some(head.as_str()) {
                        last_seen_commit = Some(head.clone());
                        checkpoint_candidate = Some(head);
                    }
                }
            }
        }

        if let Some(commit) = checkpoint_candidate {
            self.db.promote_checkpoint(workflow.id, &commit).await?;
        }
        self.db
            .update_workflow_status(workflow.id, WorkflowStatus::Completed)
            .await?;
        self.events
            .publish(WorkflowEvent::WorkflowUpdated {
                workflow_id: workflow.id,
                status: "completed".to_string(),
            })
            .await;
        self.log(workflow.id, None, "info", "workflow completed".to_string())
            .await;
        info!(workflow_id = workflow.id, "agent sequence completed");

        Ok(RunOutcome::Completed)
    }

    /// Consume pending signals before a step. Instructions accumulate into
    /// the next agent input; pause blocks here until unpaused or timeout.
    async fn handle_interrupts(
        &self,
        workflow: &WorkflowRow,
        pending_instructions: &mut Vec<String>,
    ) -> Result<InterruptOutcome> {
        loop {
            // A cancel written directly to the workflow row (DELETE endpoint)
            // is observed here, between steps.
            let current = self
                .db
                .get_workflow(workflow.id)
                .await?
                .ok_or(OrchestratorError::NotFound(workflow.id))?;
            if current.status == WorkflowStatus::Cancelled.to_string() {
                info!(workflow_id = workflow.id, "cancellation observed between steps");
                return Ok(InterruptOutcome::Cancelled);
            }

            let Some(signal) = self.interrupts.check(workflow.id).await? else {
                return Ok(InterruptOutcome::Continue);
            };

            match signal.kind {
                InterruptKind::Instruction => {
                    pending_instructions.push(signal.content);
                    self.interrupts.mark_processed(signal.message_id).await?;
                }
                InterruptKind::Cancel => {
                    self.interrupts.mark_processed(signal.message_id).await?;
                    self.db
                        .update_workflow_status(workflow.id, WorkflowStatus::Cancelled)
                        .await?;
                    self.events
                        .publish(WorkflowEvent::WorkflowUpdated {
                            workflow_id: workflow.id,
                            status: "cancelled".to_string(),
                        })
                        .await;
                    info!(workflow_id = workflow.id, "workflow cancelled by user");
                    return Ok(InterruptOutcome::Cancelled);
                }
                InterruptKind::Redirect => {
                    let new_root_id = self.redirect(workflow, &signal.content, &signal.metadata).await?;
                    self.interrupts.mark_processed(signal.message_id).await?;
                    return Ok(InterruptOutcome::Redirected { new_root_id });
                }
                InterruptKind::Pause => {
                    if signal.message_id != 0 {
                        let reason = if signal.content.is_empty() {
                            None
                        } else {
                            Some(signal.content.as_str())
                        };
                        self.interrupts.pause(workflow.id, reason).await?;
                        self.interrupts.mark_processed(signal.message_id).await?;
                    }
                    match self
                        .interrupts
                        .wait_while_paused(workflow.id, self.config.pause_wait_timeout)
                        .await?
                    {
                        PauseWait::TimedOut => {
                            warn!(workflow_id = workflow.id, "pause wait timed out");
                            return Ok(InterruptOutcome::PauseTimeout);
                        }
                        // Loop back either way: after unpause more signals
                        // may have queued; an interrupt (cancel/redirect/
                        // instruction mid-pause) is consumed by the next
                        // status re-read and check().
                        PauseWait::Unpaused | PauseWait::Interrupted => {}
                    }
                }
            }
        }
    }

    /// Redirect: spawn a replacement root workflow from the supplied task
    /// description and cancel the current one.
    async fn redirect(
        &self,
        workflow: &WorkflowRow,
        task_description: &str,
        metadata: &serde_json::Value,
    ) -> Result<i64> {
        let workflow_type = metadata
            .get("workflow_type")
            .and_then(|v| v.as_str())
            .unwrap_or(&workflow.workflow_type)
            .to_string();
        let target_module = metadata
            .get("target_module")
            .and_then(|v| v.as_str())
            .unwrap_or(&workflow.target_module)
            .to_string();

        let new_root = self
            .db
            .create_workflow(CreateWorkflow {
                workflow_type,
                target_module,
                payload: serde_json::json!({
                    "task_description": task_description,
                    "redirected_from": workflow.id,
                }),
                branch_name: None,
                auto_execute_children: workflow.auto_execute_children,
            })
            .await?;

        self.db
            .update_workflow_status(workflow.id, WorkflowStatus::Cancelled)
            .await?;
        self.events
            .publish(WorkflowEvent::WorkflowUpdated {
                workflow_id: workflow.id,
                status: "cancelled".to_string(),
            })
            .await;
        self.log(
            workflow.id,
            None,
            "info",
            format!("redirected to new workflow {}", new_root.id),
        )
        .await;
        info!(
            workflow_id = workflow.id,
            new_root_id = new_root.id,
            "workflow redirected"
        );

        Ok(new_root.id)
    }

    async fn fail_workflow(&self, workflow: &WorkflowRow, reason: &str) -> Result<()> {
        error!(workflow_id = workflow.id, reason, "workflow failed");
        self.db
            .fail_running_executions(workflow.id, reason)
            .await?;
        self.db
            .update_workflow_status(workflow.id, WorkflowStatus::Failed)
            .await?;
        self.events
            .publish(WorkflowEvent::WorkflowFailed {
                workflow_id: workflow.id,
                error: reason.to_string(),
            })
            .await;
        self.log(workflow.id, None, "error", reason.to_string()).await;
        Ok(())
    }

    async fn prior_artifacts(&self, workflow_id: i64) -> Result<Vec<AgentArtifact>> {
        let rows = self.db.artifacts_for_workflow(workflow_id).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let artifact_type = row.artifact_type.parse::<ArtifactType>().ok()?;
                Some(AgentArtifact {
                    artifact_type,
                    file_path: row.file_path,
                    content: row.content,
                    metadata: row.metadata,
                })
            })
            .collect())
    }

    async fn post_agent_comment(
        &self,
        workflow_id: i64,
        agent_execution_id: i64,
        agent_type: AgentType,
        content: String,
    ) -> Result<()> {
        let message = self
            .db
            .create_message(CreateMessage {
                workflow_id,
                agent_execution_id: Some(agent_execution_id),
                message_type: MessageType::Agent.to_string(),
                agent_type: Some(agent_type.to_string()),
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

    async fn log(
        &self,
        workflow_id: i64,
        agent_execution_id: Option<i64>,
        level: &str,
        message: String,
    ) {
        let result = self
            .db
            .create_execution_log(CreateExecutionLog {
                workflow_id,
                agent_execution_id,
                log_level: level.to_string(),
                message,
                metadata: None,
            })
            .await;
        if let Err(e) = result {
            warn!(workflow_id, error = %e, "failed to write execution log");
        }
    }
}
