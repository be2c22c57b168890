// Agent abstractions
//
// Agents are opaque to the orchestrator: each is a callable that takes an
// input record and returns `{success, artifacts, summary}`. The registry
// binds agent types to implementations at process start - there is no
// runtime path-based loading.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::artifact::ArtifactType;
use crate::error::Result;
use crate::workflow::{WorkflowStatus, WorkflowType};

/// The specialized agents plus the orchestrator itself (used when the
/// orchestrator records its own executions, e.g. during recovery).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Plan,
    Code,
    SecurityLint,
    Test,
    Review,
    Document,
    Scaffold,
    ModuleImport,
    Orchestrator,
}

impl AgentType {
    /// The workflow status set while this agent runs.
    ///
    /// Scaffold and module_import are working-directory preparation steps;
    /// they execute under `coding` since the active-executing statuses are
    /// a closed set of six.
    pub fn workflow_status(&self) -> WorkflowStatus {
        match self {
            AgentType::Plan => WorkflowStatus::Planning,
            AgentType::Code => WorkflowStatus::Coding,
            AgentType::SecurityLint => WorkflowStatus::SecurityLinting,
            AgentType::Test => WorkflowStatus::Testing,
            AgentType::Review => WorkflowStatus::Reviewing,
            AgentType::Document => WorkflowStatus::Documenting,
            AgentType::Scaffold => WorkflowStatus::Coding,
            AgentType::ModuleImport => WorkflowStatus::Coding,
            AgentType::Orchestrator => WorkflowStatus::Running,
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentType::Plan => "plan",
            AgentType::Code => "code",
            AgentType::SecurityLint => "security_lint",
            AgentType::Test => "test",
            AgentType::Review => "review",
            AgentType::Document => "document",
            AgentType::Scaffold => "scaffold",
            AgentType::ModuleImport => "module_import",
            AgentType::Orchestrator => "orchestrator",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "plan" => Ok(AgentType::Plan),
            "code" => Ok(AgentType::Code),
            "security_lint" => Ok(AgentType::SecurityLint),
            "test" => Ok(AgentType::Test),
            "review" => Ok(AgentType::Review),
            "document" => Ok(AgentType::Document),
            "scaffold" => Ok(AgentType::Scaffold),
            "module_import" => Ok(AgentType::ModuleImport),
            "orchestrator" => Ok(AgentType::Orchestrator),
            other => Err(format!("unknown agent type: {}", other)),
        }
    }
}

/// The fixed agent sequence executed for a leaf workflow of the given type.
pub fn agent_sequence(workflow_type: WorkflowType) -> &'static [AgentType] {
    use AgentType::*;
    match workflow_type {
        WorkflowType::Feature => &[Plan, Code, SecurityLint, Test, Review, Document],
        WorkflowType::Bugfix => &[Plan, Code, Test, Review],
        WorkflowType::Refactor => &[Plan, Code, Test, Review, Document],
        WorkflowType::Documentation => &[Document],
        WorkflowType::Review => &[Review],
        WorkflowType::NewModule => &[
            Scaffold,
            ModuleImport,
            Plan,
            Code,
            Test,
            Review,
            Document,
        ],
        WorkflowType::Dockerize => &[Plan, Code, Review],
    }
}

/// Status of one agent execution record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AgentExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for AgentExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentExecutionStatus::Pending => "pending",
            AgentExecutionStatus::Running => "running",
            AgentExecutionStatus::Completed => "completed",
            AgentExecutionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AgentExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AgentExecutionStatus::Pending),
            "running" => Ok(AgentExecutionStatus::Running),
            "completed" => Ok(AgentExecutionStatus::Completed),
            "failed" => Ok(AgentExecutionStatus::Failed),
            other => Err(format!("unknown agent execution status: {}", other)),
        }
    }
}

/// An artifact as exchanged with an agent (both directions: prior artifacts
/// in, produced artifacts out).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AgentArtifact {
    pub artifact_type: ArtifactType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// The input record handed to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    pub workflow_id: i64,
    pub working_dir: PathBuf,
    pub task_description: String,
    #[serde(default)]
    pub prior_artifacts: Vec<AgentArtifact>,
    /// User instructions injected via the conversation thread since the
    /// previous step.
    #[serde(default)]
    pub pending_instructions: Vec<String>,
}

/// What an agent reports back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub success: bool,
    #[serde(default)]
    pub artifacts: Vec<AgentArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// An opaque agent callable with a bounded runtime.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn execute(&self, input: AgentInput) -> Result<AgentOutput>;
}

/// Maps agent types to implementations. Populated once at process start
/// from configuration; immutable afterwards.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentType, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_type: AgentType, agent: Arc<dyn Agent>) {
        self.agents.insert(agent_type, agent);
    }

    pub fn get(&self, agent_type: AgentType) -> Option<Arc<dyn Agent>> {
        self.agents.get(&agent_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<AgentType> {
        self.agents.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sequences_match_workflow_types() {
        assert_eq!(
            agent_sequence(WorkflowType::Feature),
            &[
                AgentType::Plan,
                AgentType::Code,
                AgentType::SecurityLint,
                AgentType::Test,
                AgentType::Review,
                AgentType::Document
            ]
        );
        assert_eq!(
            agent_sequence(WorkflowType::Bugfix),
            &[
                AgentType::Plan,
                AgentType::Code,
                AgentType::Test,
                AgentType::Review
            ]
        );
        assert_eq!(
            agent_sequence(WorkflowType::Documentation),
            &[AgentType::Document]
        );
        assert_eq!(agent_sequence(WorkflowType::Review), &[AgentType::Review]);
        assert_eq!(agent_sequence(WorkflowType::NewModule).len(), 7);
        assert_eq!(
            agent_sequence(WorkflowType::Dockerize),
            &[AgentType::Plan, AgentType::Code, AgentType::Review]
        );
    }

    #[test]
    fn agent_status_mapping() {
        assert_eq!(AgentType::Plan.workflow_status(), WorkflowStatus::Planning);
        assert_eq!(
            AgentType::SecurityLint.workflow_status(),
            WorkflowStatus::SecurityLinting
        );
        assert_eq!(AgentType::Scaffold.workflow_status(), WorkflowStatus::Coding);
        assert_eq!(
            AgentType::ModuleImport.workflow_status(),
            WorkflowStatus::Coding
        );
    }

    #[test]
    fn agent_type_round_trip() {
        for agent in [
            AgentType::Plan,
            AgentType::Code,
            AgentType::SecurityLint,
            AgentType::Test,
            AgentType::Review,
            AgentType::Document,
            AgentType::Scaffold,
            AgentType::ModuleImport,
            AgentType::Orchestrator,
        ] {
            assert_eq!(AgentType::from_str(&agent.to_string()).unwrap(), agent);
        }
    }

    #[test]
    fn agent_output_deserializes_with_defaults() {
        let output: AgentOutput = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(output.success);
        assert!(output.artifacts.is_empty());
        assert_eq!(output.summary, None);
    }

    #[test]
    fn registry_lookup() {
        struct Nop;

        #[async_trait]
        impl Agent for Nop {
            async fn execute(&self, _input: AgentInput) -> crate::Result<AgentOutput> {
                Ok(AgentOutput {
                    success: true,
                    artifacts: vec![],
                    summary: None,
                })
            }
        }

        let mut registry = AgentRegistry::new();
        registry.register(AgentType::Plan, Arc::new(Nop));
        assert!(registry.get(AgentType::Plan).is_some());
        assert!(registry.get(AgentType::Code).is_none());
    }
}
