// Core domain types for the Taskforge orchestrator
//
// This crate has NO dependency on storage or HTTP - it defines the workflow
// tree vocabulary shared by the worker and the API, plus the trait seams for
// the external collaborators (agents, source control, event sink).

pub mod agent;
pub mod artifact;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod queue;
pub mod source_control;
pub mod workflow;

pub use agent::{
    agent_sequence, Agent, AgentArtifact, AgentExecutionStatus, AgentInput, AgentOutput,
    AgentRegistry, AgentType,
};
pub use artifact::ArtifactType;
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use event::WorkflowEvent;
pub use message::{ActionStatus, ActionType, InterruptKind, InterruptSignal, MessageType};
pub use queue::{QueueEntryStatus, QueueStatus};
pub use source_control::SourceControl;
pub use workflow::{Parent, WorkflowStatus, WorkflowType, ACTIVE_EXECUTING, MAX_TREE_DEPTH};
