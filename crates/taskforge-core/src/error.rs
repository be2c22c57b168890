// Error types for the orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur while driving a workflow tree
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Transient store failure (DB unreachable, query timeout)
    #[error("Store error: {0}")]
    Store(String),

    /// Transient lock-store failure
    #[error("Lock error: {0}")]
    Lock(String),

    /// Agent reported failure or threw
    #[error("Agent execution error: {0}")]
    AgentExecution(String),

    /// Agent or workflow exceeded its time budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Only pending entries remain and their dependencies can never complete
    #[error("Deadlock suspected in queue of workflow {0}")]
    DeadlockSuspected(i64),

    /// Workflow was cancelled by the user
    #[error("Workflow {0} cancelled")]
    Cancelled(i64),

    /// Defensive: a data-model invariant failed (e.g. a parent cycle)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Workflow does not exist
    #[error("Workflow not found: {0}")]
    NotFound(i64),

    /// Request is valid but the workflow is in an incompatible state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        OrchestratorError::Store(msg.into())
    }

    /// Create a lock error
    pub fn lock(msg: impl Into<String>) -> Self {
        OrchestratorError::Lock(msg.into())
    }

    /// Create an agent execution error
    pub fn agent(msg: impl Into<String>) -> Self {
        OrchestratorError::AgentExecution(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        OrchestratorError::Timeout(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        OrchestratorError::InvariantViolation(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        OrchestratorError::InvalidState(msg.into())
    }

    /// True for failures worth a bounded local retry (infrastructure hiccups).
    pub fn is_transient(&self) -> bool {
        matches!(self, OrchestratorError::Store(_) | OrchestratorError::Lock(_))
    }
}
