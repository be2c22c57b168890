// Workflow domain types
//
// A workflow is one node of the execution tree. Leaves run a fixed agent
// sequence; parents wait on their children's queue.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Maximum depth of the workflow tree, also the cap when walking
/// `parent_workflow_id` upward (defends against reference cycles).
pub const MAX_TREE_DEPTH: usize = 20;

/// The kind of development task a workflow carries out.
///
/// Each type maps to a fixed agent sequence, see [`crate::agent_sequence`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Feature,
    Bugfix,
    Refactor,
    Documentation,
    Review,
    NewModule,
    Dockerize,
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowType::Feature => "feature",
            WorkflowType::Bugfix => "bugfix",
            WorkflowType::Refactor => "refactor",
            WorkflowType::Documentation => "documentation",
            WorkflowType::Review => "review",
            WorkflowType::NewModule => "new_module",
            WorkflowType::Dockerize => "dockerize",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feature" => Ok(WorkflowType::Feature),
            "bugfix" => Ok(WorkflowType::Bugfix),
            "refactor" => Ok(WorkflowType::Refactor),
            "documentation" => Ok(WorkflowType::Documentation),
            "review" => Ok(WorkflowType::Review),
            "new_module" => Ok(WorkflowType::NewModule),
            "dockerize" => Ok(WorkflowType::Dockerize),
            other => Err(format!("unknown workflow type: {}", other)),
        }
    }
}

/// Workflow lifecycle status.
///
/// The six agent-phase statuses (`Planning` through `SecurityLinting`) are
/// "active-executing": exactly one workflow per tree may hold one of them at
/// a time. `Running` means waiting-for-children, `PendingFix` means waiting
/// on a bugfix subtree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Planning,
    Coding,
    Testing,
    Reviewing,
    Documenting,
    SecurityLinting,
    Running,
    PendingFix,
    Completed,
    Failed,
    Cancelled,
}

/// The active-executing statuses, in no particular order.
pub const ACTIVE_EXECUTING: [WorkflowStatus; 6] = [
    WorkflowStatus::Planning,
    WorkflowStatus::Coding,
    WorkflowStatus::Testing,
    WorkflowStatus::Reviewing,
    WorkflowStatus::Documenting,
    WorkflowStatus::SecurityLinting,
];

impl WorkflowStatus {
    /// True while an agent is (or should be) executing for this workflow.
    pub fn is_active_executing(&self) -> bool {
        ACTIVE_EXECUTING.contains(self)
    }

    /// True for the waiting states (`running`, `pending_fix`).
    pub fn is_waiting(&self) -> bool {
        matches!(self, WorkflowStatus::Running | WorkflowStatus::PendingFix)
    }

    /// Terminal statuses set `completed_at` and never change afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Planning => "planning",
            WorkflowStatus::Coding => "coding",
            WorkflowStatus::Testing => "testing",
            WorkflowStatus::Reviewing => "reviewing",
            WorkflowStatus::Documenting => "documenting",
            WorkflowStatus::SecurityLinting => "security_linting",
            WorkflowStatus::Running => "running",
            WorkflowStatus::PendingFix => "pending_fix",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "planning" => Ok(WorkflowStatus::Planning),
            "coding" => Ok(WorkflowStatus::Coding),
            "testing" => Ok(WorkflowStatus::Testing),
            "reviewing" => Ok(WorkflowStatus::Reviewing),
            "documenting" => Ok(WorkflowStatus::Documenting),
            "security_linting" => Ok(WorkflowStatus::SecurityLinting),
            "running" => Ok(WorkflowStatus::Running),
            "pending_fix" => Ok(WorkflowStatus::PendingFix),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            other => Err(format!("unknown workflow status: {}", other)),
        }
    }
}

/// A workflow's parent reference: either the tree root or a child of `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Root,
    Child(i64),
}

impl Parent {
    pub fn from_option(parent_workflow_id: Option<i64>) -> Self {
        match parent_workflow_id {
            None => Parent::Root,
            Some(id) => Parent::Child(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_string_round_trip() {
        let all = [
            WorkflowStatus::Pending,
            WorkflowStatus::Planning,
            WorkflowStatus::Coding,
            WorkflowStatus::Testing,
            WorkflowStatus::Reviewing,
            WorkflowStatus::Documenting,
            WorkflowStatus::SecurityLinting,
            WorkflowStatus::Running,
            WorkflowStatus::PendingFix,
            WorkflowStatus::Completed,
            WorkflowStatus::Failed,
            WorkflowStatus::Cancelled,
        ];
        for status in all {
            let parsed = WorkflowStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn active_executing_classification() {
        assert!(WorkflowStatus::Coding.is_active_executing());
        assert!(WorkflowStatus::SecurityLinting.is_active_executing());
        assert!(!WorkflowStatus::Running.is_active_executing());
        assert!(!WorkflowStatus::Pending.is_active_executing());
        assert!(!WorkflowStatus::PendingFix.is_active_executing());
    }

    #[test]
    fn waiting_and_terminal_are_disjoint() {
        assert!(WorkflowStatus::Running.is_waiting());
        assert!(WorkflowStatus::PendingFix.is_waiting());
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
    }

    #[test]
    fn workflow_type_parse() {
        assert_eq!(
            WorkflowType::from_str("new_module").unwrap(),
            WorkflowType::NewModule
        );
        assert_eq!(
            WorkflowType::from_str("feature").unwrap(),
            WorkflowType::Feature
        );
        assert!(WorkflowType::from_str("deploy").is_err());
    }

    #[test]
    fn parent_from_option() {
        assert_eq!(Parent::from_option(None), Parent::Root);
        assert_eq!(Parent::from_option(Some(7)), Parent::Child(7));
    }
}
