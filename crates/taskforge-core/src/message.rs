// Conversation message domain types
//
// The messages table doubles as the interrupt channel: user messages with an
// actionable action_type start `pending` and the orchestrator consumes them
// between agent steps, in created_at order.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Agent,
    System,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::User => "user",
            MessageType::Agent => "agent",
            MessageType::System => "system",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageType::User),
            "agent" => Ok(MessageType::Agent),
            "system" => Ok(MessageType::System),
            other => Err(format!("unknown message type: {}", other)),
        }
    }
}

/// What a message asks the orchestrator to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Comment,
    Instruction,
    Pause,
    Resume,
    Cancel,
    Redirect,
}

impl ActionType {
    /// Actionable types enter the queue as `pending` and must be driven to a
    /// terminal action_status exactly once.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            ActionType::Pause | ActionType::Cancel | ActionType::Redirect | ActionType::Instruction
        )
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionType::Comment => "comment",
            ActionType::Instruction => "instruction",
            ActionType::Pause => "pause",
            ActionType::Resume => "resume",
            ActionType::Cancel => "cancel",
            ActionType::Redirect => "redirect",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "comment" => Ok(ActionType::Comment),
            "instruction" => Ok(ActionType::Instruction),
            "pause" => Ok(ActionType::Pause),
            "resume" => Ok(ActionType::Resume),
            "cancel" => Ok(ActionType::Cancel),
            "redirect" => Ok(ActionType::Redirect),
            other => Err(format!("unknown action type: {}", other)),
        }
    }
}

/// Processing state of an actionable message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Acknowledged,
    Processed,
    Ignored,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Acknowledged => "acknowledged",
            ActionStatus::Processed => "processed",
            ActionStatus::Ignored => "ignored",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "acknowledged" => Ok(ActionStatus::Acknowledged),
            "processed" => Ok(ActionStatus::Processed),
            "ignored" => Ok(ActionStatus::Ignored),
            other => Err(format!("unknown action status: {}", other)),
        }
    }
}

/// The interrupt kinds an agent step polls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    Pause,
    Cancel,
    Redirect,
    Instruction,
}

impl InterruptKind {
    pub fn from_action(action: ActionType) -> Option<Self> {
        match action {
            ActionType::Pause => Some(InterruptKind::Pause),
            ActionType::Cancel => Some(InterruptKind::Cancel),
            ActionType::Redirect => Some(InterruptKind::Redirect),
            ActionType::Instruction => Some(InterruptKind::Instruction),
            ActionType::Comment | ActionType::Resume => None,
        }
    }
}

/// A pending signal delivered to the agent runner between steps.
///
/// `message_id` is 0 for pause signals synthesized from `is_paused` rather
/// than read from a message row.
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    pub message_id: i64,
    pub kind: InterruptKind,
    pub content: String,
    pub metadata: serde_json::Value,
}

impl InterruptSignal {
    pub fn synthesized_pause() -> Self {
        Self {
            message_id: 0,
            kind: InterruptKind::Pause,
            content: String::new(),
            metadata: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actionable_types() {
        assert!(ActionType::Pause.is_actionable());
        assert!(ActionType::Cancel.is_actionable());
        assert!(ActionType::Redirect.is_actionable());
        assert!(ActionType::Instruction.is_actionable());
        assert!(!ActionType::Comment.is_actionable());
        assert!(!ActionType::Resume.is_actionable());
    }

    #[test]
    fn interrupt_kind_from_action() {
        assert_eq!(
            InterruptKind::from_action(ActionType::Pause),
            Some(InterruptKind::Pause)
        );
        assert_eq!(InterruptKind::from_action(ActionType::Comment), None);
        assert_eq!(InterruptKind::from_action(ActionType::Resume), None);
    }

    #[test]
    fn synthesized_pause_has_zero_id() {
        let signal = InterruptSignal::synthesized_pause();
        assert_eq!(signal.message_id, 0);
        assert_eq!(signal.kind, InterruptKind::Pause);
    }
}
