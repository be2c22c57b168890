// Queue entry domain types
//
// One entry per child workflow in its parent's queue. Entries advance
// strictly forward and in `execution_order`.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Status of a queue entry. Transitions only move forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum QueueEntryStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl QueueEntryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueEntryStatus::Completed
                | QueueEntryStatus::Failed
                | QueueEntryStatus::Skipped
                | QueueEntryStatus::Cancelled
        )
    }
}

impl std::fmt::Display for QueueEntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueEntryStatus::Pending => "pending",
            QueueEntryStatus::InProgress => "in_progress",
            QueueEntryStatus::Completed => "completed",
            QueueEntryStatus::Failed => "failed",
            QueueEntryStatus::Skipped => "skipped",
            QueueEntryStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for QueueEntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueEntryStatus::Pending),
            "in_progress" => Ok(QueueEntryStatus::InProgress),
            "completed" => Ok(QueueEntryStatus::Completed),
            "failed" => Ok(QueueEntryStatus::Failed),
            "skipped" => Ok(QueueEntryStatus::Skipped),
            "cancelled" => Ok(QueueEntryStatus::Cancelled),
            other => Err(format!("unknown queue entry status: {}", other)),
        }
    }
}

/// Aggregate counts over one parent's queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct QueueStatus {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl QueueStatus {
    /// True when every entry has reached a terminal status.
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_progress == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn entry_status_round_trip() {
        for status in [
            QueueEntryStatus::Pending,
            QueueEntryStatus::InProgress,
            QueueEntryStatus::Completed,
            QueueEntryStatus::Failed,
            QueueEntryStatus::Skipped,
            QueueEntryStatus::Cancelled,
        ] {
            assert_eq!(
                QueueEntryStatus::from_str(&status.to_string()).unwrap(),
                status
            );
        }
    }

    #[test]
    fn terminal_entries() {
        assert!(QueueEntryStatus::Skipped.is_terminal());
        assert!(QueueEntryStatus::Cancelled.is_terminal());
        assert!(!QueueEntryStatus::Pending.is_terminal());
        assert!(!QueueEntryStatus::InProgress.is_terminal());
    }

    #[test]
    fn drained_queue() {
        let status = QueueStatus {
            total: 3,
            completed: 2,
            failed: 1,
            ..Default::default()
        };
        assert!(status.is_drained());

        let busy = QueueStatus {
            total: 2,
            in_progress: 1,
            completed: 1,
            ..Default::default()
        };
        assert!(!busy.is_drained());
    }
}
