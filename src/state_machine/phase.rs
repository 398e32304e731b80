use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::RemoteStatus;

/// Phases a task moves through.
///
/// CREATED → UPLOADING → VALIDATING → STARTING → POLLING → FINALIZING →
/// {COMPLETED | ERROR | STOPPED | TIMEOUT}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Created,
    Uploading,
    Validating,
    Starting,
    Polling,
    Finalizing,
    Completed,
    Error,
    Stopped,
    Timeout,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Error | Phase::Stopped | Phase::Timeout)
    }

    fn ordinal(self) -> Option<u8> {
        match self {
            Phase::Created => Some(0),
            Phase::Uploading => Some(1),
            Phase::Validating => Some(2),
            Phase::Starting => Some(3),
            Phase::Polling => Some(4),
            Phase::Finalizing => Some(5),
            _ => None,
        }
    }

    /// The shared transition rule.
    ///
    /// - nothing leaves a terminal phase
    /// - non-terminal phases advance one step at a time
    /// - COMPLETED is reachable only from FINALIZING
    /// - ERROR, STOPPED and TIMEOUT are reachable from any non-terminal phase
    pub fn can_transition_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Phase::Completed => self == Phase::Finalizing,
            Phase::Error | Phase::Stopped | Phase::Timeout => true,
            _ => match (self.ordinal(), next.ordinal()) {
                (Some(from), Some(to)) => to == from + 1,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Created => "CREATED",
            Phase::Uploading => "UPLOADING",
            Phase::Validating => "VALIDATING",
            Phase::Starting => "STARTING",
            Phase::Polling => "POLLING",
            Phase::Finalizing => "FINALIZING",
            Phase::Completed => "COMPLETED",
            Phase::Error => "ERROR",
            Phase::Stopped => "STOPPED",
            Phase::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// Status persisted in the task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
    Error,
    Stopped,
    Timeout,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Stopped | TaskStatus::Timeout
        )
    }

    /// Status implied by a terminal phase.
    pub fn from_terminal(phase: Phase) -> Option<TaskStatus> {
        match phase {
            Phase::Completed => Some(TaskStatus::Completed),
            Phase::Error => Some(TaskStatus::Error),
            Phase::Stopped => Some(TaskStatus::Stopped),
            Phase::Timeout => Some(TaskStatus::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::NotStarted => "NOT_STARTED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Error => "ERROR",
            TaskStatus::Stopped => "STOPPED",
            TaskStatus::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// What a remote status means for the local task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Keep polling.
    Pending,
    /// Move to FINALIZING.
    Finished,
    /// The remote job failed.
    Failed,
    /// The remote job was cancelled on the service side.
    CancelledRemotely,
}

impl From<RemoteStatus> for PollOutcome {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::InQueue | RemoteStatus::InProgress => PollOutcome::Pending,
            RemoteStatus::Finished => PollOutcome::Finished,
            RemoteStatus::Error | RemoteStatus::Timeout => PollOutcome::Failed,
            RemoteStatus::UserCancel => PollOutcome::CancelledRemotely,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal transition {from} -> {to}")]
    Illegal { from: Phase, to: Phase },

    #[error("remote job id already set to {0}")]
    RemoteJobAlreadyBound(String),
}
