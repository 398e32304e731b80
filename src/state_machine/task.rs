use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::phase::{Phase, TaskStatus, TransitionError};
use crate::artifact::ArtifactRef;
use crate::family::JobFamily;
use crate::params::JobParams;
use crate::remote::RemoteStatus;

/// Category of a task failure, persisted with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InsufficientCredit,
    RemoteProtocol,
    GatewayTimeout,
    RemoteJobFailure,
    RetrievalFailed,
    LocalIo,
    Interrupted,
    DeadlineExpired,
    Store,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InsufficientCredit => "insufficient_credit",
            ErrorKind::RemoteProtocol => "remote_protocol",
            ErrorKind::GatewayTimeout => "gateway_timeout",
            ErrorKind::RemoteJobFailure => "remote_job_failure",
            ErrorKind::RetrievalFailed => "retrieval_failed",
            ErrorKind::LocalIo => "local_io",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::DeadlineExpired => "deadline_expired",
            ErrorKind::Store => "store",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Why a task ended somewhere other than COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub remote_status: Option<RemoteStatus>,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remote_status: None,
        }
    }
}

/// The persisted record of one optimization job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub family: JobFamily,
    pub params: JobParams,
    /// Set once, right after the remote start call returns.
    #[serde(default)]
    pub remote_job_id: Option<String>,
    pub status: TaskStatus,
    pub phase: Phase,
    #[serde(default)]
    pub error_detail: Option<ErrorDetail>,
    #[serde(default)]
    pub input_model_id: Option<String>,
    #[serde(default)]
    pub output_model_id: Option<String>,
    pub input_artifact: ArtifactRef,
    #[serde(default)]
    pub output_artifact: Option<ArtifactRef>,
    /// Family-specific result payload, e.g. benchmark latencies.
    #[serde(default)]
    pub result: Option<Value>,
    /// Generation of the deferred poll chain allowed to drive this record.
    #[serde(default)]
    pub poll_seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(params: JobParams, input_artifact: ArtifactRef) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            family: params.family(),
            params,
            remote_job_id: None,
            status: TaskStatus::NotStarted,
            phase: Phase::Created,
            error_detail: None,
            input_model_id: None,
            output_model_id: None,
            input_artifact,
            output_artifact: None,
            result: None,
            poll_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves to the next non-terminal phase.
    pub fn advance(&mut self, next: Phase) -> Result<(), TransitionError> {
        if next.is_terminal() || !self.phase.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.touch();
        Ok(())
    }

    /// Records the remote job id. It can be set exactly once.
    pub fn bind_remote_job(&mut self, remote_job_id: impl Into<String>) -> Result<(), TransitionError> {
        if let Some(existing) = &self.remote_job_id {
            return Err(TransitionError::RemoteJobAlreadyBound(existing.clone()));
        }
        self.remote_job_id = Some(remote_job_id.into());
        self.touch();
        Ok(())
    }

    /// Marks the task as running. Returns whether anything changed.
    pub fn mark_in_progress(&mut self) -> bool {
        if self.status != TaskStatus::NotStarted {
            return false;
        }
        self.status = TaskStatus::InProgress;
        self.touch();
        true
    }

    /// Moves to a terminal phase and sets the matching status.
    pub fn settle(&mut self, terminal: Phase, detail: Option<ErrorDetail>) -> Result<(), TransitionError> {
        let status = TaskStatus::from_terminal(terminal);
        let Some(status) = status.filter(|_| self.phase.can_transition_to(terminal)) else {
            return Err(TransitionError::Illegal {
                from: self.phase,
                to: terminal,
            });
        };
        self.phase = terminal;
        self.status = status;
        self.error_detail = detail;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
