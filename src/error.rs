use std::time::Duration;

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::family::JobFamily;
use crate::quota::QuotaError;
use crate::remote::{RemoteError, RemoteStatus};
use crate::state_machine::{ErrorDetail, ErrorKind, Phase, TransitionError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("insufficient credit: balance {balance}, one {family} job requires {required}")]
    InsufficientCredit {
        family: JobFamily,
        balance: i64,
        required: i64,
    },

    #[error("remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("remote job ended with {status}: {log}")]
    RemoteJobFailure { status: RemoteStatus, log: String },

    #[error("artifact transfer failed: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("interrupted")]
    Interrupted,

    #[error("deadline of {}s expired", .0.as_secs())]
    DeadlineExpired(Duration),

    #[error("task store error: {0}")]
    Store(#[from] StoreError),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("state machine error: {0}")]
    Transition(#[from] TransitionError),
}

impl From<QuotaError> for OrchestratorError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::InsufficientBalance {
                family,
                balance,
                required,
            } => OrchestratorError::InsufficientCredit {
                family,
                balance,
                required,
            },
            QuotaError::Balance(remote) => OrchestratorError::Remote(remote),
        }
    }
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Validation(_) => ErrorKind::Validation,
            OrchestratorError::InsufficientCredit { .. } => ErrorKind::InsufficientCredit,
            OrchestratorError::Remote(RemoteError::GatewayTimeout { .. }) => ErrorKind::GatewayTimeout,
            OrchestratorError::Remote(_) => ErrorKind::RemoteProtocol,
            OrchestratorError::RemoteJobFailure { .. } => ErrorKind::RemoteJobFailure,
            OrchestratorError::Artifact(_) | OrchestratorError::LocalIo(_) => ErrorKind::LocalIo,
            OrchestratorError::Interrupted => ErrorKind::Interrupted,
            OrchestratorError::DeadlineExpired(_) => ErrorKind::DeadlineExpired,
            OrchestratorError::Store(_) => ErrorKind::Store,
            OrchestratorError::TaskNotFound(_) | OrchestratorError::Transition(_) => ErrorKind::Internal,
        }
    }

    /// The detail persisted when this error ends a task that was in `phase`.
    ///
    /// Failures while finalizing mean the remote job succeeded but its output
    /// never arrived, which is reported as its own kind.
    pub fn detail(&self, phase: Phase) -> ErrorDetail {
        let kind = self.kind();
        let retrieval = phase == Phase::Finalizing
            && !matches!(kind, ErrorKind::Interrupted | ErrorKind::DeadlineExpired);

        let mut detail = if retrieval {
            ErrorDetail::new(
                ErrorKind::RetrievalFailed,
                format!("remote job succeeded but artifact retrieval failed: {self}"),
            )
        } else {
            ErrorDetail::new(kind, self.to_string())
        };
        if let OrchestratorError::RemoteJobFailure { status, .. } = self {
            detail.remote_status = Some(*status);
        }
        detail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_convert() {
        let err: OrchestratorError = QuotaError::InsufficientBalance {
            family: JobFamily::Convert,
            balance: 10,
            required: 50,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InsufficientCredit);
        assert!(err.to_string().contains("balance 10"));

        let err: OrchestratorError = QuotaError::Balance(RemoteError::Auth("expired".into())).into();
        assert_eq!(err.kind(), ErrorKind::RemoteProtocol);
    }

    #[test]
    fn gateway_timeout_has_its_own_kind() {
        let err = OrchestratorError::Remote(RemoteError::GatewayTimeout {
            body: "<html>".into(),
        });
        assert_eq!(err.kind(), ErrorKind::GatewayTimeout);
    }

    #[test]
    fn remote_failure_detail_keeps_log_and_status() {
        let err = OrchestratorError::RemoteJobFailure {
            status: RemoteStatus::Error,
            log: "CUDA OOM".into(),
        };
        let detail = err.detail(Phase::Polling);
        assert_eq!(detail.kind, ErrorKind::RemoteJobFailure);
        assert!(detail.message.contains("CUDA OOM"));
        assert_eq!(detail.remote_status, Some(RemoteStatus::Error));
    }

    #[test]
    fn failure_while_finalizing_is_retrieval_failure() {
        let err = OrchestratorError::Artifact(ArtifactError::Rejected {
            status: 403,
            message: "expired".into(),
        });
        let detail = err.detail(Phase::Finalizing);
        assert_eq!(detail.kind, ErrorKind::RetrievalFailed);
        assert!(detail.message.starts_with("remote job succeeded but artifact retrieval failed"));

        let detail = OrchestratorError::Interrupted.detail(Phase::Finalizing);
        assert_eq!(detail.kind, ErrorKind::Interrupted);
    }

    #[test]
    fn deadline_message_in_seconds() {
        let err = OrchestratorError::DeadlineExpired(Duration::from_secs(90));
        assert_eq!(err.to_string(), "deadline of 90s expired");
    }
}
