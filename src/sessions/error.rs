use thiserror::Error;

use super::session::FailureReason;
use crate::engine::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Join failed: {0}")]
    JoinFailed(FailureReason),
    #[error("Session was replaced by a newer one before it became active")]
    Superseded,
    #[error("Session was left before it became active")]
    Cancelled,
    #[error("No active session")]
    NoActiveSession,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Orchestrator stopped")]
    Stopped,
}
