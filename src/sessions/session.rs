use std::time::Instant;

use thiserror::Error;
use tokio::sync::oneshot;

use super::error::SessionError;
use super::initiator::{PendingWait, WaitOutcome};
use crate::engine::{EngineError, EngineEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Receiver,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("engine refused the join: {0}")]
    JoinRejected(EngineError),
    #[error("engine did not confirm the join in time")]
    JoinTimedOut,
    #[error("engine error {code}")]
    EngineError { code: i32 },
}

/// Status values published to the app shell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Joining,
    WaitingForRemote,
    Active,
    Leaving,
    Failed(FailureReason),
}

impl SessionStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionStatus::Idle)
    }

    /// Leaving and Failed both wait for the engine to acknowledge the leave.
    pub(crate) fn is_winding_down(&self) -> bool {
        matches!(self, SessionStatus::Leaving | SessionStatus::Failed(_))
    }
}

/// Point-in-time view of the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub channel_id: String,
    pub role: Role,
    pub local_uid: u32,
    pub remote_user_id: Option<u32>,
    pub remote_display_name: String,
    pub remote_participants: Vec<u32>,
    pub muted: bool,
    pub started_at: Option<Instant>,
    /// An initiator is still racing the callee deadline.
    pub waiting_for_remote: bool,
    pub grace_timer_armed: bool,
}

/// Live state of the one session the actor owns.
pub(crate) struct Session {
    pub generation: u64,
    pub status: SessionStatus,
    pub channel_id: String,
    pub local_uid: u32,
    pub role: Role,
    pub remote_user_id: Option<u32>,
    pub remote_display_name: String,
    pub started_at: Option<Instant>,
    pub engine_joined: bool,
    pub muted: bool,
    pub restore_volume: bool,
    /// Remote callbacks received before the join was confirmed, replayed in order afterwards.
    pub buffered: Vec<EngineEvent>,
    pub join_waiter: Option<oneshot::Sender<Result<(), SessionError>>>,
    /// Initiator wait taken off the listener by a leave; answered once `Idle` is reached.
    pub exit_wait: Option<(PendingWait, Result<WaitOutcome, SessionError>)>,
    pub leave_waiters: Vec<oneshot::Sender<()>>,
}

impl Session {
    pub fn new(generation: u64, role: Role, channel_id: String, local_uid: u32, remote_display_name: String, status: SessionStatus) -> Self {
        Self {
            generation,
            status,
            channel_id,
            local_uid,
            role,
            remote_user_id: None,
            remote_display_name,
            started_at: None,
            engine_joined: false,
            muted: false,
            restore_volume: false,
            buffered: Vec::new(),
            join_waiter: None,
            exit_wait: None,
            leave_waiters: Vec::new(),
        }
    }

    pub fn resolve_join(&mut self, result: Result<(), SessionError>) {
        if let Some(waiter) = self.join_waiter.take() {
            let _ = waiter.send(result);
        }
    }

    /// Answers every caller still waiting on this session.
    pub fn settle_waiters(&mut self) {
        self.resolve_join(Err(SessionError::Cancelled));
        if let Some((wait, result)) = self.exit_wait.take() {
            wait.resolve(result);
        }
        for waiter in self.leave_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
