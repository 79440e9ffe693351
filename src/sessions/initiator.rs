use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{Level, event, instrument};

use super::actor::{Command, LeaveCause, SessionActor};
use super::error::SessionError;
use super::session::{Role, Session, SessionStatus};
use super::timers::TimerKind;
use crate::engine::{EngineError, JoinRequest};

/// Outcome of an initiator's wait for the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
    Joined,
    TimedOut,
    /// Ended by `leave()` or by dropping the pending call before it resolved.
    Cancelled,
}

/// A call placed from this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingCall {
    pub channel_id: String,
    pub token: String,
    pub uid: u32,
    pub remote_display_name: String,
    /// Callee deadline. Defaults to the orchestrator's `initiator_timeout`.
    pub timeout: Option<Duration>,
}

impl OutgoingCall {
    pub fn new(channel_id: impl Into<String>, token: impl Into<String>, uid: u32, remote_display_name: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            token: token.into(),
            uid,
            remote_display_name: remote_display_name.into(),
            timeout: None,
        }
    }

    /// Builds a call on a freshly generated channel id.
    pub fn with_generated_channel(token: impl Into<String>, uid: u32, remote_display_name: impl Into<String>) -> Self {
        Self::new(generate_channel_id(), token, uid, remote_display_name)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub fn generate_channel_id() -> String {
    let suffix: u64 = rand::rng().random();
    format!("call-{suffix:016x}")
}

/// The initiator's race between the callee's arrival and the deadline.
///
/// Holding one of these is what "listening for the callee" means; every exit path takes
/// it out of the actor and resolves it exactly once.
pub(crate) struct PendingWait {
    pub id: u64,
    pub generation: u64,
    pub deadline: Instant,
    reply: oneshot::Sender<Result<WaitOutcome, SessionError>>,
}

impl PendingWait {
    pub fn resolve(self, result: Result<WaitOutcome, SessionError>) {
        event!(Level::DEBUG, wait_id = self.id, result = ?result, "Initiator wait resolved");
        let _ = self.reply.send(result);
    }
}

impl SessionActor {
    #[instrument(skip_all, fields(channel = %call.channel_id, wait_id = wait_id))]
    pub(super) fn start_as_initiator(&mut self, call: OutgoingCall, wait_id: u64, reply: oneshot::Sender<Result<WaitOutcome, SessionError>>) {
        if reply.is_closed() {
            event!(Level::DEBUG, "Caller went away before the call started");
            return;
        }
        if self.session.is_some() {
            event!(Level::INFO, "Another session is live, leaving it first");
            self.defer(Command::StartAsInitiator { call, wait_id, reply });
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let timeout = call.timeout.unwrap_or(self.config.initiator_timeout);
        let deadline = Instant::now() + timeout;
        let mut session = Session::new(
            generation,
            Role::Initiator,
            call.channel_id.clone(),
            call.uid,
            call.remote_display_name,
            SessionStatus::WaitingForRemote,
        );
        session.restore_volume = self.config.restore_volume_on_leave;

        self.presence.reset();
        self.session = Some(session);
        // Both the callee listener and the engine listener are in place before the join
        // is issued, so a callee that beats us into the channel cannot be missed.
        self.pending_wait = Some(PendingWait {
            id: wait_id,
            generation,
            deadline,
            reply,
        });
        self.install_listener(generation);
        self.publish(SessionStatus::WaitingForRemote);
        self.timers.arm_at(TimerKind::CalleeDeadline, deadline);
        self.timers.arm(TimerKind::JoinTimeout, self.config.join_timeout);
        self.acquire_audio();
        event!(Level::INFO, timeout = ?timeout, "Calling, waiting for the callee");
        self.request_join(
            generation,
            JoinRequest {
                token: call.token,
                channel_id: call.channel_id,
                uid: call.uid,
            },
        );
    }

    pub(super) fn abandon_wait(&mut self, wait_id: u64) {
        if self.pending_wait.as_ref().is_some_and(|w| w.id == wait_id) {
            event!(Level::INFO, wait_id, "Caller abandoned the outgoing call");
            self.begin_leave(LeaveCause::WaitAbandoned);
        } else if matches!(&self.deferred, Some(Command::StartAsInitiator { wait_id: id, .. }) if *id == wait_id) {
            event!(Level::DEBUG, wait_id, "Dropping queued outgoing call");
            self.deferred = None;
        }
    }

    pub(super) fn resolve_wait_joined(&mut self) {
        let Some(wait) = self.pending_wait.take() else {
            return;
        };
        self.timers.cancel(TimerKind::CalleeDeadline);
        self.timers.cancel(TimerKind::PresencePoll);
        let remaining = wait.deadline.saturating_duration_since(Instant::now());
        event!(Level::INFO, remaining = ?remaining, "Callee joined");
        self.publish(SessionStatus::Active);
        wait.resolve(Ok(WaitOutcome::Joined));
    }

    pub(super) fn on_callee_deadline(&mut self) {
        if self.pending_wait.is_some() {
            event!(Level::INFO, "Callee did not join before the deadline");
            self.begin_leave(LeaveCause::CalleeTimeout);
        }
    }

    pub(super) fn on_presence_poll_due(&mut self) {
        if let Some(wait) = &self.pending_wait {
            event!(Level::DEBUG, "Polling channel for remotes that joined early");
            self.request_presence_poll(wait.generation);
        }
    }

    pub(super) fn on_presence_polled(&mut self, generation: u64, result: Result<Vec<u32>, EngineError>) {
        if !self.pending_wait.as_ref().is_some_and(|w| w.generation == generation) {
            return;
        }
        match result {
            Ok(remotes) if remotes.is_empty() => event!(Level::DEBUG, "Nobody in the channel yet"),
            Ok(remotes) => {
                event!(Level::INFO, count = remotes.len(), "Found remotes already in the channel");
                for uid in remotes {
                    self.on_remote_joined(uid);
                }
            }
            Err(e) => event!(Level::WARN, "Presence poll failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_channel_ids_differ() {
        let a = generate_channel_id();
        let b = generate_channel_id();
        assert!(a.starts_with("call-"));
        assert_eq!(a.len(), "call-".len() + 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_outgoing_call_timeout() {
        let call = OutgoingCall::new("room", "token", 1, "Bob");
        assert_eq!(call.timeout, None);
        let call = call.with_timeout(Duration::from_secs(1));
        assert_eq!(call.timeout, Some(Duration::from_secs(1)));
    }
}
