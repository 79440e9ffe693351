use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Level, event, instrument};

use super::actor::{ActorMessage, Command, LeaveOptions, SessionActor};
use super::config::OrchestratorConfig;
use super::error::SessionError;
use super::events::event_handling::{EventListeners, EventType};
use super::initiator::{OutgoingCall, WaitOutcome};
use super::session::{SessionSnapshot, SessionStatus};
use crate::audio::AudioRouteController;
use crate::engine::RtcEngine;
use crate::invitation::{Invitation, InvitationError, InvitationValidator, RawPayload};

/// What became of an inbound push payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Joined,
    /// The payload was not a usable invitation. Nothing was attempted.
    Dropped(InvitationError),
    Failed(SessionError),
}

/// Owner of the RTC engine and the single voice session running on it.
///
/// All state lives in a background task; this handle only sends it requests. Dropping the
/// handle stops the task, leaving any live channel.
pub struct SessionOrchestrator {
    mailbox: mpsc::UnboundedSender<ActorMessage>,
    status: watch::Receiver<SessionStatus>,
    listeners: Arc<Mutex<EventListeners>>,
    validator: InvitationValidator,
    next_wait_id: AtomicU64,
    cancel_token: CancellationToken,
}

impl SessionOrchestrator {
    /// Spawns the orchestrator on the current tokio runtime.
    pub fn start(engine: Arc<dyn RtcEngine>, audio: AudioRouteController, config: OrchestratorConfig) -> Self {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SessionStatus::Idle);
        let listeners = Arc::new(Mutex::new(EventListeners::new()));
        let cancel_token = CancellationToken::new();

        event!(Level::INFO, local_uid = config.local_uid, "Starting session orchestrator");
        let actor = SessionActor::new(engine, audio, config, mailbox.clone(), status_tx, Arc::clone(&listeners));
        tokio::spawn(actor.run(inbox, cancel_token.clone()));

        Self {
            mailbox,
            status,
            listeners,
            validator: InvitationValidator::default(),
            next_wait_id: AtomicU64::new(1),
            cancel_token,
        }
    }

    pub fn with_validator(mut self, validator: InvitationValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Registers a callback. Callbacks run on the orchestrator task and must not block or
    /// call back into `add_listener`.
    pub fn add_listener<E, F>(&self, _event_type: E, callback: F)
    where
        E: EventType,
        F: for<'a> Fn(E::Data<'a>) + Send + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        E::add_listener_to_storage(&mut *listeners, callback);
    }

    /// Validates a push payload and, if it is a fresh invitation, joins its channel.
    #[instrument(skip_all)]
    pub async fn handle_push(&self, raw: &RawPayload) -> PushOutcome {
        let invitation = match self.validator.validate(raw) {
            Ok(invitation) => invitation,
            Err(e) => return PushOutcome::Dropped(e),
        };
        event!(Level::INFO, channel = invitation.channel_id(), from = invitation.display_name(), "Accepted push invitation");
        match self.join_from_invitation(invitation).await {
            Ok(()) => PushOutcome::Joined,
            Err(e) => PushOutcome::Failed(e),
        }
    }

    /// Joins the invitation's channel, replacing any live session. Resolves once the
    /// engine confirms the join.
    pub async fn join_from_invitation(&self, invitation: Invitation) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::JoinFromInvitation { invitation, reply })?;
        response.await.map_err(|_| SessionError::Stopped)?
    }

    /// Joins `call.channel_id` and waits for the callee, up to the call's timeout.
    ///
    /// `WaitingForRemote` is published before the join is issued. Dropping the returned
    /// future before it resolves cancels the call.
    pub async fn start_as_initiator(&self, call: OutgoingCall) -> Result<WaitOutcome, SessionError> {
        let wait_id = self.next_wait_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        self.send(Command::StartAsInitiator { call, wait_id, reply })?;

        let mut guard = WaitGuard {
            mailbox: &self.mailbox,
            wait_id,
            armed: true,
        };
        let result = response.await;
        guard.armed = false;
        result.map_err(|_| SessionError::Stopped)?
    }

    pub async fn leave(&self) -> Result<(), SessionError> {
        self.leave_with(LeaveOptions::default()).await
    }

    /// Leaves the current channel, cancelling a pending initiator wait. Resolves once the
    /// session is back to `Idle`; a no-op without a session.
    pub async fn leave_with(&self, options: LeaveOptions) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Leave { options, reply })?;
        response.await.map_err(|_| SessionError::Stopped)
    }

    /// Flips local mute, returning the new state.
    pub async fn toggle_mute(&self) -> Result<bool, SessionError> {
        self.request_mute(None).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<bool, SessionError> {
        self.request_mute(Some(muted)).await
    }

    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Snapshot { reply }).ok()?;
        response.await.ok().flatten()
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    async fn request_mute(&self, muted: Option<bool>) -> Result<bool, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::SetMuted { muted, reply })?;
        response.await.map_err(|_| SessionError::Stopped)?
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        if self.cancel_token.is_cancelled() {
            return Err(SessionError::Stopped);
        }
        self.mailbox.send(ActorMessage::Command(command)).map_err(|_| SessionError::Stopped)
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Cancels an outgoing call whose caller stopped waiting for it.
struct WaitGuard<'a> {
    mailbox: &'a mpsc::UnboundedSender<ActorMessage>,
    wait_id: u64,
    armed: bool,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.mailbox.send(ActorMessage::Command(Command::AbandonWait { wait_id: self.wait_id }));
        }
    }
}
