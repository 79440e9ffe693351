use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Level, event, instrument};

use super::config::OrchestratorConfig;
use super::error::SessionError;
use super::events::event_handling::EventListeners;
use super::initiator::{OutgoingCall, PendingWait, WaitOutcome};
use super::presence::PresenceTracker;
use super::session::{FailureReason, Role, Session, SessionSnapshot, SessionStatus};
use super::timers::{TimerKind, Timers};
use crate::audio::{AudioRouteController, AudioWorker};
use crate::engine::{EngineError, EngineEvent, EngineListener, JoinRequest, OfflineReason, RtcEngine};
use crate::invitation::Invitation;

/// Options for an explicit leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeaveOptions {
    /// Reapply the volume levels captured before the session raised them.
    pub restore_volume: bool,
}

pub(crate) enum Command {
    JoinFromInvitation {
        invitation: Invitation,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StartAsInitiator {
        call: OutgoingCall,
        wait_id: u64,
        reply: oneshot::Sender<Result<WaitOutcome, SessionError>>,
    },
    AbandonWait {
        wait_id: u64,
    },
    Leave {
        options: LeaveOptions,
        reply: oneshot::Sender<()>,
    },
    SetMuted {
        /// `None` toggles.
        muted: Option<bool>,
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<SessionSnapshot>>,
    },
}

impl Command {
    fn reject(self, error: SessionError) {
        match self {
            Command::JoinFromInvitation { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::StartAsInitiator { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::SetMuted { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::Leave { reply, .. } => {
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(None);
            }
            Command::AbandonWait { .. } => {}
        }
    }
}

pub(crate) enum ActorMessage {
    Command(Command),
    Engine { generation: u64, event: EngineEvent },
    JoinRequested { generation: u64, result: Result<(), EngineError> },
    LeaveAcked { generation: u64, result: Result<(), EngineError> },
    PresencePolled { generation: u64, result: Result<Vec<u32>, EngineError> },
    TimerFired { kind: TimerKind, id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaveCause {
    LocalRequest,
    Superseded,
    ChannelEmpty,
    NoRemoteArrived,
    CalleeTimeout,
    WaitAbandoned,
    EngineLeft,
}

impl LeaveCause {
    fn join_error(self) -> SessionError {
        match self {
            LeaveCause::Superseded => SessionError::Superseded,
            _ => SessionError::Cancelled,
        }
    }

    fn wait_result(self) -> Result<WaitOutcome, SessionError> {
        match self {
            LeaveCause::CalleeTimeout => Ok(WaitOutcome::TimedOut),
            LeaveCause::Superseded => Err(SessionError::Superseded),
            _ => Ok(WaitOutcome::Cancelled),
        }
    }
}

/// Sole owner of session, presence and timer state.
///
/// Public calls, engine callbacks, engine call results and timer expiries all arrive
/// through one mailbox and are handled one at a time, so every transition observes a
/// consistent state without locking.
pub(crate) struct SessionActor {
    pub(super) engine: Arc<dyn RtcEngine>,
    pub(super) audio: AudioWorker,
    pub(super) config: OrchestratorConfig,
    pub(super) mailbox: mpsc::UnboundedSender<ActorMessage>,
    pub(super) status_tx: watch::Sender<SessionStatus>,
    pub(super) listeners: Arc<Mutex<EventListeners>>,
    pub(super) session: Option<Session>,
    pub(super) presence: PresenceTracker,
    pub(super) timers: Timers,
    pub(super) pending_wait: Option<PendingWait>,
    /// Join or initiator start waiting for the previous session to finish leaving.
    pub(super) deferred: Option<Command>,
    pub(super) generation: u64,
}

impl SessionActor {
    pub fn new(
        engine: Arc<dyn RtcEngine>,
        audio: AudioRouteController,
        config: OrchestratorConfig,
        mailbox: mpsc::UnboundedSender<ActorMessage>,
        status_tx: watch::Sender<SessionStatus>,
        listeners: Arc<Mutex<EventListeners>>,
    ) -> Self {
        Self {
            engine,
            audio: AudioWorker::spawn(audio),
            config,
            timers: Timers::new(mailbox.clone()),
            mailbox,
            status_tx,
            listeners,
            session: None,
            presence: PresenceTracker::new(),
            pending_wait: None,
            deferred: None,
            generation: 0,
        }
    }

    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<ActorMessage>, cancel_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    event!(Level::DEBUG, "Session actor: cancellation requested");
                    break;
                }
                message = inbox.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                }
            }
        }
        self.shutdown();
    }

    fn handle(&mut self, message: ActorMessage) {
        match message {
            ActorMessage::Command(command) => self.handle_command(command),
            ActorMessage::Engine { generation, event } => self.on_engine_event(generation, event),
            ActorMessage::JoinRequested { generation, result } => self.on_join_requested(generation, result),
            ActorMessage::LeaveAcked { generation, result } => {
                if let Err(e) = result {
                    event!(Level::WARN, generation, "Engine leave failed, tearing down anyway: {}", e);
                }
                self.finish_leave(generation);
            }
            ActorMessage::PresencePolled { generation, result } => self.on_presence_polled(generation, result),
            ActorMessage::TimerFired { kind, id } => self.on_timer(kind, id),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::JoinFromInvitation { invitation, reply } => self.join_from_invitation(invitation, reply),
            Command::StartAsInitiator { call, wait_id, reply } => self.start_as_initiator(call, wait_id, reply),
            Command::AbandonWait { wait_id } => self.abandon_wait(wait_id),
            Command::Leave { options, reply } => self.leave(options, reply),
            Command::SetMuted { muted, reply } => {
                let _ = reply.send(self.set_muted(muted));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Parks `command` until the current session reaches `Idle`. A command already parked
    /// is replaced.
    pub(super) fn defer(&mut self, command: Command) {
        if let Some(previous) = self.deferred.replace(command) {
            event!(Level::INFO, "Dropping queued session request in favour of a newer one");
            previous.reject(SessionError::Superseded);
        }
        self.begin_leave(LeaveCause::Superseded);
    }

    #[instrument(skip_all, fields(channel = %invitation.channel_id(), remote = invitation.remote_user_id()))]
    fn join_from_invitation(&mut self, invitation: Invitation, reply: oneshot::Sender<Result<(), SessionError>>) {
        if reply.is_closed() {
            event!(Level::DEBUG, "Caller went away before the join started");
            return;
        }
        if self.session.is_some() {
            event!(Level::INFO, "Another session is live, leaving it first");
            self.defer(Command::JoinFromInvitation { invitation, reply });
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let mut session = Session::new(
            generation,
            Role::Receiver,
            invitation.channel_id().to_string(),
            self.config.local_uid,
            invitation.display_name().to_string(),
            SessionStatus::Joining,
        );
        session.remote_user_id = Some(invitation.remote_user_id());
        session.restore_volume = self.config.restore_volume_on_leave;
        session.join_waiter = Some(reply);

        self.presence.reset();
        self.session = Some(session);
        self.install_listener(generation);
        self.publish(SessionStatus::Joining);
        self.acquire_audio();
        self.timers.arm(TimerKind::JoinTimeout, self.config.join_timeout);
        self.request_join(
            generation,
            JoinRequest {
                token: invitation.token().to_string(),
                channel_id: invitation.channel_id().to_string(),
                uid: self.config.local_uid,
            },
        );
    }

    fn leave(&mut self, options: LeaveOptions, reply: oneshot::Sender<()>) {
        if let Some(deferred) = self.deferred.take() {
            deferred.reject(SessionError::Cancelled);
        }
        let Some(session) = self.session.as_mut() else {
            event!(Level::DEBUG, "Leave requested with no session");
            let _ = reply.send(());
            return;
        };
        session.leave_waiters.push(reply);
        if options.restore_volume {
            session.restore_volume = true;
        }
        self.begin_leave(LeaveCause::LocalRequest);
    }

    fn set_muted(&mut self, muted: Option<bool>) -> Result<bool, SessionError> {
        let session = self
            .session
            .as_mut()
            .filter(|s| !s.status.is_winding_down())
            .ok_or(SessionError::NoActiveSession)?;
        let target = muted.unwrap_or(!session.muted);
        self.engine.mute_local(target)?;
        session.muted = target;
        event!(Level::INFO, muted = target, "Local audio mute changed");
        Ok(target)
    }

    /// Mute is per session; the engine must not carry it into the next one.
    fn unmute_engine(&self) {
        match self.engine.mute_local(false) {
            Ok(()) => event!(Level::DEBUG, "Cleared local mute left over from the session"),
            Err(e) => event!(Level::WARN, "Failed to clear local mute: {}", e),
        }
    }

    fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(|s| SessionSnapshot {
            status: s.status.clone(),
            channel_id: s.channel_id.clone(),
            role: s.role,
            local_uid: s.local_uid,
            remote_user_id: s.remote_user_id,
            remote_display_name: s.remote_display_name.clone(),
            remote_participants: self.presence.participants(),
            muted: s.muted,
            started_at: s.started_at,
            waiting_for_remote: self.pending_wait.is_some(),
            grace_timer_armed: self.timers.is_armed(TimerKind::Grace),
        })
    }

    /// Takes the engine's listener slot for `generation`, revoking whatever held it.
    pub(super) fn install_listener(&self, generation: u64) {
        let mailbox = self.mailbox.clone();
        self.engine.set_listener(Some(EngineListener::new(move |event| {
            let _ = mailbox.send(ActorMessage::Engine { generation, event });
        })));
    }

    pub(super) fn request_join(&self, generation: u64, request: JoinRequest) {
        let engine = Arc::clone(&self.engine);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = engine.join(request).await;
            let _ = mailbox.send(ActorMessage::JoinRequested { generation, result });
        });
    }

    fn request_leave(&self, generation: u64) {
        let engine = Arc::clone(&self.engine);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = engine.leave().await;
            let _ = mailbox.send(ActorMessage::LeaveAcked { generation, result });
        });
    }

    pub(super) fn request_presence_poll(&self, generation: u64) {
        let engine = Arc::clone(&self.engine);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = engine.remote_users().await;
            let _ = mailbox.send(ActorMessage::PresencePolled { generation, result });
        });
    }

    /// Volume acquisition never blocks or fails a session.
    pub(super) fn acquire_audio(&self) {
        self.audio.acquire(self.config.audio_route);
    }

    pub(super) fn publish(&mut self, status: SessionStatus) {
        if let Some(session) = self.session.as_mut() {
            session.status = status.clone();
        }
        event!(Level::INFO, status = ?status, "Session status changed");
        self.status_tx.send_replace(status.clone());
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).notify_status_changed(&status);
    }

    fn current_generation(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.generation)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.generation == generation && !s.status.is_winding_down())
    }

    #[instrument(skip_all, fields(generation = generation, channel = %event.channel_id()))]
    fn on_engine_event(&mut self, generation: u64, event: EngineEvent) {
        let Some(session) = self.session.as_mut() else {
            event!(Level::DEBUG, event = ?event, "Ignoring engine callback with no session");
            return;
        };
        if session.generation != generation || session.channel_id != event.channel_id() {
            event!(Level::DEBUG, event = ?event, current = %session.channel_id, "Ignoring stale engine callback");
            return;
        }
        if session.status.is_winding_down() {
            if let EngineEvent::LeaveComplete { .. } = event {
                self.finish_leave(generation);
            } else {
                event!(Level::TRACE, event = ?event, "Ignoring engine callback while leaving");
            }
            return;
        }

        let engine_joined = session.engine_joined;
        match event {
            EngineEvent::JoinSuccess { uid, .. } => self.on_join_success(uid),
            EngineEvent::RemoteJoined { .. } | EngineEvent::RemoteOffline { .. } if !engine_joined => {
                event!(Level::DEBUG, event = ?event, "Buffering remote callback until the join is confirmed");
                if let Some(session) = self.session.as_mut() {
                    session.buffered.push(event);
                }
            }
            EngineEvent::RemoteJoined { uid, .. } => self.on_remote_joined(uid),
            EngineEvent::RemoteOffline { uid, reason, .. } => self.on_remote_offline(uid, reason),
            EngineEvent::ConnectionInterrupted { .. } => {
                event!(Level::WARN, "Connection interrupted, waiting for the engine to reconnect");
            }
            EngineEvent::ConnectionRestored { .. } => {
                event!(Level::INFO, "Connection restored");
            }
            EngineEvent::LeaveComplete { .. } => {
                event!(Level::WARN, "Engine left the channel on its own");
                self.begin_leave(LeaveCause::EngineLeft);
                self.finish_leave(generation);
            }
            EngineEvent::Error { code, .. } => {
                event!(Level::ERROR, code, "Engine reported an error");
                self.fail(FailureReason::EngineError { code });
            }
        }
    }

    fn on_join_requested(&mut self, generation: u64, result: Result<(), EngineError>) {
        if !self.is_current(generation) {
            return;
        }
        match result {
            Ok(()) => event!(Level::DEBUG, generation, "Engine accepted join request"),
            Err(e) => {
                event!(Level::ERROR, generation, "Engine refused join request: {}", e);
                self.fail(FailureReason::JoinRejected(e));
            }
        }
    }

    fn on_join_success(&mut self, uid: u32) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.engine_joined {
            event!(Level::DEBUG, "Duplicate join confirmation");
            return;
        }
        session.engine_joined = true;
        session.started_at = Some(Instant::now());
        if uid != 0 {
            session.local_uid = uid;
        }
        let role = session.role;
        let buffered = std::mem::take(&mut session.buffered);
        event!(Level::INFO, uid, role = ?role, "Joined channel");
        self.timers.cancel(TimerKind::JoinTimeout);

        match role {
            Role::Receiver => {
                self.publish(SessionStatus::Active);
                if let Some(session) = self.session.as_mut() {
                    session.resolve_join(Ok(()));
                }
                self.replay(buffered);
                if !self.presence.has_seen_remote() && self.is_active() {
                    self.timers.arm(TimerKind::FirstRemote, self.config.receiver_first_remote_timeout);
                }
            }
            Role::Initiator => {
                self.timers.arm(TimerKind::PresencePoll, self.config.presence_poll_delay);
                self.replay(buffered);
            }
        }
    }

    fn replay(&mut self, buffered: Vec<EngineEvent>) {
        for event in buffered {
            if !self.session.as_ref().is_some_and(|s| !s.status.is_winding_down()) {
                break;
            }
            match event {
                EngineEvent::RemoteJoined { uid, .. } => self.on_remote_joined(uid),
                EngineEvent::RemoteOffline { uid, reason, .. } => self.on_remote_offline(uid, reason),
                _ => {}
            }
        }
    }

    fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.status == SessionStatus::Active)
    }

    pub(super) fn on_remote_joined(&mut self, uid: u32) {
        self.timers.cancel(TimerKind::Grace);
        self.timers.cancel(TimerKind::FirstRemote);
        if self.presence.on_remote_join(uid) {
            event!(Level::INFO, uid, count = self.presence.count(), "Remote joined");
            self.listeners.lock().unwrap_or_else(PoisonError::into_inner).notify_remote_joined(uid);
        }
        if self.pending_wait.is_some() {
            self.resolve_wait_joined();
        }
    }

    fn on_remote_offline(&mut self, uid: u32, reason: OfflineReason) {
        if !self.presence.on_remote_leave(uid) {
            event!(Level::TRACE, uid, "Offline callback for unknown remote");
            return;
        }
        event!(Level::INFO, uid, reason = ?reason, count = self.presence.count(), "Remote left");
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).notify_remote_left(uid);

        if self.presence.is_empty() && self.presence.has_seen_remote() && self.is_active() {
            event!(Level::INFO, grace = ?self.config.grace_period, "Channel is empty, arming grace timer");
            self.timers.arm(TimerKind::Grace, self.config.grace_period);
        }
    }

    fn on_timer(&mut self, kind: TimerKind, id: u64) {
        if !self.timers.claim(kind, id) {
            return;
        }
        match kind {
            TimerKind::Grace => {
                if self.presence.is_empty() && self.is_active() {
                    event!(Level::INFO, "Grace period over, leaving empty channel");
                    self.begin_leave(LeaveCause::ChannelEmpty);
                }
            }
            TimerKind::FirstRemote => {
                if !self.presence.has_seen_remote() && self.is_active() {
                    event!(Level::INFO, "No remote arrived, leaving");
                    self.begin_leave(LeaveCause::NoRemoteArrived);
                }
            }
            TimerKind::JoinTimeout => {
                if self.session.as_ref().is_some_and(|s| !s.engine_joined && !s.status.is_winding_down()) {
                    event!(Level::ERROR, "Engine did not confirm the join in time");
                    self.fail(FailureReason::JoinTimedOut);
                }
            }
            TimerKind::LeaveTimeout => {
                if let Some(generation) = self.current_generation() {
                    event!(Level::WARN, generation, "Engine did not acknowledge the leave in time, forcing teardown");
                    self.finish_leave(generation);
                }
            }
            TimerKind::CalleeDeadline => self.on_callee_deadline(),
            TimerKind::PresencePoll => self.on_presence_poll_due(),
        }
    }

    /// Moves the live session to `Leaving` and asks the engine to leave.
    #[instrument(skip_all, fields(cause = ?cause))]
    pub(super) fn begin_leave(&mut self, cause: LeaveCause) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.status.is_winding_down() {
            return;
        }
        let generation = session.generation;
        session.resolve_join(Err(cause.join_error()));
        if let Some(wait) = self.pending_wait.take() {
            session.exit_wait = Some((wait, cause.wait_result()));
        }
        self.timers.cancel_all();
        self.publish(SessionStatus::Leaving);
        if cause != LeaveCause::EngineLeft {
            self.timers.arm(TimerKind::LeaveTimeout, self.config.leave_timeout);
            self.request_leave(generation);
        }
    }

    /// Hard failure: publishes `Failed`, then leaves and routes back to `Idle`.
    fn fail(&mut self, reason: FailureReason) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.status.is_winding_down() {
            return;
        }
        let generation = session.generation;
        if let Some(wait) = self.pending_wait.take() {
            session.exit_wait = Some((wait, Err(SessionError::JoinFailed(reason.clone()))));
        }
        self.timers.cancel_all();
        self.publish(SessionStatus::Failed(reason.clone()));
        if let Some(session) = self.session.as_mut() {
            session.resolve_join(Err(SessionError::JoinFailed(reason)));
        }
        self.timers.arm(TimerKind::LeaveTimeout, self.config.leave_timeout);
        self.request_leave(generation);
    }

    /// Completes teardown of `generation` once the engine has left. Repeated calls are no-ops.
    fn finish_leave(&mut self, generation: u64) {
        let Some(mut session) = self
            .session
            .take_if(|s| s.generation == generation && s.status.is_winding_down())
        else {
            return;
        };

        self.timers.cancel_all();
        self.engine.set_listener(None);
        self.presence.reset();
        if let Some(wait) = self.pending_wait.take() {
            wait.resolve(Ok(WaitOutcome::Cancelled));
        }
        if session.restore_volume {
            self.audio.restore();
        } else {
            self.audio.discard();
        }
        if session.muted {
            self.unmute_engine();
        }

        event!(Level::INFO, channel = %session.channel_id, "Left channel");
        self.publish(SessionStatus::Idle);
        session.settle_waiters();

        if let Some(command) = self.deferred.take() {
            self.handle_command(command);
        }
    }

    fn shutdown(&mut self) {
        if let Some(command) = self.deferred.take() {
            command.reject(SessionError::Stopped);
        }
        self.timers.cancel_all();
        if let Some(wait) = self.pending_wait.take() {
            wait.resolve(Err(SessionError::Stopped));
        }
        let Some(mut session) = self.session.take() else {
            return;
        };
        event!(Level::INFO, channel = %session.channel_id, "Orchestrator stopping, leaving channel");
        session.resolve_join(Err(SessionError::Stopped));
        if let Some((wait, _)) = session.exit_wait.take() {
            wait.resolve(Err(SessionError::Stopped));
        }
        self.engine.set_listener(None);
        self.presence.reset();
        if session.muted {
            self.unmute_engine();
        }
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            if let Err(e) = engine.leave().await {
                event!(Level::WARN, "Leave during shutdown failed: {}", e);
            }
        });
        self.publish(SessionStatus::Idle);
        session.settle_waiters();
    }
}
