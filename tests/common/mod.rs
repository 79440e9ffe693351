#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use pushtalk::audio::{AudioDevice, AudioRoute, AudioRouteController, AudioStream};
use pushtalk::engine::{EngineError, EngineEvent, EngineListener, JoinRequest, OfflineReason, RtcEngine};
use pushtalk::invitation::{Invitation, InvitationValidator, RawPayload};
use pushtalk::sessions::events::event_handling::StatusChangedEvent;
use pushtalk::sessions::{OrchestratorConfig, SessionOrchestrator, SessionStatus};

pub const ASSIGNED_UID: u32 = 1000;

struct EngineState {
    listener: Option<EngineListener>,
    channel: Option<String>,
    joins: Vec<JoinRequest>,
    leaves: usize,
    muted: bool,
    remote_users: Vec<u32>,
    confirm_joins: bool,
    join_error: Option<EngineError>,
}

/// Scripted stand-in for the RTC engine. Joins and leaves are confirmed through the
/// installed listener, the way the real engine reports them.
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState {
                listener: None,
                channel: None,
                joins: Vec::new(),
                leaves: 0,
                muted: false,
                remote_users: Vec::new(),
                confirm_joins: true,
                join_error: None,
            }),
        })
    }

    /// Joins are accepted but never confirmed until the test emits `JoinSuccess` itself.
    pub fn unconfirmed() -> Arc<Self> {
        let engine = Self::new();
        engine.state.lock().unwrap().confirm_joins = false;
        engine
    }

    pub fn rejecting(error: EngineError) -> Arc<Self> {
        let engine = Self::new();
        engine.state.lock().unwrap().join_error = Some(error);
        engine
    }

    pub fn set_remote_users(&self, uids: Vec<u32>) {
        self.state.lock().unwrap().remote_users = uids;
    }

    /// Delivers `event` to whoever holds the listener slot right now.
    pub fn emit(&self, event: EngineEvent) {
        let listener = self.state.lock().unwrap().listener.clone();
        if let Some(listener) = listener {
            listener.notify(event);
        }
    }

    pub fn remote_joined(&self, channel: &str, uid: u32) {
        self.emit(EngineEvent::RemoteJoined {
            channel_id: channel.to_string(),
            uid,
        });
    }

    pub fn remote_offline(&self, channel: &str, uid: u32) {
        self.emit(EngineEvent::RemoteOffline {
            channel_id: channel.to_string(),
            uid,
            reason: OfflineReason::Quit,
        });
    }

    pub fn listener(&self) -> Option<EngineListener> {
        self.state.lock().unwrap().listener.clone()
    }

    pub fn joins(&self) -> Vec<JoinRequest> {
        self.state.lock().unwrap().joins.clone()
    }

    pub fn join_count(&self) -> usize {
        self.state.lock().unwrap().joins.len()
    }

    pub fn leave_count(&self) -> usize {
        self.state.lock().unwrap().leaves
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }
}

impl RtcEngine for FakeEngine {
    fn join(&self, request: JoinRequest) -> BoxFuture<'_, Result<(), EngineError>> {
        let mut state = self.state.lock().unwrap();
        state.joins.push(request.clone());
        if let Some(error) = state.join_error.clone() {
            return future::ready(Err(error)).boxed();
        }
        state.channel = Some(request.channel_id.clone());
        let listener = if state.confirm_joins { state.listener.clone() } else { None };
        drop(state);

        if let Some(listener) = listener {
            listener.notify(EngineEvent::JoinSuccess {
                channel_id: request.channel_id,
                uid: if request.uid == 0 { ASSIGNED_UID } else { request.uid },
            });
        }
        future::ready(Ok(())).boxed()
    }

    fn leave(&self) -> BoxFuture<'_, Result<(), EngineError>> {
        let mut state = self.state.lock().unwrap();
        state.leaves += 1;
        let channel = state.channel.take();
        let listener = state.listener.clone();
        drop(state);

        if let (Some(channel_id), Some(listener)) = (channel, listener) {
            listener.notify(EngineEvent::LeaveComplete { channel_id });
        }
        future::ready(Ok(())).boxed()
    }

    fn remote_users(&self) -> BoxFuture<'_, Result<Vec<u32>, EngineError>> {
        let remotes = self.state.lock().unwrap().remote_users.clone();
        future::ready(Ok(remotes)).boxed()
    }

    fn mute_local(&self, muted: bool) -> Result<(), EngineError> {
        self.state.lock().unwrap().muted = muted;
        Ok(())
    }

    fn set_listener(&self, listener: Option<EngineListener>) {
        self.state.lock().unwrap().listener = listener;
    }
}

pub const MAX_LEVEL: u32 = 15;

/// In-memory platform audio with every stream starting below maximum on the earpiece.
pub struct FakeAudioDevice {
    levels: Mutex<HashMap<AudioStream, u32>>,
    route: Mutex<AudioRoute>,
    broken: bool,
    write_delay: Duration,
}

impl FakeAudioDevice {
    pub fn new(level: u32) -> Arc<Self> {
        Arc::new(Self {
            levels: Mutex::new(AudioStream::ALL.iter().map(|s| (*s, level)).collect()),
            route: Mutex::new(AudioRoute::Earpiece),
            broken: false,
            write_delay: Duration::ZERO,
        })
    }

    /// Each volume write blocks for `write_delay`, like a sluggish platform audio service.
    pub fn slow(level: u32, write_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            levels: Mutex::new(AudioStream::ALL.iter().map(|s| (*s, level)).collect()),
            route: Mutex::new(AudioRoute::Earpiece),
            broken: false,
            write_delay,
        })
    }

    /// Every call fails, as on a device that refuses volume changes.
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            levels: Mutex::new(HashMap::new()),
            route: Mutex::new(AudioRoute::Earpiece),
            broken: true,
            write_delay: Duration::ZERO,
        })
    }

    pub fn level(&self, stream: AudioStream) -> u32 {
        self.levels.lock().unwrap().get(&stream).copied().unwrap_or(0)
    }

    pub fn current_route(&self) -> AudioRoute {
        *self.route.lock().unwrap()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.broken {
            anyhow::bail!("audio service unavailable");
        }
        Ok(())
    }
}

impl AudioDevice for FakeAudioDevice {
    fn volume(&self, stream: AudioStream) -> anyhow::Result<u32> {
        self.check()?;
        Ok(self.level(stream))
    }

    fn max_volume(&self, _stream: AudioStream) -> anyhow::Result<u32> {
        self.check()?;
        Ok(MAX_LEVEL)
    }

    fn set_volume(&self, stream: AudioStream, level: u32) -> anyhow::Result<()> {
        self.check()?;
        std::thread::sleep(self.write_delay);
        self.levels.lock().unwrap().insert(stream, level);
        Ok(())
    }

    fn route(&self) -> anyhow::Result<AudioRoute> {
        self.check()?;
        Ok(self.current_route())
    }

    fn set_route(&self, route: AudioRoute) -> anyhow::Result<()> {
        self.check()?;
        *self.route.lock().unwrap() = route;
        Ok(())
    }
}

pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

pub fn invitation_payload(channel: &str, remote_user_id: u32, issued_at: i64) -> RawPayload {
    RawPayload::data_only([
        ("token", "rtc-token".to_string()),
        ("remoteUserId", remote_user_id.to_string()),
        ("channelId", channel.to_string()),
        ("displayName", "Alice".to_string()),
        ("issuedAt", issued_at.to_string()),
    ])
}

pub fn invitation(channel: &str, remote_user_id: u32) -> Invitation {
    InvitationValidator::default()
        .validate(&invitation_payload(channel, remote_user_id, unix_now()))
        .unwrap()
}

pub fn start_orchestrator(engine: &Arc<FakeEngine>) -> SessionOrchestrator {
    start_with(engine, FakeAudioDevice::new(5), OrchestratorConfig::default())
}

pub fn start_with(engine: &Arc<FakeEngine>, audio: Arc<FakeAudioDevice>, config: OrchestratorConfig) -> SessionOrchestrator {
    let engine: Arc<dyn RtcEngine> = engine.clone();
    SessionOrchestrator::start(engine, AudioRouteController::new(audio), config)
}

/// Collects every published status in order.
pub fn record_statuses(orchestrator: &SessionOrchestrator) -> Arc<Mutex<Vec<SessionStatus>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    orchestrator.add_listener(StatusChangedEvent, move |status: &SessionStatus| {
        sink.lock().unwrap().push(status.clone());
    });
    seen
}

pub async fn wait_for_status(orchestrator: &SessionOrchestrator, expected: SessionStatus) {
    let mut status = orchestrator.subscribe_status();
    tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| *s == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {expected:?}"))
        .expect("orchestrator stopped");
}

/// Lets the orchestrator drain its mailbox.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Polls `condition` in real time; for work done on the blocking pool.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}
