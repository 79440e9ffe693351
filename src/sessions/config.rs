use std::time::Duration;

use crate::audio::AudioRoute;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);
pub const DEFAULT_INITIATOR_TIMEOUT: Duration = Duration::from_secs(25);
pub const DEFAULT_PRESENCE_POLL_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_RECEIVER_FIRST_REMOTE_TIMEOUT: Duration = Duration::from_secs(25);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_LEAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables of a [`SessionOrchestrator`](super::orchestrator::SessionOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Uid used when joining from an invitation. 0 lets the engine assign one.
    pub local_uid: u32,
    /// How long an emptied channel is kept before leaving.
    pub grace_period: Duration,
    /// Default callee deadline for initiator calls.
    pub initiator_timeout: Duration,
    /// Delay between the initiator's engine join and the explicit presence poll.
    pub presence_poll_delay: Duration,
    /// How long a receiver stays in an active channel in which no remote has appeared yet.
    pub receiver_first_remote_timeout: Duration,
    pub join_timeout: Duration,
    pub leave_timeout: Duration,
    pub audio_route: AudioRoute,
    pub restore_volume_on_leave: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            local_uid: 0,
            grace_period: DEFAULT_GRACE_PERIOD,
            initiator_timeout: DEFAULT_INITIATOR_TIMEOUT,
            presence_poll_delay: DEFAULT_PRESENCE_POLL_DELAY,
            receiver_first_remote_timeout: DEFAULT_RECEIVER_FIRST_REMOTE_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            leave_timeout: DEFAULT_LEAVE_TIMEOUT,
            audio_route: AudioRoute::Speaker,
            restore_volume_on_leave: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_local_uid(mut self, uid: u32) -> Self {
        self.local_uid = uid;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_initiator_timeout(mut self, timeout: Duration) -> Self {
        self.initiator_timeout = timeout;
        self
    }

    pub fn with_presence_poll_delay(mut self, delay: Duration) -> Self {
        self.presence_poll_delay = delay;
        self
    }

    pub fn with_receiver_first_remote_timeout(mut self, timeout: Duration) -> Self {
        self.receiver_first_remote_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_leave_timeout(mut self, timeout: Duration) -> Self {
        self.leave_timeout = timeout;
        self
    }

    pub fn with_audio_route(mut self, route: AudioRoute) -> Self {
        self.audio_route = route;
        self
    }

    pub fn with_restore_volume_on_leave(mut self, restore: bool) -> Self {
        self.restore_volume_on_leave = restore;
        self
    }
}
