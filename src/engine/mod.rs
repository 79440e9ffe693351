//! Boundary to the hosted RTC engine.
//!
//! The engine is consumed as a black box: join, leave, mute, and a stream of callbacks
//! delivered to whichever [`EngineListener`] currently occupies its single listener slot.
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Engine rejected the request (code {code}): {message}")]
    Rejected { code: i32, message: String },
    #[error("Engine is not in a channel")]
    NotJoined,
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

/// Parameters of a channel join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub token: String,
    pub channel_id: String,
    pub uid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineReason {
    Quit,
    Dropped,
    BecameAudience,
}

/// Callbacks raised by the engine. Every event names the channel it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    JoinSuccess { channel_id: String, uid: u32 },
    LeaveComplete { channel_id: String },
    RemoteJoined { channel_id: String, uid: u32 },
    RemoteOffline { channel_id: String, uid: u32, reason: OfflineReason },
    /// Connection lost; the engine is reconnecting on its own.
    ConnectionInterrupted { channel_id: String },
    ConnectionRestored { channel_id: String },
    Error { channel_id: String, code: i32 },
}

impl EngineEvent {
    pub fn channel_id(&self) -> &str {
        match self {
            EngineEvent::JoinSuccess { channel_id, .. }
            | EngineEvent::LeaveComplete { channel_id }
            | EngineEvent::RemoteJoined { channel_id, .. }
            | EngineEvent::RemoteOffline { channel_id, .. }
            | EngineEvent::ConnectionInterrupted { channel_id }
            | EngineEvent::ConnectionRestored { channel_id }
            | EngineEvent::Error { channel_id, .. } => channel_id,
        }
    }
}

type ListenerFn = dyn Fn(EngineEvent) + Send + Sync + 'static;

/// Occupant of the engine's single listener slot.
#[derive(Clone)]
pub struct EngineListener {
    callback: Arc<ListenerFn>,
}

impl EngineListener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        Self { callback: Arc::new(callback) }
    }

    pub fn notify(&self, event: EngineEvent) {
        (self.callback)(event)
    }
}

impl std::fmt::Debug for EngineListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EngineListener")
    }
}

pub trait RtcEngine: Send + Sync {
    /// Requests a join. Resolves once the engine accepted or refused the request;
    /// the join itself is confirmed by [`EngineEvent::JoinSuccess`].
    fn join(&self, request: JoinRequest) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Leaves the current channel. Resolves on acknowledgement.
    fn leave(&self) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Remote uids currently present in the joined channel.
    fn remote_users(&self) -> BoxFuture<'_, Result<Vec<u32>, EngineError>>;

    fn mute_local(&self, muted: bool) -> Result<(), EngineError>;

    /// Replaces the listener slot. Installing a listener revokes the previous one.
    fn set_listener(&self, listener: Option<EngineListener>);
}
