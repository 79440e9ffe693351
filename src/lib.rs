//! Push-triggered voice channel sessions on top of a hosted RTC engine.
//!
//! This library is designed to be used with the `tokio` async runtime.
//! It turns an inbound push invitation, or a locally placed call, into membership of a single
//! RTC voice channel, and takes care of leaving that channel again when it is no longer needed.
//!
//! # Features
//! - **Invitation validation**: push payloads are parsed and freshness-checked before anything
//!   touches the engine. Display notifications are never mistaken for invitations.
//! - **At most one session**: starting a new session leaves the current one first.
//! - **Auto-leave**: an emptied channel is left after a short grace period, and a receiver that
//!   never sees the other party leaves after a bounded wait.
//! - **Initiator calls**: an outgoing call races the callee's arrival against a deadline and
//!   cleans up on every exit path.
//! - **Audio routing**: output volume is raised and the speaker selected for the session,
//!   without failing the session when the platform refuses.
//!
//! ## Out of scope
//! - The media pipeline, push delivery, and any UI. The engine and the platform audio
//!   subsystem are consumed through the [`engine::RtcEngine`] and [`audio::AudioDevice`] traits.
pub mod audio;
pub mod engine;
pub mod invitation;
pub mod sessions;
