mod actor;
pub mod config;
pub mod error;
pub mod events;
pub mod initiator;
pub mod orchestrator;
mod presence;
pub mod session;
mod timers;

pub use actor::LeaveOptions;
pub use config::OrchestratorConfig;
pub use error::SessionError;
pub use initiator::{OutgoingCall, WaitOutcome};
pub use orchestrator::{PushOutcome, SessionOrchestrator};
pub use session::{FailureReason, Role, SessionSnapshot, SessionStatus};
