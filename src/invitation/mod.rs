pub mod error;
pub mod payload;
pub mod validator;

pub use error::{InvitationError, RejectionReason};
pub use payload::{NotificationFields, RawPayload};
pub use validator::{Invitation, InvitationValidator};
