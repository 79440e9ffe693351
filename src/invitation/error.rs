use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvitationError {
    #[error("Payload carries display notification fields")]
    DisplayPayload,
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Missing or blank field `{0}`")]
    MissingField(&'static str),
    #[error("Field `{field}` has invalid value `{value}`")]
    Malformed { field: &'static str, value: String },
    #[error("Invitation is {age_secs}s old (limit {max_age_secs}s)")]
    Stale { age_secs: i64, max_age_secs: u64 },
}

/// Coarse rejection category, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    Malformed,
    MissingField,
    Stale,
}

impl InvitationError {
    pub fn reason(&self) -> RejectionReason {
        match self {
            InvitationError::DisplayPayload | InvitationError::InvalidJson(_) | InvitationError::Malformed { .. } => RejectionReason::Malformed,
            InvitationError::MissingField(_) => RejectionReason::MissingField,
            InvitationError::Stale { .. } => RejectionReason::Stale,
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::Malformed => write!(f, "malformed"),
            RejectionReason::MissingField => write!(f, "missing-field"),
            RejectionReason::Stale => write!(f, "stale"),
        }
    }
}
