use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{Level, event, instrument};

use super::error::InvitationError;
use super::payload::{AVATAR_URL_KEY, CHANNEL_ID_KEY, DISPLAY_NAME_KEY, ISSUED_AT_KEY, REMOTE_USER_ID_KEY, RawPayload, TOKEN_KEY};

pub const DEFAULT_MAX_INVITATION_AGE: Duration = Duration::from_secs(15);

/// A call invitation that passed validation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    token: String,
    remote_user_id: u32,
    channel_id: String,
    display_name: String,
    avatar_url: Option<String>,
    issued_at_unix_secs: i64,
}

impl Invitation {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Engine uid of the inviting user. Engine uids are 32-bit, so larger ids are rejected
    /// as malformed.
    pub fn remote_user_id(&self) -> u32 {
        self.remote_user_id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }

    pub fn issued_at_unix_secs(&self) -> i64 {
        self.issued_at_unix_secs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvitationValidator {
    max_age: Duration,
}

impl Default for InvitationValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INVITATION_AGE)
    }
}

impl InvitationValidator {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn validate(&self, raw: &RawPayload) -> Result<Invitation, InvitationError> {
        self.validate_at(raw, unix_now())
    }

    /// Validates `raw` against the given wall clock reading, in seconds since the epoch.
    #[instrument(skip_all, fields(now = now_unix_secs))]
    pub fn validate_at(&self, raw: &RawPayload, now_unix_secs: i64) -> Result<Invitation, InvitationError> {
        let result = self.check(raw, now_unix_secs);
        if let Err(e) = &result {
            event!(Level::WARN, reason = %e.reason(), "Dropping push invitation: {}", e);
        }
        result
    }

    fn check(&self, raw: &RawPayload, now_unix_secs: i64) -> Result<Invitation, InvitationError> {
        if !raw.is_data_only() {
            return Err(InvitationError::DisplayPayload);
        }

        let token = raw.verbatim_field(TOKEN_KEY).ok_or(InvitationError::MissingField(TOKEN_KEY))?;
        let remote_user_id = required(raw, REMOTE_USER_ID_KEY)?;
        let channel_id = required(raw, CHANNEL_ID_KEY)?;
        let display_name = required(raw, DISPLAY_NAME_KEY)?;
        let issued_at = required(raw, ISSUED_AT_KEY)?;

        let remote_user_id = remote_user_id.parse::<u32>().map_err(|_| InvitationError::Malformed {
            field: REMOTE_USER_ID_KEY,
            value: remote_user_id.to_string(),
        })?;
        let issued_at_unix_secs = issued_at.parse::<i64>().map_err(|_| InvitationError::Malformed {
            field: ISSUED_AT_KEY,
            value: issued_at.to_string(),
        })?;

        let age_secs = now_unix_secs.saturating_sub(issued_at_unix_secs);
        if age_secs > self.max_age.as_secs() as i64 {
            return Err(InvitationError::Stale {
                age_secs,
                max_age_secs: self.max_age.as_secs(),
            });
        }

        Ok(Invitation {
            token: token.to_string(),
            remote_user_id,
            channel_id: channel_id.to_string(),
            display_name: display_name.to_string(),
            avatar_url: raw.field(AVATAR_URL_KEY).map(str::to_string),
            issued_at_unix_secs,
        })
    }
}

fn required<'a>(raw: &'a RawPayload, key: &'static str) -> Result<&'a str, InvitationError> {
    raw.field(key).ok_or(InvitationError::MissingField(key))
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
