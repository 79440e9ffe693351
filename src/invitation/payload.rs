use std::collections::HashMap;

use serde::Deserialize;

use super::error::InvitationError;

pub const TOKEN_KEY: &str = "token";
pub const REMOTE_USER_ID_KEY: &str = "remoteUserId";
pub const CHANNEL_ID_KEY: &str = "channelId";
pub const DISPLAY_NAME_KEY: &str = "displayName";
pub const AVATAR_URL_KEY: &str = "avatarUrl";
pub const ISSUED_AT_KEY: &str = "issuedAt";

/// Display fields of a push message. Their presence marks the message as a
/// user-visible notification rather than a call invitation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Key-value payload as delivered by the push transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub data: HashMap<String, String>,
    #[serde(default)]
    pub notification: Option<NotificationFields>,
}

impl RawPayload {
    pub fn data_only<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RawPayload {
            data: entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            notification: None,
        }
    }

    pub fn with_notification(mut self, notification: NotificationFields) -> Self {
        self.notification = Some(notification);
        self
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, InvitationError> {
        serde_json::from_slice(bytes).map_err(|e| InvitationError::InvalidJson(e.to_string()))
    }

    pub fn is_data_only(&self) -> bool {
        self.notification.is_none()
    }

    /// Returns the trimmed value for `key`, treating blank values as absent.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// Returns the value for `key` exactly as delivered, treating blank values as absent.
    /// For opaque credentials that must not be altered.
    pub fn verbatim_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }
}
