use serde::{Deserialize, Serialize};

use super::user::PeerId;

pub const SYSTEM_USER_ID: &str = "system";
pub const SYSTEM_USER_NAME: &str = "System";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    User,
    System,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: PeerId,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub text: String,
    pub timestamp: i64,
    #[serde(rename = "expiresAt")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(rename = "type")]
    #[serde(default)]
    pub kind: MessageKind,
}

impl ChatMessage {
    /// Local-only notice shown in the chat log. Never broadcast.
    pub fn system(id: &str, text: &str, timestamp: i64) -> Self {
        Self {
            id: String::from(id),
            user_id: String::from(SYSTEM_USER_ID),
            user_name: String::from(SYSTEM_USER_NAME),
            text: String::from(text),
            timestamp,
            expires_at: None,
            kind: MessageKind::System,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}
