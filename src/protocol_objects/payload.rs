use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::{chat_message::ChatMessage, counter::CounterState, theme::Theme, user::User};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Payload {
    Join {
        user: User,
    },
    Leave,
    SyncRequest,
    SyncResponse {
        user: User,
    },
    Activity {
        user: User,
    },
    CounterUpdate {
        counter: CounterState,
    },
    NewMessage {
        #[serde(rename = "chatMessage")]
        chat_message: ChatMessage,
    },
    DeleteMessage {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    UserTyping {
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    ThemeChange {
        theme: Theme,
    },
}

impl Payload {
    /// Origin implied by the payload body, for envelopes that omit `userId`.
    pub(crate) fn implied_origin(&self) -> Option<&str> {
        match self {
            Payload::Join { user } | Payload::SyncResponse { user } | Payload::Activity { user } => {
                Some(&user.id)
            }
            Payload::NewMessage { chat_message } => Some(&chat_message.user_id),
            _ => None,
        }
    }
}

impl Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Join { .. } => write!(f, "join"),
            Payload::Leave => write!(f, "leave"),
            Payload::SyncRequest => write!(f, "sync-request"),
            Payload::SyncResponse { .. } => write!(f, "sync-response"),
            Payload::Activity { .. } => write!(f, "activity"),
            Payload::CounterUpdate { .. } => write!(f, "counter-update"),
            Payload::NewMessage { .. } => write!(f, "new-message"),
            Payload::DeleteMessage { .. } => write!(f, "delete-message"),
            Payload::UserTyping { .. } => write!(f, "user-typing"),
            Payload::ThemeChange { .. } => write!(f, "theme-change"),
        }
    }
}
