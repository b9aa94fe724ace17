use std::{fmt::Display, time::Duration};

use crate::{
    error::SessionError,
    protocol_objects::{Payload, Theme, User},
    session_event::SessionEvent,
    session::SessionSnapshot,
};

// Constants
pub const DEFAULT_CHANNEL_NAME: &str = "collab-session-v2";
pub const DEFAULT_FALLBACK_CHANNEL_NAME: &str = "collab-session-v2-native";
pub const DEFAULT_TRANSPORT_CAPACITY: usize = 256;
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(50);
pub const DEFAULT_REPLY_JITTER: Duration = Duration::from_millis(50);
pub const DEFAULT_REANNOUNCE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_RESUME_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TYPING_IDLE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_SYNC_REQUEST_SCHEDULE: [Duration; 4] = [
    Duration::ZERO,
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_millis(1000),
];

pub const USER_KEY_PREFIX: &str = "session-user-";
pub const THEME_KEY: &str = "session-theme";

pub type Result<Type> = std::result::Result<Type, SessionError>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    Announcing,
    Converged,
}

impl Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Disconnected => write!(f, "disconnected"),
            SessionPhase::Announcing => write!(f, "announcing"),
            SessionPhase::Converged => write!(f, "converged"),
        }
    }
}

/// Self-report that can be sent after a delay. The payload is built from the
/// local user at the moment the timer fires, not when it was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Announcement {
    Join,
    SyncRequest,
    SyncResponse,
}

impl Announcement {
    pub(crate) fn payload(self, local: &User) -> Payload {
        match self {
            Announcement::Join => Payload::Join {
                user: local.clone(),
            },
            Announcement::SyncRequest => Payload::SyncRequest,
            Announcement::SyncResponse => Payload::SyncResponse {
                user: local.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnnounceDelay {
    /// Short randomized delay used when answering another peer.
    Reply,
    /// Further delay before repeating our own `join`.
    Reannounce,
}

/// Side effect requested by a reducer, executed by the session outside the state lock.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    Publish(Payload),
    Announce {
        announcement: Announcement,
        delay: AnnounceDelay,
    },
    PersistUser(User),
    PersistTheme(Theme),
    Notice(String),
}

#[derive(Debug, Default)]
pub(crate) struct Reaction {
    pub(crate) changed: bool,
    pub(crate) effects: Vec<Effect>,
}

impl Reaction {
    pub(crate) fn unchanged() -> Self {
        Self::default()
    }

    pub(crate) fn changed(effects: Vec<Effect>) -> Self {
        Self {
            changed: true,
            effects,
        }
    }
}

pub(crate) type ChangeCallback = Box<dyn Fn(&SessionSnapshot) + Send + Sync>;
pub(crate) type NoticeCallback = Box<dyn Fn(&str) + Send + Sync>;

pub(crate) struct Binding {
    callback: SessionEvent,
}

impl Binding {
    pub(crate) fn new(callback: SessionEvent) -> Self {
        Self { callback }
    }

    pub(crate) fn invoke_changed(&self, snapshot: &SessionSnapshot) {
        self.callback.invoke_changed(snapshot)
    }

    pub(crate) fn invoke_notice(&self, notice: &str) {
        self.callback.invoke_notice(notice)
    }
}

