mod chat_message;
mod counter;
mod envelope;
mod payload;
mod theme;
mod user;

pub use chat_message::{ChatMessage, MessageKind, SYSTEM_USER_ID, SYSTEM_USER_NAME};
pub use counter::CounterState;
pub use envelope::Envelope;
pub use payload::Payload;
pub use theme::Theme;
pub use user::{Activity, ActivityKind, PeerId, User};
