use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to serialize envelope to JSON: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Storage operation failed: {0}")]
    StorageError(#[from] std::io::Error),

    #[error("Transport channel closed")]
    TransportClosed,

    #[error("Session is not started. Call 'start' before sending {intent}.")]
    NotStarted { intent: String },

    #[error("Tried to start a session twice. 'start' can only be called once per running session")]
    AlreadyStarted,

    #[error("Invalid value '{value}' for configuration key {key}")]
    InvalidConfig { key: String, value: String },

    #[error("Task panicked or was cancelled: {0}")]
    TaskPanic(#[from] JoinError),

    #[error("Multiple tasks failed ({} errors): {}", errors.len(), .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    MultipleTaskErrors { errors: Vec<SessionError> },
}
