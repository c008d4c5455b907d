pub mod booking;
pub mod enquiry;
pub mod events;
pub mod money;
pub mod package;
pub mod payment;
pub mod repository;
pub mod retry;
pub mod search;
pub mod supplier;
pub mod user;

pub use supplier::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid transition from {from} to {to} by {actor}")]
    InvalidTransition {
        from: String,
        to: String,
        actor: String,
    },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

pub(crate) fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::ValidationError(msg.into())
}
