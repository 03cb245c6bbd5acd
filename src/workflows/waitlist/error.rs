use super::domain::{EntryId, WaitlistStatus};
use super::repository::RepositoryError;

/// Error taxonomy surfaced by every waitlist operation.
#[derive(Debug, thiserror::Error)]
pub enum WaitlistError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("cannot {action} {status} waitlist entry")]
    InvalidState {
        action: &'static str,
        status: WaitlistStatus,
    },
    #[error("{0}")]
    Conflict(String),
    /// Deliberately undifferentiated: unknown, foreign, and consumed tokens look identical.
    #[error("invalid or expired offer token")]
    InvalidToken,
    #[error("offer has expired")]
    Expired,
    #[error("slot is too soon; minimum notice is {required_minutes} minutes")]
    InsufficientNotice {
        required_minutes: u32,
        available_minutes: i64,
    },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl WaitlistError {
    pub fn entry_not_found(id: &EntryId) -> Self {
        Self::NotFound(format!("waitlist entry {id}"))
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Expired => "OFFER_EXPIRED",
            Self::InsufficientNotice { .. } => "INSUFFICIENT_NOTICE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Repository(_) => "STORE_UNAVAILABLE",
        }
    }
}
