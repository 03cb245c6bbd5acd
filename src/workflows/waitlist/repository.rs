use super::domain::{EntryId, WaitlistEntry, WaitlistStatus};

/// Storage abstraction for waitlist entries.
///
/// Writes go through [`EntryRepository::compare_and_swap`] so that a status transition is applied
/// only if nobody else touched the entry since it was read.
pub trait EntryRepository: Send + Sync {
    /// Store a new entry.
    ///
    /// Fails with [`RepositoryError::Conflict`] when the id is taken and with
    /// [`RepositoryError::LiveEntryExists`] when the patient already holds an active or offered
    /// entry for one of the same services. Both checks are atomic with the write.
    fn insert(&self, entry: WaitlistEntry) -> Result<WaitlistEntry, RepositoryError>;
    fn fetch(&self, id: &EntryId) -> Result<Option<WaitlistEntry>, RepositoryError>;
    /// Store `entry` if the persisted revision still equals `entry.revision`.
    ///
    /// Returns the stored copy with its revision bumped, or [`RepositoryError::Stale`] when the
    /// entry changed underneath the caller.
    fn compare_and_swap(&self, entry: WaitlistEntry) -> Result<WaitlistEntry, RepositoryError>;
    fn list(&self) -> Result<Vec<WaitlistEntry>, RepositoryError>;
    fn with_status(&self, status: WaitlistStatus) -> Result<Vec<WaitlistEntry>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("patient already holds a live entry for a requested service")]
    LiveEntryExists,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    Stale,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
