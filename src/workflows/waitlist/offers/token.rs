use rand::{rngs::OsRng, RngCore};

use crate::workflows::waitlist::domain::{EntryId, OfferId};
use crate::workflows::waitlist::repository::RepositoryError;

/// Byte length of a freshly minted offer token before hex encoding.
pub const TOKEN_BYTES: usize = 32;

/// Generate an opaque single-use offer token.
///
/// Tokens come from the OS CSPRNG and carry no information about the entry or offer.
pub fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// What a live token grants: the right to answer one offer on one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferClaim {
    pub entry_id: EntryId,
    pub offer_id: OfferId,
}

/// Registry of outstanding offer tokens.
pub trait OfferTokenStore: Send + Sync {
    /// Fails with [`RepositoryError::Conflict`] if the token is already registered.
    fn register(&self, token: &str, claim: OfferClaim) -> Result<(), RepositoryError>;
    fn resolve(&self, token: &str) -> Result<Option<OfferClaim>, RepositoryError>;
    /// Atomically remove the token if it belongs to `entry_id`.
    ///
    /// A token registered for any other entry is left in place and `None` is returned.
    fn take_for_entry(
        &self,
        token: &str,
        entry_id: &EntryId,
    ) -> Result<Option<OfferClaim>, RepositoryError>;
    fn revoke(&self, token: &str) -> Result<(), RepositoryError>;
}
