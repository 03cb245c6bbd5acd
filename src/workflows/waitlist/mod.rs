//! Waitlist matching and offer engine.
//!
//! When an appointment slot frees up, the engine finds the waiting patients whose preferences
//! fit it, ranks them by the configured policy, and issues time-boxed offers secured by
//! single-use tokens. Patients answer through the token; unanswered offers lapse back into the
//! pool.

pub mod autofill;
pub mod collaborators;
pub mod domain;
pub mod error;
pub mod intake;
pub mod matching;
pub mod memory;
pub mod offers;
pub mod query;
pub mod ranking;
pub mod repository;
pub mod router;
pub mod service;
pub mod settings;

#[cfg(test)]
mod tests;

pub use autofill::{
    AutoFillOptions, AutoFillOutcome, AutoFillRequest, IssuedOffer, MatchRequest,
    SkippedCandidate,
};
pub use collaborators::{
    AppointmentCalendar, AuditAction, AuditError, AuditEvent, AuditSink, Clock, NoticeChannel,
    NoticeKind, NotificationError, OfferNotice, OfferNotifier, SystemClock, TracingAuditSink,
};
pub use domain::{
    AppointmentSlot, DayOfWeek, EntryId, Offer, OfferId, OfferStatus, OpenSlot, SlotRequest,
    TimeOfDay, TimeRange, VipTier, WaitlistEntry, WaitlistPriority, WaitlistStatus,
};
pub use error::WaitlistError;
pub use intake::{EntryDraft, EntryPatch};
pub use matching::{is_eligible, MatchRejection, PreferenceMatcher};
pub use memory::{InMemoryEntryRepository, InMemoryOfferTokenStore, InMemorySettingsStore};
pub use offers::{
    OfferClaim, OfferOptions, OfferResponse, OfferTokenStore, SendOfferRequest, SweepReport,
};
pub use query::{EntryPage, EntryQuery, SortField, SortOrder};
pub use ranking::{rank, RankedCandidate, RankingPolicy};
pub use repository::{EntryRepository, RepositoryError};
pub use router::waitlist_router;
pub use service::WaitlistService;
pub use settings::{
    AutoTierRules, CommunicationSettings, OfferSequence, SettingsPatch, SettingsStore, TierRule,
    TierWeights, WaitlistSettings,
};
