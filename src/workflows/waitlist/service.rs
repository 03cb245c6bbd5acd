use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};

use super::collaborators::{
    AppointmentCalendar, AuditAction, AuditEvent, AuditSink, Clock, OfferNotifier, SystemClock,
    TracingAuditSink,
};
use super::domain::{EntryId, OfferStatus, WaitlistEntry, WaitlistStatus};
use super::error::WaitlistError;
use super::intake::{EntryDraft, EntryPatch};
use super::memory::{InMemoryOfferTokenStore, InMemorySettingsStore};
use super::offers::OfferTokenStore;
use super::query::{EntryPage, EntryQuery};
use super::repository::{EntryRepository, RepositoryError};
use super::settings::{SettingsPatch, SettingsStore, WaitlistSettings};

/// Bounded re-read attempts when a compare-and-swap loses a race.
pub(crate) const MAX_WRITE_ATTEMPTS: usize = 3;

pub(crate) const ENTRY_RESOURCE: &str = "waitlist";
pub(crate) const SETTINGS_RESOURCE: &str = "waitlist_settings";

/// Facade over the entry store, offer lifecycle, and auto-fill orchestration.
pub struct WaitlistService<R, N> {
    pub(crate) entries: Arc<R>,
    pub(crate) notifier: Arc<N>,
    pub(crate) tokens: Arc<dyn OfferTokenStore>,
    pub(crate) settings: Arc<dyn SettingsStore>,
    pub(crate) calendar: Arc<dyn AppointmentCalendar>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) clinic_offset: FixedOffset,
}

impl<R, N> WaitlistService<R, N>
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    pub fn new(
        entries: Arc<R>,
        notifier: Arc<N>,
        calendar: Arc<dyn AppointmentCalendar>,
        settings: WaitlistSettings,
    ) -> Self {
        Self {
            entries,
            notifier,
            tokens: Arc::new(InMemoryOfferTokenStore::default()),
            settings: Arc::new(InMemorySettingsStore::new(settings)),
            calendar,
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
            clinic_offset: Utc.fix(),
        }
    }

    pub fn with_token_store(mut self, tokens: Arc<dyn OfferTokenStore>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_settings_store(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Offset used to read slot wall-clock times as instants.
    pub fn with_clinic_offset(mut self, offset: FixedOffset) -> Self {
        self.clinic_offset = offset;
        self
    }

    /// List entries after expiring any lapsed offers.
    pub fn list(&self, query: &EntryQuery) -> Result<EntryPage, WaitlistError> {
        self.expire_offers()?;
        query.run(self.entries.list()?)
    }

    pub fn get(&self, id: &EntryId) -> Result<WaitlistEntry, WaitlistError> {
        self.entries
            .fetch(id)?
            .ok_or_else(|| WaitlistError::entry_not_found(id))
    }

    /// Add a patient to the waitlist.
    ///
    /// Fails with a conflict when the patient already has a live entry for any of the same
    /// services.
    pub fn create(&self, draft: EntryDraft) -> Result<WaitlistEntry, WaitlistError> {
        let entry = draft.into_entry(self.clock.now())?;

        let stored = self.entries.insert(entry).map_err(|err| match err {
            RepositoryError::LiveEntryExists => WaitlistError::Conflict(
                "patient is already on the waitlist for one or more of these services"
                    .to_string(),
            ),
            RepositoryError::Conflict => {
                WaitlistError::Conflict("waitlist entry already exists".to_string())
            }
            other => other.into(),
        })?;

        self.record_audit(
            AuditEvent::new(AuditAction::Create, ENTRY_RESOURCE, stored.id.0.clone())
                .for_patient(stored.patient_id.clone())
                .with("service_ids", stored.service_ids.join(","))
                .with("priority", stored.priority.label()),
        );
        tracing::info!(
            entry_id = %stored.id,
            priority = stored.priority.label(),
            tier = stored.tier.label(),
            "waitlist entry created"
        );
        Ok(stored)
    }

    /// Edit contact details or preferences. Booked and cancelled entries are frozen.
    pub fn update(&self, id: &EntryId, patch: EntryPatch) -> Result<WaitlistEntry, WaitlistError> {
        let now = self.clock.now();
        let (entry, touched) = self.mutate_entry(id, |entry| {
            if matches!(
                entry.status,
                WaitlistStatus::Booked | WaitlistStatus::Cancelled
            ) {
                return Err(WaitlistError::InvalidState {
                    action: "update",
                    status: entry.status,
                });
            }
            patch.apply(entry, now)
        })?;

        self.record_audit(
            AuditEvent::new(AuditAction::Update, ENTRY_RESOURCE, entry.id.0.clone())
                .for_patient(entry.patient_id.clone())
                .with("updated_fields", touched.join(",")),
        );
        tracing::info!(entry_id = %entry.id, fields = ?touched, "waitlist entry updated");
        Ok(entry)
    }

    /// Remove a patient from the waitlist, withdrawing any outstanding offer.
    pub fn cancel(
        &self,
        id: &EntryId,
        reason: Option<String>,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let now = self.clock.now();
        let reason = reason
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        let (entry, withdrawn) = self.mutate_entry(id, |entry| {
            if entry.status.is_terminal() {
                return Err(WaitlistError::InvalidState {
                    action: "cancel",
                    status: entry.status,
                });
            }
            let withdrawn = entry.close_offer(OfferStatus::Expired, now);
            entry.status = WaitlistStatus::Cancelled;
            entry.updated_at = now;
            if let Some(reason) = &reason {
                let line = format!("Cancellation reason: {reason}");
                entry.notes = Some(match entry.notes.take().filter(|n| !n.is_empty()) {
                    Some(existing) => format!("{existing}\n\n{line}"),
                    None => line,
                });
            }
            Ok(withdrawn)
        })?;

        if let Some(offer) = &withdrawn {
            self.revoke_token(&offer.token);
        }

        let mut event = AuditEvent::new(AuditAction::Delete, ENTRY_RESOURCE, entry.id.0.clone())
            .for_patient(entry.patient_id.clone());
        if let Some(reason) = &reason {
            event = event.with("reason", reason.clone());
        }
        self.record_audit(event);
        tracing::info!(
            entry_id = %entry.id,
            withdrew_offer = withdrawn.is_some(),
            "waitlist entry cancelled"
        );
        Ok(entry)
    }

    pub fn settings(&self) -> Result<WaitlistSettings, WaitlistError> {
        Ok(self.settings.load()?)
    }

    /// Apply a partial settings update; nothing is stored unless every field validates.
    pub fn update_settings(&self, patch: SettingsPatch) -> Result<WaitlistSettings, WaitlistError> {
        let next = self.commit_settings(&patch)?;

        let touched = patch.touched_fields();
        self.record_audit(
            AuditEvent::new(AuditAction::Update, SETTINGS_RESOURCE, "default")
                .with("updated_fields", touched.join(",")),
        );
        tracing::info!(fields = ?touched, "waitlist settings updated");
        Ok(next)
    }

    fn commit_settings(&self, patch: &SettingsPatch) -> Result<WaitlistSettings, WaitlistError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (current, revision) = self.settings.snapshot()?;
            let next = current.patched(patch)?;
            match self.settings.compare_and_store(next.clone(), revision) {
                Ok(_) => return Ok(next),
                Err(RepositoryError::Stale) => {
                    tracing::debug!(attempt, "settings changed concurrently, re-reading");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(WaitlistError::Conflict(
            "waitlist settings are being modified concurrently, try again".to_string(),
        ))
    }

    /// Read-modify-write one entry under compare-and-swap.
    ///
    /// `change` may run more than once when another writer wins the race, so it must only touch
    /// the entry it is handed.
    pub(crate) fn mutate_entry<T>(
        &self,
        id: &EntryId,
        mut change: impl FnMut(&mut WaitlistEntry) -> Result<T, WaitlistError>,
    ) -> Result<(WaitlistEntry, T), WaitlistError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut entry = self
                .entries
                .fetch(id)?
                .ok_or_else(|| WaitlistError::entry_not_found(id))?;
            let outcome = change(&mut entry)?;

            match self.entries.compare_and_swap(entry) {
                Ok(stored) => return Ok((stored, outcome)),
                Err(RepositoryError::Stale) => {
                    tracing::debug!(entry_id = %id, attempt, "entry changed concurrently, re-reading");
                }
                Err(RepositoryError::NotFound) => return Err(WaitlistError::entry_not_found(id)),
                Err(other) => return Err(other.into()),
            }
        }

        Err(WaitlistError::Conflict(format!(
            "waitlist entry {id} is being modified concurrently, try again"
        )))
    }

    pub(crate) fn record_audit(&self, event: AuditEvent) {
        let resource_id = event.resource_id.clone();
        if let Err(err) = self.audit.record(event) {
            tracing::warn!(%resource_id, error = %err, "failed to record audit event");
        }
    }

    pub(crate) fn revoke_token(&self, token: &str) {
        if let Err(err) = self.tokens.revoke(token) {
            tracing::warn!(error = %err, "failed to revoke offer token");
        }
    }
}
