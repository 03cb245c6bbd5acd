//! Offer lifecycle: issue, accept, decline, and expire time-boxed slot offers.

mod token;

pub use token::{mint_token, OfferClaim, OfferTokenStore, TOKEN_BYTES};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::collaborators::{
    AuditAction, AuditEvent, NoticeChannel, NoticeKind, OfferNotice, OfferNotifier,
};
use super::domain::{
    EntryId, Offer, OfferId, OfferStatus, OpenSlot, SlotRequest, WaitlistEntry, WaitlistStatus,
};
use super::error::WaitlistError;
use super::repository::{EntryRepository, RepositoryError};
use super::service::{WaitlistService, ENTRY_RESOURCE};
use super::settings::{CommunicationSettings, WaitlistSettings};

fn default_notify() -> bool {
    true
}

/// Body of a manual send-offer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOfferRequest {
    pub appointment_slot: SlotRequest,
    #[serde(default)]
    pub expiry_minutes: Option<u32>,
    #[serde(default = "default_notify")]
    pub notify_patient: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferOptions {
    pub expiry_minutes: Option<u32>,
    pub notify_patient: bool,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            expiry_minutes: None,
            notify_patient: true,
        }
    }
}

/// Body of accept/decline calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferResponse {
    pub token: String,
}

/// Summary of a sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub offers_expired: usize,
    pub entries_expired: usize,
}

enum Resolution {
    Answered(Offer),
    Lapsed(Offer),
}

impl<R, N> WaitlistService<R, N>
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    /// Offer `slot` to an active entry and return the pending offer with its token.
    pub fn send_offer(
        &self,
        id: &EntryId,
        slot: &OpenSlot,
        options: OfferOptions,
    ) -> Result<Offer, WaitlistError> {
        if let Some(minutes) = options.expiry_minutes {
            let (min, max) = WaitlistSettings::OFFER_EXPIRY_MINUTES;
            if !(min..=max).contains(&minutes) {
                return Err(WaitlistError::Validation(format!(
                    "expiry_minutes must be between {min} and {max}"
                )));
            }
        }
        let settings = self.settings.load()?;
        let expiry_minutes = options
            .expiry_minutes
            .unwrap_or(settings.offer_expiry_minutes);

        let entry = self.get(id)?;
        entry.ensure_status(WaitlistStatus::Active, "send offer to")?;
        if self.calendar.has_appointment_on(&entry.patient_id, slot.date) {
            return Err(WaitlistError::Conflict(format!(
                "patient already has an appointment on {}",
                slot.date
            )));
        }

        let now = self.clock.now();
        let offer = Offer {
            id: OfferId::generate(),
            appointment_slot: slot.appointment_slot(),
            offered_at: now,
            expires_at: now + Duration::minutes(i64::from(expiry_minutes)),
            token: mint_token(),
            status: OfferStatus::Pending,
            responded_at: None,
        };

        // the token must be resolvable before the entry shows the offer
        self.tokens
            .register(
                &offer.token,
                OfferClaim {
                    entry_id: id.clone(),
                    offer_id: offer.id.clone(),
                },
            )
            .map_err(|err| match err {
                RepositoryError::Conflict => {
                    WaitlistError::Conflict("offer token collision, retry".to_string())
                }
                other => other.into(),
            })?;

        let committed = self.mutate_entry(id, |entry| entry.attach_offer(offer.clone(), now));
        let (entry, ()) = match committed {
            Ok(result) => result,
            Err(err) => {
                self.revoke_token(&offer.token);
                return Err(err);
            }
        };

        self.record_audit(
            AuditEvent::new(AuditAction::Update, ENTRY_RESOURCE, entry.id.0.clone())
                .for_patient(entry.patient_id.clone())
                .with("action", "offer_sent")
                .with("offer_id", offer.id.0.clone())
                .with("slot_date", slot.date.to_string())
                .with("slot_time", slot.time.to_string()),
        );
        tracing::info!(
            entry_id = %entry.id,
            offer_id = %offer.id,
            slot_date = %slot.date,
            slot_time = %slot.time,
            expires_at = %offer.expires_at,
            "waitlist offer issued"
        );

        if options.notify_patient {
            self.notify(
                NoticeKind::OfferIssued,
                &entry,
                &offer,
                Some(offer.token.clone()),
                &settings.communication,
            );
        }

        Ok(offer)
    }

    /// Accept the pending offer; the entry becomes booked.
    pub fn accept_offer(&self, id: &EntryId, token: &str) -> Result<WaitlistEntry, WaitlistError> {
        let (entry, offer) = self.respond(id, token, OfferStatus::Accepted)?;
        let settings = self.settings.load()?;
        self.notify(
            NoticeKind::OfferAccepted,
            &entry,
            &offer,
            None,
            &settings.communication,
        );
        Ok(entry)
    }

    /// Decline the pending offer; the entry returns to the active pool.
    pub fn decline_offer(
        &self,
        id: &EntryId,
        token: &str,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let (entry, _) = self.respond(id, token, OfferStatus::Declined)?;
        Ok(entry)
    }

    fn respond(
        &self,
        id: &EntryId,
        token: &str,
        outcome: OfferStatus,
    ) -> Result<(WaitlistEntry, Offer), WaitlistError> {
        self.get(id)?;
        let claim = self
            .tokens
            .take_for_entry(token, id)?
            .ok_or(WaitlistError::InvalidToken)?;
        let now = self.clock.now();

        let committed = self.mutate_entry(id, |entry| {
            let matches_claim = entry
                .pending_offer()
                .is_some_and(|offer| offer.id == claim.offer_id && offer.token == token);
            if entry.status != WaitlistStatus::Offered || !matches_claim {
                return Err(WaitlistError::InvalidToken);
            }
            let expired = entry
                .pending_offer()
                .is_some_and(|offer| offer.is_expired_at(now));
            let status = if expired { OfferStatus::Expired } else { outcome };
            let closed = entry
                .close_offer(status, now)
                .ok_or(WaitlistError::InvalidToken)?;
            Ok(if expired {
                Resolution::Lapsed(closed)
            } else {
                Resolution::Answered(closed)
            })
        });

        let (entry, resolution) = match committed {
            Ok(result) => result,
            Err(WaitlistError::InvalidToken) => return Err(WaitlistError::InvalidToken),
            Err(err) => {
                // the answer never landed; the pending offer still needs its token
                if let Err(restore) = self.tokens.register(token, claim) {
                    tracing::warn!(
                        entry_id = %id,
                        error = %restore,
                        "failed to restore offer token"
                    );
                }
                return Err(err);
            }
        };

        match resolution {
            Resolution::Lapsed(offer) => {
                self.record_offer_closed(&entry, &offer, "offer_expired");
                tracing::info!(
                    entry_id = %entry.id,
                    offer_id = %offer.id,
                    "offer answered after expiry"
                );
                Err(WaitlistError::Expired)
            }
            Resolution::Answered(offer) => {
                let action = match outcome {
                    OfferStatus::Accepted => "offer_accepted",
                    _ => "offer_declined",
                };
                self.record_offer_closed(&entry, &offer, action);
                tracing::info!(
                    entry_id = %entry.id,
                    offer_id = %offer.id,
                    status = %entry.status,
                    action,
                    "waitlist offer answered"
                );
                Ok((entry, offer))
            }
        }
    }

    /// Expire every pending offer whose deadline has passed.
    pub fn expire_offers(&self) -> Result<usize, WaitlistError> {
        let now = self.clock.now();
        let lapsed: Vec<EntryId> = self
            .entries
            .with_status(WaitlistStatus::Offered)?
            .into_iter()
            .filter(|entry| {
                entry
                    .pending_offer()
                    .is_some_and(|offer| offer.is_expired_at(now))
            })
            .map(|entry| entry.id)
            .collect();

        let mut expired = 0;
        for id in lapsed {
            let committed = self.mutate_entry(&id, |entry| {
                let due = entry
                    .pending_offer()
                    .is_some_and(|offer| offer.is_expired_at(now));
                if entry.status != WaitlistStatus::Offered || !due {
                    return Err(WaitlistError::InvalidState {
                        action: "expire offer on",
                        status: entry.status,
                    });
                }
                entry
                    .close_offer(OfferStatus::Expired, now)
                    .ok_or(WaitlistError::InvalidState {
                        action: "expire offer on",
                        status: entry.status,
                    })
            });

            match committed {
                Ok((entry, offer)) => {
                    self.revoke_token(&offer.token);
                    self.record_offer_closed(&entry, &offer, "offer_expired");
                    expired += 1;
                }
                // answered or withdrawn since the scan
                Err(WaitlistError::InvalidState { .. } | WaitlistError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        if expired > 0 {
            tracing::info!(expired, "expired lapsed waitlist offers");
        }
        Ok(expired)
    }

    /// Expire active entries past their own deadline or idle longer than `auto_expire_days`.
    pub fn expire_stale_entries(&self) -> Result<usize, WaitlistError> {
        let now = self.clock.now();
        let idle_limit = Duration::days(i64::from(self.settings.load()?.auto_expire_days));
        let is_stale = |entry: &WaitlistEntry| -> bool {
            entry.expires_at.is_some_and(|deadline| deadline <= now)
                || entry.updated_at + idle_limit <= now
        };

        let stale: Vec<EntryId> = self
            .entries
            .with_status(WaitlistStatus::Active)?
            .into_iter()
            .filter(|entry| is_stale(entry))
            .map(|entry| entry.id)
            .collect();

        let mut expired = 0;
        for id in stale {
            let committed = self.mutate_entry(&id, |entry| {
                entry.ensure_status(WaitlistStatus::Active, "expire")?;
                if !is_stale(entry) {
                    return Err(WaitlistError::InvalidState {
                        action: "expire",
                        status: entry.status,
                    });
                }
                entry.status = WaitlistStatus::Expired;
                entry.updated_at = now;
                Ok(())
            });

            match committed {
                Ok((entry, ())) => {
                    self.record_audit(
                        AuditEvent::new(AuditAction::Update, ENTRY_RESOURCE, entry.id.0.clone())
                            .for_patient(entry.patient_id.clone())
                            .with("action", "entry_expired"),
                    );
                    expired += 1;
                }
                Err(WaitlistError::InvalidState { .. } | WaitlistError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        if expired > 0 {
            tracing::info!(expired, "expired stale waitlist entries");
        }
        Ok(expired)
    }

    /// Run both sweeps; used by the periodic background task and the manual trigger.
    pub fn run_sweeps(&self) -> Result<SweepReport, WaitlistError> {
        Ok(SweepReport {
            offers_expired: self.expire_offers()?,
            entries_expired: self.expire_stale_entries()?,
        })
    }

    fn record_offer_closed(&self, entry: &WaitlistEntry, offer: &Offer, action: &str) {
        self.record_audit(
            AuditEvent::new(AuditAction::Update, ENTRY_RESOURCE, entry.id.0.clone())
                .for_patient(entry.patient_id.clone())
                .with("action", action)
                .with("offer_id", offer.id.0.clone()),
        );
    }

    fn notify(
        &self,
        kind: NoticeKind,
        entry: &WaitlistEntry,
        offer: &Offer,
        token: Option<String>,
        communication: &CommunicationSettings,
    ) {
        let channels = channels_for(entry, communication);
        if channels.is_empty() {
            tracing::debug!(entry_id = %entry.id, ?kind, "no notification channel enabled");
            return;
        }

        let notice = OfferNotice {
            kind,
            entry_id: entry.id.clone(),
            offer_id: offer.id.clone(),
            patient_name: entry.patient_name.clone(),
            patient_phone: entry.patient_phone.clone(),
            patient_email: entry.patient_email.clone(),
            slot: offer.appointment_slot.clone(),
            expires_at: offer.expires_at,
            token,
            channels,
        };

        // delivery failures never roll back the state change
        if let Err(err) = self.notifier.deliver(notice) {
            tracing::warn!(
                entry_id = %entry.id,
                offer_id = %offer.id,
                ?kind,
                error = %err,
                "offer notification failed"
            );
        }
    }
}

fn channels_for(entry: &WaitlistEntry, communication: &CommunicationSettings) -> Vec<NoticeChannel> {
    let mut channels = Vec::new();
    if communication.sms_enabled {
        channels.push(NoticeChannel::Sms);
    }
    if communication.email_enabled && entry.patient_email.is_some() {
        channels.push(NoticeChannel::Email);
    }
    channels
}

/// Minutes between `now` and the offer deadline, floored at zero.
pub fn minutes_remaining(offer: &Offer, now: DateTime<Utc>) -> i64 {
    (offer.expires_at - now).num_minutes().max(0)
}
