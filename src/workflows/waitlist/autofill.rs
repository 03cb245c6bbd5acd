use serde::{Deserialize, Serialize};

use super::collaborators::OfferNotifier;
use super::domain::{EntryId, Offer, OpenSlot, SlotRequest, WaitlistStatus};
use super::error::WaitlistError;
use super::matching::PreferenceMatcher;
use super::offers::OfferOptions;
use super::ranking::{rank, RankedCandidate, RankingPolicy};
use super::repository::EntryRepository;
use super::service::WaitlistService;

pub const DEFAULT_MATCH_LIMIT: u32 = 10;
pub const MAX_MATCH_LIMIT: u32 = 50;
pub const DEFAULT_MAX_OFFERS: u32 = 3;
pub const MAX_OFFERS_CEILING: u32 = 10;

fn default_send_offers() -> bool {
    true
}

/// Body of a ranked match preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    #[serde(flatten)]
    pub slot: SlotRequest,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Body of an auto-fill run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFillRequest {
    #[serde(flatten)]
    pub slot: SlotRequest,
    #[serde(default = "default_send_offers")]
    pub send_offers: bool,
    #[serde(default)]
    pub max_offers: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoFillOptions {
    pub max_offers: u32,
    pub send_offers: bool,
}

impl Default for AutoFillOptions {
    fn default() -> Self {
        Self {
            max_offers: DEFAULT_MAX_OFFERS,
            send_offers: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedOffer {
    pub entry_id: EntryId,
    pub patient_name: String,
    pub offer: Offer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCandidate {
    pub entry_id: EntryId,
    pub code: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoFillOutcome {
    pub offers_sent: usize,
    pub offers: Vec<IssuedOffer>,
    /// Ranked candidates as they stood before any offer went out.
    pub matches: Vec<RankedCandidate>,
    pub skipped: Vec<SkippedCandidate>,
}

fn check_bound(field: &str, value: u32, max: u32) -> Result<(), WaitlistError> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(WaitlistError::Validation(format!(
            "{field} must be between 1 and {max}"
        )))
    }
}

impl<R, N> WaitlistService<R, N>
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    /// Ranked preview of the entries `slot` could be offered to. Nothing is mutated beyond the
    /// lapsed-offer sweep.
    pub fn match_slot(
        &self,
        slot: &OpenSlot,
        limit: u32,
    ) -> Result<Vec<RankedCandidate>, WaitlistError> {
        check_bound("limit", limit, MAX_MATCH_LIMIT)?;
        self.expire_offers()?;
        let mut ranked = self.ranked_candidates(slot)?;
        ranked.truncate(limit as usize);
        Ok(ranked)
    }

    /// Match, rank, and optionally offer `slot` to the best candidates.
    pub fn auto_fill(
        &self,
        slot: &OpenSlot,
        options: AutoFillOptions,
    ) -> Result<AutoFillOutcome, WaitlistError> {
        check_bound("max_offers", options.max_offers, MAX_OFFERS_CEILING)?;
        self.ensure_notice(slot)?;
        self.expire_offers()?;

        let matches = self.ranked_candidates(slot)?;
        if !options.send_offers {
            return Ok(AutoFillOutcome {
                offers_sent: 0,
                offers: Vec::new(),
                matches,
                skipped: Vec::new(),
            });
        }

        let mut offers = Vec::new();
        let mut skipped = Vec::new();
        for candidate in &matches {
            if offers.len() >= options.max_offers as usize {
                break;
            }
            let entry = &candidate.entry;
            match self.send_offer(&entry.id, slot, OfferOptions::default()) {
                Ok(offer) => offers.push(IssuedOffer {
                    entry_id: entry.id.clone(),
                    patient_name: entry.patient_name.clone(),
                    offer,
                }),
                Err(err) => {
                    tracing::warn!(
                        entry_id = %entry.id,
                        code = err.code(),
                        error = %err,
                        "skipping auto-fill candidate"
                    );
                    skipped.push(SkippedCandidate {
                        entry_id: entry.id.clone(),
                        code: err.code(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            slot_date = %slot.date,
            slot_time = %slot.time,
            provider_id = %slot.provider_id,
            candidates = matches.len(),
            offers_sent = offers.len(),
            skipped = skipped.len(),
            "auto-fill completed"
        );

        Ok(AutoFillOutcome {
            offers_sent: offers.len(),
            offers,
            matches,
            skipped,
        })
    }

    /// React to a freed slot using the configured policy.
    ///
    /// Returns `None` when automatic offers are switched off.
    pub fn handle_slot_released(
        &self,
        slot: &OpenSlot,
    ) -> Result<Option<AutoFillOutcome>, WaitlistError> {
        let settings = self.settings.load()?;
        if !settings.automatic_offers_enabled {
            tracing::debug!(
                slot_date = %slot.date,
                slot_time = %slot.time,
                "automatic offers disabled"
            );
            return Ok(None);
        }
        let options = AutoFillOptions {
            max_offers: settings.max_offers_per_slot,
            send_offers: true,
        };
        self.auto_fill(slot, options).map(Some)
    }

    fn ensure_notice(&self, slot: &OpenSlot) -> Result<(), WaitlistError> {
        let required_minutes = self.settings.load()?.minimum_notice_minutes;
        let lead_time = slot.starts_at(self.clinic_offset) - self.clock.now();
        let available_minutes = lead_time.num_minutes();
        if available_minutes < i64::from(required_minutes) {
            return Err(WaitlistError::InsufficientNotice {
                required_minutes,
                available_minutes,
            });
        }
        Ok(())
    }

    fn ranked_candidates(&self, slot: &OpenSlot) -> Result<Vec<RankedCandidate>, WaitlistError> {
        let policy = RankingPolicy::from_settings(&self.settings.load()?);
        let active = self.entries.with_status(WaitlistStatus::Active)?;
        let matcher = PreferenceMatcher::new(self.calendar.as_ref());
        Ok(rank(matcher.eligible(active, slot), policy))
    }
}
