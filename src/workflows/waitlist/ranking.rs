use serde::Serialize;

use super::domain::{WaitlistEntry, WaitlistPriority};
use super::settings::{OfferSequence, TierWeights, WaitlistSettings};

/// Ordering policy applied to eligible entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingPolicy {
    Fifo,
    Priority,
    TierWeighted(TierWeights),
}

impl RankingPolicy {
    pub fn from_settings(settings: &WaitlistSettings) -> Self {
        match settings.offer_sequence {
            OfferSequence::Fifo => Self::Fifo,
            OfferSequence::Priority => Self::Priority,
            OfferSequence::TierWeighted => Self::TierWeighted(settings.tier_weights),
        }
    }

    pub fn score(&self, entry: &WaitlistEntry) -> u32 {
        match self {
            Self::Fifo => 0,
            Self::Priority => priority_weight(entry.priority),
            Self::TierWeighted(weights) => {
                priority_weight(entry.priority) + weights.weight(entry.tier)
            }
        }
    }
}

pub const fn priority_weight(priority: WaitlistPriority) -> u32 {
    match priority {
        WaitlistPriority::Urgent => 100,
        WaitlistPriority::High => 50,
        WaitlistPriority::Normal => 10,
    }
}

/// Entry paired with the score it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub entry: WaitlistEntry,
    pub score: u32,
}

/// Order entries best-first. Equal scores fall back to signup order.
pub fn rank(entries: Vec<WaitlistEntry>, policy: RankingPolicy) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = entries
        .into_iter()
        .map(|entry| RankedCandidate {
            score: policy.score(&entry),
            entry,
        })
        .collect();

    ranked.sort_by(|left, right| {
        right
            .score
            .cmp(&left.score)
            .then_with(|| left.entry.created_at.cmp(&right.entry.created_at))
    });
    ranked
}
