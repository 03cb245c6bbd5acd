use serde::{Deserialize, Serialize};

use super::domain::VipTier;
use super::error::WaitlistError;
use super::repository::RepositoryError;

/// Order in which eligible entries receive offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfferSequence {
    Fifo,
    Priority,
    #[default]
    TierWeighted,
}

/// Bonus added to an entry's score for each VIP tier under tier-weighted ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierWeights {
    pub silver: u32,
    pub gold: u32,
    pub platinum: u32,
}

impl TierWeights {
    pub const MAX_WEIGHT: u32 = 100;

    pub const fn weight(&self, tier: VipTier) -> u32 {
        match tier {
            VipTier::None => 0,
            VipTier::Silver => self.silver,
            VipTier::Gold => self.gold,
            VipTier::Platinum => self.platinum,
        }
    }
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            silver: 10,
            gold: 30,
            platinum: 60,
        }
    }
}

/// Visit/revenue thresholds used to promote patients into a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    pub visits: u32,
    pub revenue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoTierRules {
    pub platinum: TierRule,
    pub gold: TierRule,
}

impl Default for AutoTierRules {
    fn default() -> Self {
        Self {
            platinum: TierRule {
                visits: 12,
                revenue: 5000.0,
            },
            gold: TierRule {
                visits: 6,
                revenue: 2000.0,
            },
        }
    }
}

/// Channel toggles and reminder cadence for patient-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationSettings {
    pub sms_enabled: bool,
    pub email_enabled: bool,
    pub multi_channel_delay_minutes: u32,
    pub send_periodic_reminders: bool,
    pub reminder_frequency_days: u32,
}

impl Default for CommunicationSettings {
    fn default() -> Self {
        Self {
            sms_enabled: true,
            email_enabled: true,
            multi_channel_delay_minutes: 5,
            send_periodic_reminders: true,
            reminder_frequency_days: 7,
        }
    }
}

/// Process-wide waitlist policy.
///
/// `auto_tier_rules`, `double_opt_in_required` and `audit_log_retention_days` are validated and
/// stored for downstream collaborators, as are the reminder cadence and multi-channel delay in
/// `communication`. The engine itself only reads the channel toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistSettings {
    pub automatic_offers_enabled: bool,
    pub offer_expiry_minutes: u32,
    pub max_offers_per_slot: u32,
    pub minimum_notice_minutes: u32,
    pub offer_sequence: OfferSequence,
    pub tier_weights: TierWeights,
    pub auto_tier_rules: AutoTierRules,
    pub communication: CommunicationSettings,
    pub auto_expire_days: u32,
    pub double_opt_in_required: bool,
    pub audit_log_retention_days: u32,
}

impl Default for WaitlistSettings {
    fn default() -> Self {
        Self {
            automatic_offers_enabled: true,
            offer_expiry_minutes: 120,
            max_offers_per_slot: 3,
            minimum_notice_minutes: 240,
            offer_sequence: OfferSequence::default(),
            tier_weights: TierWeights::default(),
            auto_tier_rules: AutoTierRules::default(),
            communication: CommunicationSettings::default(),
            auto_expire_days: 30,
            double_opt_in_required: true,
            audit_log_retention_days: 90,
        }
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), WaitlistError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(WaitlistError::Validation(format!(
            "{field} must be between {min} and {max} (got {value})"
        )))
    }
}

impl WaitlistSettings {
    pub const OFFER_EXPIRY_MINUTES: (u32, u32) = (5, 1440);
    pub const MAX_OFFERS_PER_SLOT: (u32, u32) = (1, 10);

    pub fn validate(&self) -> Result<(), WaitlistError> {
        let (min, max) = Self::OFFER_EXPIRY_MINUTES;
        check_range("offer_expiry_minutes", self.offer_expiry_minutes, min, max)?;
        let (min, max) = Self::MAX_OFFERS_PER_SLOT;
        check_range("max_offers_per_slot", self.max_offers_per_slot, min, max)?;
        check_range(
            "minimum_notice_minutes",
            self.minimum_notice_minutes,
            0,
            72 * 60,
        )?;
        check_range("auto_expire_days", self.auto_expire_days, 1, 365)?;
        check_range(
            "audit_log_retention_days",
            self.audit_log_retention_days,
            30,
            730,
        )?;

        let weights = self.tier_weights;
        for (tier, weight) in [
            ("silver", weights.silver),
            ("gold", weights.gold),
            ("platinum", weights.platinum),
        ] {
            check_range(
                &format!("tier_weights.{tier}"),
                weight,
                0,
                TierWeights::MAX_WEIGHT,
            )?;
        }

        let comms = self.communication;
        check_range(
            "communication.multi_channel_delay_minutes",
            comms.multi_channel_delay_minutes,
            0,
            60,
        )?;
        check_range(
            "communication.reminder_frequency_days",
            comms.reminder_frequency_days,
            1,
            30,
        )?;

        for (tier, rule) in [
            ("platinum", self.auto_tier_rules.platinum),
            ("gold", self.auto_tier_rules.gold),
        ] {
            if !rule.revenue.is_finite() || rule.revenue < 0.0 {
                return Err(WaitlistError::Validation(format!(
                    "auto_tier_rules.{tier}.revenue must be a non-negative amount"
                )));
            }
        }

        Ok(())
    }

    /// Apply a partial update, returning the validated result without touching `self`.
    pub fn patched(&self, patch: &SettingsPatch) -> Result<Self, WaitlistError> {
        let mut next = self.clone();
        if let Some(value) = patch.automatic_offers_enabled {
            next.automatic_offers_enabled = value;
        }
        if let Some(value) = patch.offer_expiry_minutes {
            next.offer_expiry_minutes = value;
        }
        if let Some(value) = patch.max_offers_per_slot {
            next.max_offers_per_slot = value;
        }
        if let Some(value) = patch.minimum_notice_minutes {
            next.minimum_notice_minutes = value;
        }
        if let Some(value) = patch.offer_sequence {
            next.offer_sequence = value;
        }
        if let Some(value) = patch.tier_weights {
            next.tier_weights = value;
        }
        if let Some(value) = patch.auto_tier_rules {
            next.auto_tier_rules = value;
        }
        if let Some(value) = patch.communication {
            next.communication = value;
        }
        if let Some(value) = patch.auto_expire_days {
            next.auto_expire_days = value;
        }
        if let Some(value) = patch.double_opt_in_required {
            next.double_opt_in_required = value;
        }
        if let Some(value) = patch.audit_log_retention_days {
            next.audit_log_retention_days = value;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub automatic_offers_enabled: Option<bool>,
    #[serde(default)]
    pub offer_expiry_minutes: Option<u32>,
    #[serde(default)]
    pub max_offers_per_slot: Option<u32>,
    #[serde(default)]
    pub minimum_notice_minutes: Option<u32>,
    #[serde(default)]
    pub offer_sequence: Option<OfferSequence>,
    #[serde(default)]
    pub tier_weights: Option<TierWeights>,
    #[serde(default)]
    pub auto_tier_rules: Option<AutoTierRules>,
    #[serde(default)]
    pub communication: Option<CommunicationSettings>,
    #[serde(default)]
    pub auto_expire_days: Option<u32>,
    #[serde(default)]
    pub double_opt_in_required: Option<bool>,
    #[serde(default)]
    pub audit_log_retention_days: Option<u32>,
}

impl SettingsPatch {
    /// Names of the fields this patch touches, for audit metadata.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut mark = |present: bool, name: &'static str| {
            if present {
                fields.push(name);
            }
        };
        mark(
            self.automatic_offers_enabled.is_some(),
            "automatic_offers_enabled",
        );
        mark(self.offer_expiry_minutes.is_some(), "offer_expiry_minutes");
        mark(self.max_offers_per_slot.is_some(), "max_offers_per_slot");
        mark(
            self.minimum_notice_minutes.is_some(),
            "minimum_notice_minutes",
        );
        mark(self.offer_sequence.is_some(), "offer_sequence");
        mark(self.tier_weights.is_some(), "tier_weights");
        mark(self.auto_tier_rules.is_some(), "auto_tier_rules");
        mark(self.communication.is_some(), "communication");
        mark(self.auto_expire_days.is_some(), "auto_expire_days");
        mark(
            self.double_opt_in_required.is_some(),
            "double_opt_in_required",
        );
        mark(
            self.audit_log_retention_days.is_some(),
            "audit_log_retention_days",
        );
        fields
    }
}

/// Holder of the single settings record, versioned like entries.
pub trait SettingsStore: Send + Sync {
    /// Current settings and the revision they were stored under.
    fn snapshot(&self) -> Result<(WaitlistSettings, u64), RepositoryError>;
    /// Replace the settings if the stored revision still equals `revision`.
    ///
    /// Returns the new revision, or [`RepositoryError::Stale`] when another writer got there first.
    fn compare_and_store(
        &self,
        settings: WaitlistSettings,
        revision: u64,
    ) -> Result<u64, RepositoryError>;

    fn load(&self) -> Result<WaitlistSettings, RepositoryError> {
        self.snapshot().map(|(settings, _)| settings)
    }
}
