use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::domain::{VipTier, WaitlistEntry, WaitlistPriority, WaitlistStatus};
use super::error::WaitlistError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Priority,
    Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Listing filters, sort, and pagination as accepted by the list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryQuery {
    #[serde(default)]
    pub status: Option<WaitlistStatus>,
    /// Comma-separated statuses; takes precedence over `status`.
    #[serde(default)]
    pub statuses: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub priority: Option<WaitlistPriority>,
    #[serde(default)]
    pub tier: Option<VipTier>,
    #[serde(default)]
    pub has_offer: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryPage {
    pub items: Vec<WaitlistEntry>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

struct Filter {
    statuses: Option<Vec<WaitlistStatus>>,
    search: Option<String>,
}

impl EntryQuery {
    fn filter(&self) -> Result<Filter, WaitlistError> {
        let statuses = match (&self.statuses, self.status) {
            (Some(csv), _) => Some(
                csv.split(',')
                    .filter(|part| !part.trim().is_empty())
                    .map(WaitlistStatus::parse)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            (None, Some(status)) => Some(vec![status]),
            (None, None) => None,
        };
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);
        Ok(Filter { statuses, search })
    }

    fn page_bounds(&self) -> Result<(u32, u32), WaitlistError> {
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(WaitlistError::Validation("page must be at least 1".to_string()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(WaitlistError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok((page, limit))
    }

    fn matches(&self, filter: &Filter, entry: &WaitlistEntry) -> bool {
        if let Some(statuses) = &filter.statuses {
            if !statuses.contains(&entry.status) {
                return false;
            }
        }
        if let Some(patient_id) = &self.patient_id {
            if &entry.patient_id != patient_id {
                return false;
            }
        }
        if let Some(service_id) = &self.service_id {
            if !entry.service_ids.contains(service_id) {
                return false;
            }
        }
        // an entry without provider preferences accepts any provider
        if let Some(provider_id) = &self.provider_id {
            if !entry.provider_ids.is_empty() && !entry.provider_ids.contains(provider_id) {
                return false;
            }
        }
        if self.priority.is_some_and(|priority| priority != entry.priority) {
            return false;
        }
        if self.tier.is_some_and(|tier| tier != entry.tier) {
            return false;
        }
        if self
            .has_offer
            .is_some_and(|wanted| wanted != entry.current_offer.is_some())
        {
            return false;
        }
        if let Some(term) = &filter.search {
            let in_name = entry.patient_name.to_lowercase().contains(term);
            let in_phone = entry.patient_phone.contains(term.as_str());
            let in_email = entry
                .patient_email
                .as_deref()
                .is_some_and(|email| email.to_lowercase().contains(term));
            if !(in_name || in_phone || in_email) {
                return false;
            }
        }
        true
    }

    fn compare(&self, left: &WaitlistEntry, right: &WaitlistEntry) -> Ordering {
        match self.sort_by {
            SortField::CreatedAt => self.sort_order.apply(left.created_at.cmp(&right.created_at)),
            SortField::Priority => self
                .sort_order
                .apply(left.priority.cmp(&right.priority))
                .then_with(|| left.created_at.cmp(&right.created_at)),
            SortField::Tier => self
                .sort_order
                .apply(left.tier.cmp(&right.tier))
                .then_with(|| right.created_at.cmp(&left.created_at)),
        }
    }

    /// Filter, sort, then paginate. Filters run before pagination so `total` counts every match.
    pub fn run(&self, entries: Vec<WaitlistEntry>) -> Result<EntryPage, WaitlistError> {
        let filter = self.filter()?;
        let (page, limit) = self.page_bounds()?;

        let mut matching: Vec<WaitlistEntry> = entries
            .into_iter()
            .filter(|entry| self.matches(&filter, entry))
            .collect();
        matching.sort_by(|left, right| self.compare(left, right));

        let total = matching.len();
        let offset = (page as usize - 1).saturating_mul(limit as usize);
        let items: Vec<WaitlistEntry> = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();
        let has_more = offset + items.len() < total;

        Ok(EntryPage {
            items,
            total,
            page,
            limit,
            has_more,
        })
    }
}
