//! Process-local stores backing the engine when no external database is wired in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::domain::{EntryId, WaitlistEntry, WaitlistStatus};
use super::offers::{OfferClaim, OfferTokenStore};
use super::repository::{EntryRepository, RepositoryError};
use super::settings::{SettingsStore, WaitlistSettings};

#[derive(Default, Clone)]
pub struct InMemoryEntryRepository {
    entries: Arc<Mutex<HashMap<EntryId, WaitlistEntry>>>,
}

impl InMemoryEntryRepository {
    fn sorted(mut entries: Vec<WaitlistEntry>) -> Vec<WaitlistEntry> {
        entries.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        entries
    }
}

impl EntryRepository for InMemoryEntryRepository {
    fn insert(&self, mut entry: WaitlistEntry) -> Result<WaitlistEntry, RepositoryError> {
        let mut guard = self.entries.lock().expect("repository mutex poisoned");
        if guard.contains_key(&entry.id) {
            return Err(RepositoryError::Conflict);
        }
        if guard
            .values()
            .any(|existing| existing.blocks_signup(&entry.patient_id, &entry.service_ids))
        {
            return Err(RepositoryError::LiveEntryExists);
        }
        entry.revision = 1;
        guard.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    fn fetch(&self, id: &EntryId) -> Result<Option<WaitlistEntry>, RepositoryError> {
        let guard = self.entries.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn compare_and_swap(&self, mut entry: WaitlistEntry) -> Result<WaitlistEntry, RepositoryError> {
        let mut guard = self.entries.lock().expect("repository mutex poisoned");
        let stored = guard.get_mut(&entry.id).ok_or(RepositoryError::NotFound)?;
        if stored.revision != entry.revision {
            return Err(RepositoryError::Stale);
        }
        entry.revision += 1;
        *stored = entry.clone();
        Ok(entry)
    }

    fn list(&self) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        let guard = self.entries.lock().expect("repository mutex poisoned");
        Ok(Self::sorted(guard.values().cloned().collect()))
    }

    fn with_status(&self, status: WaitlistStatus) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        let guard = self.entries.lock().expect("repository mutex poisoned");
        Ok(Self::sorted(
            guard
                .values()
                .filter(|entry| entry.status == status)
                .cloned()
                .collect(),
        ))
    }
}

#[derive(Default, Clone)]
pub struct InMemoryOfferTokenStore {
    tokens: Arc<Mutex<HashMap<String, OfferClaim>>>,
}

impl InMemoryOfferTokenStore {
    pub fn len(&self) -> usize {
        self.tokens.lock().expect("token mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OfferTokenStore for InMemoryOfferTokenStore {
    fn register(&self, token: &str, claim: OfferClaim) -> Result<(), RepositoryError> {
        let mut guard = self.tokens.lock().expect("token mutex poisoned");
        if guard.contains_key(token) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(token.to_string(), claim);
        Ok(())
    }

    fn resolve(&self, token: &str) -> Result<Option<OfferClaim>, RepositoryError> {
        let guard = self.tokens.lock().expect("token mutex poisoned");
        Ok(guard.get(token).cloned())
    }

    fn take_for_entry(
        &self,
        token: &str,
        entry_id: &EntryId,
    ) -> Result<Option<OfferClaim>, RepositoryError> {
        let mut guard = self.tokens.lock().expect("token mutex poisoned");
        let owned = guard
            .get(token)
            .is_some_and(|claim| &claim.entry_id == entry_id);
        Ok(if owned { guard.remove(token) } else { None })
    }

    fn revoke(&self, token: &str) -> Result<(), RepositoryError> {
        let mut guard = self.tokens.lock().expect("token mutex poisoned");
        guard.remove(token);
        Ok(())
    }
}

#[derive(Clone)]
pub struct InMemorySettingsStore {
    settings: Arc<Mutex<(WaitlistSettings, u64)>>,
}

impl InMemorySettingsStore {
    pub fn new(settings: WaitlistSettings) -> Self {
        Self {
            settings: Arc::new(Mutex::new((settings, 1))),
        }
    }
}

impl Default for InMemorySettingsStore {
    fn default() -> Self {
        Self::new(WaitlistSettings::default())
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn snapshot(&self) -> Result<(WaitlistSettings, u64), RepositoryError> {
        Ok(self.settings.lock().expect("settings mutex poisoned").clone())
    }

    fn compare_and_store(
        &self,
        settings: WaitlistSettings,
        revision: u64,
    ) -> Result<u64, RepositoryError> {
        let mut guard = self.settings.lock().expect("settings mutex poisoned");
        if guard.1 != revision {
            return Err(RepositoryError::Stale);
        }
        *guard = (settings, revision + 1);
        Ok(guard.1)
    }
}
