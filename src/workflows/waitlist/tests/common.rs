use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::waitlist::collaborators::{
    AppointmentCalendar, AuditError, AuditEvent, AuditSink, Clock, NotificationError,
    OfferNotice, OfferNotifier,
};
use crate::workflows::waitlist::domain::{
    DayOfWeek, EntryId, OpenSlot, SlotRequest, TimeOfDay, TimeRange, WaitlistEntry,
    WaitlistStatus,
};
use crate::workflows::waitlist::intake::EntryDraft;
use crate::workflows::waitlist::memory::{
    InMemoryEntryRepository, InMemoryOfferTokenStore, InMemorySettingsStore,
};
use crate::workflows::waitlist::repository::{EntryRepository, RepositoryError};
use crate::workflows::waitlist::settings::{SettingsStore, WaitlistSettings};
use crate::workflows::waitlist::WaitlistService;

pub(super) type TestService = WaitlistService<InMemoryEntryRepository, RecordingNotifier>;

/// Wednesday morning; every fixture slot sits days later unless a test says otherwise.
pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap()
}

#[derive(Clone)]
pub(super) struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub(super) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub(super) fn advance_minutes(&self, minutes: i64) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += Duration::minutes(minutes);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingNotifier {
    notices: Arc<Mutex<Vec<OfferNotice>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub(super) fn notices(&self) -> Vec<OfferNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn fail_deliveries(&self) {
        *self.failing.lock().expect("notifier mutex poisoned") = true;
    }
}

impl OfferNotifier for RecordingNotifier {
    fn deliver(&self, notice: OfferNotice) -> Result<(), NotificationError> {
        if *self.failing.lock().expect("notifier mutex poisoned") {
            return Err(NotificationError::Transport("sms gateway down".to_string()));
        }
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingAudit {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAudit {
    pub(super) fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().expect("audit mutex poisoned").push(event);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct StubCalendar {
    booked: Arc<Mutex<HashSet<(String, NaiveDate)>>>,
}

impl StubCalendar {
    pub(super) fn book(&self, patient_id: &str, date: NaiveDate) {
        self.booked
            .lock()
            .expect("calendar mutex poisoned")
            .insert((patient_id.to_string(), date));
    }
}

impl AppointmentCalendar for StubCalendar {
    fn has_appointment_on(&self, patient_id: &str, date: NaiveDate) -> bool {
        self.booked
            .lock()
            .expect("calendar mutex poisoned")
            .contains(&(patient_id.to_string(), date))
    }
}

pub(super) struct UnavailableRepository;

impl EntryRepository for UnavailableRepository {
    fn insert(&self, _entry: WaitlistEntry) -> Result<WaitlistEntry, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &EntryId) -> Result<Option<WaitlistEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn compare_and_swap(&self, _entry: WaitlistEntry) -> Result<WaitlistEntry, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn with_status(&self, _status: WaitlistStatus) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// In-memory store whose writes can be made to lose every compare-and-swap.
#[derive(Default)]
pub(super) struct ContendedRepository {
    inner: InMemoryEntryRepository,
    contended: AtomicBool,
}

impl ContendedRepository {
    pub(super) fn contend(&self, on: bool) {
        self.contended.store(on, Ordering::SeqCst);
    }
}

impl EntryRepository for ContendedRepository {
    fn insert(&self, entry: WaitlistEntry) -> Result<WaitlistEntry, RepositoryError> {
        self.inner.insert(entry)
    }

    fn fetch(&self, id: &EntryId) -> Result<Option<WaitlistEntry>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn compare_and_swap(&self, entry: WaitlistEntry) -> Result<WaitlistEntry, RepositoryError> {
        if self.contended.load(Ordering::SeqCst) {
            return Err(RepositoryError::Stale);
        }
        self.inner.compare_and_swap(entry)
    }

    fn list(&self) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        self.inner.list()
    }

    fn with_status(&self, status: WaitlistStatus) -> Result<Vec<WaitlistEntry>, RepositoryError> {
        self.inner.with_status(status)
    }
}

/// Settings store where another writer sneaks `rival` in ahead of the first write.
pub(super) struct RacingSettingsStore {
    inner: InMemorySettingsStore,
    rival: Mutex<Option<WaitlistSettings>>,
}

impl RacingSettingsStore {
    pub(super) fn new(rival: WaitlistSettings) -> Self {
        Self {
            inner: InMemorySettingsStore::default(),
            rival: Mutex::new(Some(rival)),
        }
    }
}

impl SettingsStore for RacingSettingsStore {
    fn snapshot(&self) -> Result<(WaitlistSettings, u64), RepositoryError> {
        self.inner.snapshot()
    }

    fn compare_and_store(
        &self,
        settings: WaitlistSettings,
        revision: u64,
    ) -> Result<u64, RepositoryError> {
        if let Some(rival) = self.rival.lock().expect("rival mutex poisoned").take() {
            self.inner.compare_and_store(rival, revision)?;
        }
        self.inner.compare_and_store(settings, revision)
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) entries: Arc<InMemoryEntryRepository>,
    pub(super) tokens: Arc<InMemoryOfferTokenStore>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) audit: Arc<RecordingAudit>,
    pub(super) calendar: Arc<StubCalendar>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn build_service() -> Harness {
    build_service_with(WaitlistSettings::default())
}

pub(super) fn build_service_with(settings: WaitlistSettings) -> Harness {
    let entries = Arc::new(InMemoryEntryRepository::default());
    let tokens = Arc::new(InMemoryOfferTokenStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let audit = Arc::new(RecordingAudit::default());
    let calendar = Arc::new(StubCalendar::default());
    let clock = Arc::new(FixedClock::at(start_time()));

    let service = WaitlistService::new(
        entries.clone(),
        notifier.clone(),
        calendar.clone(),
        settings,
    )
    .with_token_store(tokens.clone())
    .with_audit_sink(audit.clone())
    .with_clock(clock.clone());

    Harness {
        service: Arc::new(service),
        entries,
        tokens,
        notifier,
        audit,
        calendar,
        clock,
    }
}

pub(super) struct ContendedHarness {
    pub(super) service: WaitlistService<ContendedRepository, RecordingNotifier>,
    pub(super) entries: Arc<ContendedRepository>,
    pub(super) tokens: Arc<InMemoryOfferTokenStore>,
}

pub(super) fn build_contended_service() -> ContendedHarness {
    let entries = Arc::new(ContendedRepository::default());
    let tokens = Arc::new(InMemoryOfferTokenStore::default());
    let service = WaitlistService::new(
        entries.clone(),
        Arc::new(RecordingNotifier::default()),
        Arc::new(StubCalendar::default()),
        WaitlistSettings::default(),
    )
    .with_token_store(tokens.clone())
    .with_clock(Arc::new(FixedClock::at(start_time())));

    ContendedHarness {
        service,
        entries,
        tokens,
    }
}

pub(super) fn draft(patient_id: &str, service_ids: &[&str]) -> EntryDraft {
    let mut draft = EntryDraft::new(
        patient_id,
        format!("Patient {patient_id}"),
        "5551230000",
        service_ids.iter().map(|id| id.to_string()).collect(),
    );
    draft.patient_email = Some(format!("{patient_id}@example.com"));
    draft
}

/// Monday-mornings-only preferences with Dr. Lin as the sole provider.
pub(super) fn monday_morning_draft(patient_id: &str) -> EntryDraft {
    let mut draft = draft(patient_id, &["svc-botox"]);
    draft.provider_ids = vec!["prov-lin".to_string()];
    draft.flexible_providers = false;
    draft.preferred_days = vec![DayOfWeek::Monday];
    draft.preferred_time_ranges = vec![TimeRange {
        start: TimeOfDay::parse("09:00").expect("valid time"),
        end: TimeOfDay::parse("12:00").expect("valid time"),
    }];
    draft
}

pub(super) fn slot_request(date: &str, time: &str) -> SlotRequest {
    SlotRequest {
        date: date.to_string(),
        time: time.to_string(),
        provider_id: "prov-lin".to_string(),
        provider_name: Some("Dr. Lin".to_string()),
        service_id: Some("svc-botox".to_string()),
        duration: 30,
    }
}

pub(super) fn slot(date: &str, time: &str) -> OpenSlot {
    slot_request(date, time).validate().expect("valid slot")
}

/// Monday 10:00, well clear of the default notice window.
pub(super) fn monday_slot() -> OpenSlot {
    slot("2025-10-06", "10:00")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
