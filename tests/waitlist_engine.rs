//! End-to-end scenarios for the waitlist engine, driven through the public service facade and
//! HTTP router only.

mod common {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use medspa_waitlist::workflows::waitlist::{
        AppointmentCalendar, Clock, EntryDraft, InMemoryEntryRepository, NotificationError,
        OfferNotice, OfferNotifier, OpenSlot, SlotRequest, WaitlistService, WaitlistSettings,
    };

    pub(super) type Service = WaitlistService<InMemoryEntryRepository, Outbox>;

    #[derive(Default)]
    pub(super) struct Outbox {
        notices: Mutex<Vec<OfferNotice>>,
    }

    impl Outbox {
        pub(super) fn len(&self) -> usize {
            self.notices.lock().expect("outbox mutex poisoned").len()
        }
    }

    impl OfferNotifier for Outbox {
        fn deliver(&self, notice: OfferNotice) -> Result<(), NotificationError> {
            self.notices
                .lock()
                .expect("outbox mutex poisoned")
                .push(notice);
            Ok(())
        }
    }

    #[derive(Default)]
    pub(super) struct Calendar {
        booked: Mutex<HashSet<(String, NaiveDate)>>,
    }

    impl AppointmentCalendar for Calendar {
        fn has_appointment_on(&self, patient_id: &str, date: NaiveDate) -> bool {
            self.booked
                .lock()
                .expect("calendar mutex poisoned")
                .contains(&(patient_id.to_string(), date))
        }
    }

    pub(super) struct SteppingClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl SteppingClock {
        pub(super) fn advance(&self, minutes: i64) {
            *self.now.lock().expect("clock mutex poisoned") += Duration::minutes(minutes);
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().expect("clock mutex poisoned")
        }
    }

    pub(super) struct World {
        pub(super) service: Arc<Service>,
        pub(super) outbox: Arc<Outbox>,
        pub(super) clock: Arc<SteppingClock>,
    }

    pub(super) fn world(settings: WaitlistSettings) -> World {
        let outbox = Arc::new(Outbox::default());
        let clock = Arc::new(SteppingClock {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap()),
        });
        let service = WaitlistService::new(
            Arc::new(InMemoryEntryRepository::default()),
            outbox.clone(),
            Arc::new(Calendar::default()),
            settings,
        )
        .with_clock(clock.clone());
        World {
            service: Arc::new(service),
            outbox,
            clock,
        }
    }

    pub(super) fn signup(patient_id: &str) -> EntryDraft {
        EntryDraft::new(
            patient_id,
            format!("Patient {patient_id}"),
            "5550000000",
            vec!["svc-hydrafacial".to_string()],
        )
    }

    pub(super) fn thursday_slot() -> OpenSlot {
        SlotRequest {
            date: "2025-10-02".to_string(),
            time: "14:00".to_string(),
            provider_id: "prov-ortiz".to_string(),
            provider_name: Some("Dr. Ortiz".to_string()),
            service_id: Some("svc-hydrafacial".to_string()),
            duration: 60,
        }
        .validate()
        .expect("valid slot")
    }
}

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use medspa_waitlist::workflows::waitlist::{
    waitlist_router, AutoFillOptions, OfferSequence, OfferStatus, SettingsPatch, VipTier,
    WaitlistError, WaitlistPriority, WaitlistSettings, WaitlistStatus,
};
use serde_json::{json, Value};
use tower::ServiceExt;

#[test]
fn freed_slot_is_offered_and_booked() {
    let world = world(WaitlistSettings::default());
    let mut vip = signup("pat-vip");
    vip.tier = VipTier::Platinum;
    let vip = world.service.create(vip).expect("signup");
    let regular = world.service.create(signup("pat-regular")).expect("signup");

    let outcome = world
        .service
        .auto_fill(
            &thursday_slot(),
            AutoFillOptions {
                max_offers: 1,
                send_offers: true,
            },
        )
        .expect("auto-fill runs");
    assert_eq!(outcome.offers_sent, 1);
    assert_eq!(outcome.offers[0].entry_id, vip.id);
    assert_eq!(world.outbox.len(), 1);

    world.clock.advance(15);
    let token = outcome.offers[0].offer.token.clone();
    let booked = world
        .service
        .accept_offer(&vip.id, &token)
        .expect("offer accepted");
    assert_eq!(booked.status, WaitlistStatus::Booked);
    assert!(matches!(
        world.service.accept_offer(&vip.id, &token),
        Err(WaitlistError::InvalidToken)
    ));

    assert_eq!(
        world.service.get(&regular.id).expect("fetched").status,
        WaitlistStatus::Active
    );
}

#[test]
fn lapsed_offer_returns_entry_to_pool() {
    let world = world(WaitlistSettings::default());
    let entry = world.service.create(signup("pat-1")).expect("signup");
    let outcome = world
        .service
        .auto_fill(&thursday_slot(), AutoFillOptions::default())
        .expect("auto-fill runs");
    assert_eq!(outcome.offers_sent, 1);

    world.clock.advance(121);
    let report = world.service.run_sweeps().expect("sweeps run");
    assert_eq!(report.offers_expired, 1);

    let entry = world.service.get(&entry.id).expect("fetched");
    assert_eq!(entry.status, WaitlistStatus::Active);
    assert_eq!(
        entry.offer_history.last().map(|offer| offer.status),
        Some(OfferStatus::Expired)
    );
}

#[test]
fn priority_sequence_prefers_urgency_then_signup_order() {
    let world = world(WaitlistSettings::default());
    world
        .service
        .update_settings(SettingsPatch {
            offer_sequence: Some(OfferSequence::Priority),
            ..SettingsPatch::default()
        })
        .expect("settings updated");

    let early = world.service.create(signup("pat-early")).expect("signup");
    world.clock.advance(5);
    let mut vip = signup("pat-vip");
    vip.tier = VipTier::Platinum;
    let vip = world.service.create(vip).expect("signup");
    world.clock.advance(5);
    let mut urgent = signup("pat-urgent");
    urgent.priority = WaitlistPriority::Urgent;
    let urgent = world.service.create(urgent).expect("signup");

    let ranked = world
        .service
        .match_slot(&thursday_slot(), 10)
        .expect("match runs");
    let order: Vec<_> = ranked.iter().map(|c| c.entry.id.clone()).collect();
    assert_eq!(order, vec![urgent.id, early.id, vip.id]);
}

#[tokio::test]
async fn router_round_trip_from_signup_to_decline() {
    let world = world(WaitlistSettings::default());
    let router = waitlist_router(world.service.clone());

    let created = router
        .clone()
        .oneshot(
            Request::post("/api/v1/waitlist")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "patient_id": "pat-http",
                        "patient_name": "Sam Rivera",
                        "patient_phone": "5559876543",
                        "service_ids": ["svc-hydrafacial"]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Value = read_json(created).await;
    let id = created["id"].as_str().expect("id").to_string();

    let offered = router
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/waitlist/{id}/offer"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "appointment_slot": {
                            "date": "2025-10-02",
                            "time": "14:00",
                            "provider_id": "prov-ortiz"
                        },
                        "notify_patient": false
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(offered.status(), StatusCode::CREATED);
    let offered = read_json(offered).await;
    let token = offered["offer"]["token"].as_str().expect("token").to_string();

    let declined = router
        .oneshot(
            Request::post(format!("/api/v1/waitlist/{id}/offer/decline"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "token": token }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(declined.status(), StatusCode::OK);
    let declined = read_json(declined).await;
    assert_eq!(declined["status"], "active");
    assert_eq!(declined["offer_history"][0]["status"], "declined");
    assert_eq!(world.outbox.len(), 0);
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
