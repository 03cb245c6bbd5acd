use super::common::*;

use chrono::Duration;

use crate::workflows::waitlist::collaborators::{NoticeChannel, NoticeKind};
use crate::workflows::waitlist::domain::{OfferStatus, WaitlistStatus};
use crate::workflows::waitlist::error::WaitlistError;
use crate::workflows::waitlist::offers::{OfferOptions, OfferTokenStore, TOKEN_BYTES};
use crate::workflows::waitlist::repository::EntryRepository;

fn quiet(expiry_minutes: Option<u32>) -> OfferOptions {
    OfferOptions {
        expiry_minutes,
        notify_patient: false,
    }
}

#[test]
fn send_offer_attaches_pending_offer_and_notifies() {
    let harness = build_service();
    let entry = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");

    let offer = harness
        .service
        .send_offer(&entry.id, &monday_slot(), OfferOptions::default())
        .expect("offer sent");

    assert_eq!(offer.status, OfferStatus::Pending);
    assert_eq!(offer.offered_at, start_time());
    assert_eq!(offer.expires_at - offer.offered_at, Duration::minutes(120));
    assert_eq!(offer.token.len(), TOKEN_BYTES * 2);

    let stored = harness.service.get(&entry.id).expect("fetched");
    assert_eq!(stored.status, WaitlistStatus::Offered);
    assert_eq!(stored.current_offer.as_ref(), Some(&offer));
    assert!(stored.offer_state_consistent());

    let claim = harness
        .tokens
        .resolve(&offer.token)
        .expect("lookup")
        .expect("token registered");
    assert_eq!(claim.entry_id, entry.id);
    assert_eq!(claim.offer_id, offer.id);

    let notices = harness.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::OfferIssued);
    assert_eq!(notices[0].token.as_deref(), Some(offer.token.as_str()));
    assert_eq!(
        notices[0].channels,
        vec![NoticeChannel::Sms, NoticeChannel::Email]
    );
}

#[test]
fn custom_expiry_sets_deadline() {
    let harness = build_service();
    let entry = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");

    let offer = harness
        .service
        .send_offer(&entry.id, &monday_slot(), quiet(Some(30)))
        .expect("offer sent");
    assert_eq!(offer.expires_at - offer.offered_at, Duration::minutes(30));
    assert!(harness.notifier.notices().is_empty());

    for out_of_range in [4, 1441] {
        let other = harness
            .service
            .create(draft(&format!("pat-{out_of_range}"), &["svc-botox"]))
            .expect("entry created");
        let result = harness
            .service
            .send_offer(&other.id, &monday_slot(), quiet(Some(out_of_range)));
        assert!(matches!(result, Err(WaitlistError::Validation(_))));
    }
}

#[test]
fn second_offer_without_response_is_rejected() {
    let harness = build_service();
    let entry = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");
    harness
        .service
        .send_offer(&entry.id, &monday_slot(), quiet(None))
        .expect("first offer");

    match harness
        .service
        .send_offer(&entry.id, &slot("2025-10-07", "11:00"), quiet(None))
    {
        Err(err @ WaitlistError::InvalidState { .. }) => {
            assert_eq!(err.to_string(), "cannot send offer to offered waitlist entry")
        }
        other => panic!("expected invalid state, got {other:?}"),
    }
    assert_eq!(harness.tokens.len(), 1);
}

#[test]
fn existing_appointment_blocks_offer_without_side_effects() {
    let harness = build_service();
    let entry = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");
    let slot = monday_slot();
    harness.calendar.book("pat-1", slot.date);

    let result = harness.service.send_offer(&entry.id, &slot, quiet(None));
    assert!(matches!(result, Err(WaitlistError::Conflict(_))));

    let stored = harness.service.get(&entry.id).expect("fetched");
    assert_eq!(stored.status, WaitlistStatus::Active);
    assert_eq!(stored.revision, entry.revision);
    assert!(harness.tokens.is_empty());
}

#[test]
fn notification_failure_keeps_offer() {
    let harness = build_service();
    harness.notifier.fail_deliveries();
    let entry = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");

    let offer = harness
        .service
        .send_offer(&entry.id, &monday_slot(), OfferOptions::default())
        .expect("offer survives delivery failure");
    let stored = harness.service.get(&entry.id).expect("fetched");
    assert_eq!(stored.current_offer.map(|o| o.id), Some(offer.id));
}

#[test]
fn accept_books_entry_and_consumes_token() {
    let harness = build_service();
    let entry = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");
    let offer = harness
        .service
        .send_offer(&entry.id, &monday_slot(), OfferOptions::default())
        .expect("offer sent");

    harness.clock.advance_minutes(10);
    let booked = harness
        .service
        .accept_offer(&entry.id, &offer.token)
        .expect("offer accepted");

    assert_eq!(booked.status, WaitlistStatus::Booked);
    assert!(booked.current_offer.is_none());
    let archived = booked.offer_history.last().expect("history appended");
    assert_eq!(archived.status, OfferStatus::Accepted);
    assert_eq!(archived.responded_at, Some(start_time() + Duration::minutes(10)));
    assert!(harness.tokens.is_empty());

    let kinds: Vec<NoticeKind> = harness.notifier.notices().iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NoticeKind::OfferIssued, NoticeKind::OfferAccepted]);

    let replay = harness.service.accept_offer(&entry.id, &offer.token);
    assert!(matches!(replay, Err(WaitlistError::InvalidToken)));
    assert_eq!(
        replay.unwrap_err().to_string(),
        "invalid or expired offer token"
    );
}

#[test]
fn foreign_token_is_rejected_and_left_untouched() {
    let harness = build_service();
    let first = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");
    let second = harness
        .service
        .create(draft("pat-2", &["svc-botox"]))
        .expect("entry created");
    let first_offer = harness
        .service
        .send_offer(&first.id, &monday_slot(), quiet(None))
        .expect("offer sent");
    harness
        .service
        .send_offer(&second.id, &monday_slot(), quiet(None))
        .expect("offer sent");

    let before_first = harness.entries.fetch(&first.id).expect("fetch");
    let before_second = harness.entries.fetch(&second.id).expect("fetch");

    let result = harness.service.accept_offer(&second.id, &first_offer.token);
    assert!(matches!(result, Err(WaitlistError::InvalidToken)));
    assert_eq!(harness.entries.fetch(&first.id).expect("fetch"), before_first);
    assert_eq!(harness.entries.fetch(&second.id).expect("fetch"), before_second);

    harness
        .service
        .accept_offer(&first.id, &first_offer.token)
        .expect("rightful owner can still accept");
}

#[test]
fn contended_accept_keeps_token_for_retry() {
    let harness = build_contended_service();
    let entry = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");
    let offer = harness
        .service
        .send_offer(&entry.id, &monday_slot(), quiet(None))
        .expect("offer sent");

    harness.entries.contend(true);
    let result = harness.service.accept_offer(&entry.id, &offer.token);
    assert!(matches!(result, Err(WaitlistError::Conflict(_))));

    let stored = harness.service.get(&entry.id).expect("fetched");
    assert_eq!(stored.status, WaitlistStatus::Offered);
    assert_eq!(stored.pending_offer().map(|o| o.id.clone()), Some(offer.id.clone()));
    assert!(harness
        .tokens
        .resolve(&offer.token)
        .expect("resolve")
        .is_some());

    harness.entries.contend(false);
    let booked = harness
        .service
        .accept_offer(&entry.id, &offer.token)
        .expect("retry accepted");
    assert_eq!(booked.status, WaitlistStatus::Booked);
    assert!(harness.tokens.is_empty());
}

#[test]
fn unknown_entry_reported_before_token_check() {
    let harness = build_service();
    let result = harness.service.decline_offer(
        &crate::workflows::waitlist::domain::EntryId("wl-missing".to_string()),
        "deadbeef",
    );
    assert!(matches!(result, Err(WaitlistError::NotFound(_))));
}

#[test]
fn decline_returns_entry_to_pool() {
    let harness = build_service();
    let entry = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");
    let offer = harness
        .service
        .send_offer(&entry.id, &monday_slot(), quiet(None))
        .expect("offer sent");

    let active = harness
        .service
        .decline_offer(&entry.id, &offer.token)
        .expect("offer declined");
    assert_eq!(active.status, WaitlistStatus::Active);
    assert!(active.current_offer.is_none());
    let archived = active.offer_history.last().expect("history appended");
    assert_eq!(archived.status, OfferStatus::Declined);
    assert!(archived.responded_at.is_some());

    let retry = harness
        .service
        .decline_offer(&entry.id, &offer.token);
    assert!(matches!(retry, Err(WaitlistError::InvalidToken)));

    harness
        .service
        .send_offer(&entry.id, &slot("2025-10-13", "10:00"), quiet(None))
        .expect("a new offer can follow a decline");
}

#[test]
fn late_accept_expires_offer() {
    let harness = build_service();
    let entry = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");
    let offer = harness
        .service
        .send_offer(&entry.id, &monday_slot(), quiet(Some(30)))
        .expect("offer sent");

    harness.clock.advance_minutes(30);
    let result = harness.service.accept_offer(&entry.id, &offer.token);
    assert!(matches!(result, Err(WaitlistError::Expired)));

    let stored = harness.service.get(&entry.id).expect("fetched");
    assert_eq!(stored.status, WaitlistStatus::Active);
    assert!(stored.current_offer.is_none());
    assert_eq!(
        stored.offer_history.last().map(|o| o.status),
        Some(OfferStatus::Expired)
    );
    assert!(harness.tokens.is_empty());
}

#[test]
fn sweep_expires_only_lapsed_offers() {
    let harness = build_service();
    let short = harness
        .service
        .create(draft("pat-1", &["svc-botox"]))
        .expect("entry created");
    let long = harness
        .service
        .create(draft("pat-2", &["svc-botox"]))
        .expect("entry created");
    harness
        .service
        .send_offer(&short.id, &monday_slot(), quiet(Some(15)))
        .expect("offer sent");
    let long_offer = harness
        .service
        .send_offer(&long.id, &monday_slot(), quiet(Some(90)))
        .expect("offer sent");

    harness.clock.advance_minutes(20);
    assert_eq!(harness.service.expire_offers().expect("sweep runs"), 1);
    assert_eq!(harness.service.expire_offers().expect("sweep runs"), 0);

    let short = harness.service.get(&short.id).expect("fetched");
    assert_eq!(short.status, WaitlistStatus::Active);
    assert!(short.offer_state_consistent());

    let long = harness.service.get(&long.id).expect("fetched");
    assert_eq!(long.status, WaitlistStatus::Offered);
    assert_eq!(harness.tokens.len(), 1);
    assert!(harness
        .tokens
        .resolve(&long_offer.token)
        .expect("lookup")
        .is_some());
}
