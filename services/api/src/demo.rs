use crate::infra::{InMemoryAppointmentCalendar, LoggingNotifier};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use medspa_waitlist::error::AppError;
use medspa_waitlist::workflows::waitlist::{
    AutoFillOptions, DayOfWeek, EntryDraft, InMemoryEntryRepository, OpenSlot, RankedCandidate,
    SlotRequest, TimeOfDay, TimeRange, VipTier, WaitlistPriority, WaitlistService,
    WaitlistSettings,
};
use std::sync::Arc;

type DemoService = WaitlistService<InMemoryEntryRepository, LoggingNotifier>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date of the freed slot (YYYY-MM-DD). Defaults to two days from today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) slot_date: Option<NaiveDate>,
    /// Start time of the freed slot (HH:MM, 24-hour).
    #[arg(long, default_value = "10:00")]
    pub(crate) slot_time: String,
    /// Maximum number of offers to send for the slot.
    #[arg(long, default_value_t = 3)]
    pub(crate) max_offers: u32,
    /// Only preview the ranked matches; send nothing.
    #[arg(long)]
    pub(crate) preview: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        slot_date,
        slot_time,
        max_offers,
        preview,
    } = args;

    let slot_date = slot_date.unwrap_or_else(|| Local::now().date_naive() + Duration::days(2));
    let slot = SlotRequest {
        date: slot_date.format("%Y-%m-%d").to_string(),
        time: slot_time,
        provider_id: "prov-lin".to_string(),
        provider_name: Some("Dr. Lin".to_string()),
        service_id: Some("svc-botox".to_string()),
        duration: 30,
    }
    .validate()?;

    let calendar = Arc::new(InMemoryAppointmentCalendar::default());
    let notifier = Arc::new(LoggingNotifier::default());
    let service = WaitlistService::new(
        Arc::new(InMemoryEntryRepository::default()),
        notifier.clone(),
        calendar.clone(),
        WaitlistSettings::default(),
    );

    seed_waitlist(&service)?;
    // one patient already holds an appointment that day and must be passed over
    calendar.book("pat-1004", slot.date);

    println!("Waitlist auto-fill demo");
    print_slot(&slot);

    let matches = service.match_slot(&slot, 10)?;
    print_matches(&matches);

    let outcome = service.auto_fill(
        &slot,
        AutoFillOptions {
            max_offers,
            send_offers: !preview,
        },
    )?;
    if preview {
        println!("\nPreview only; no offers sent.");
        return Ok(());
    }

    println!("\nOffers sent: {}", outcome.offers_sent);
    for issued in &outcome.offers {
        println!(
            "- {} ({}) expires {}",
            issued.patient_name,
            issued.entry_id,
            issued.offer.expires_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    for skipped in &outcome.skipped {
        println!("- skipped {}: {} ({})", skipped.entry_id, skipped.reason, skipped.code);
    }

    let mut issued = outcome.offers.iter();
    if let Some(first) = issued.next() {
        let booked = service.accept_offer(&first.entry_id, &first.offer.token)?;
        println!(
            "\n{} accepted; entry is now {}.",
            booked.patient_name, booked.status
        );
    }
    for other in issued {
        let entry = service.decline_offer(&other.entry_id, &other.offer.token)?;
        println!(
            "{} declined; entry is back to {}.",
            entry.patient_name, entry.status
        );
    }

    println!("\nPatient notices queued: {}", notifier.sent().len());
    Ok(())
}

fn seed_waitlist(service: &DemoService) -> Result<(), AppError> {
    let weekdays = vec![
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
    ];
    let mornings = TimeRange {
        start: TimeOfDay::parse("08:00")?,
        end: TimeOfDay::parse("12:00")?,
    };

    let signups = [
        ("pat-1001", "Avery Chen", WaitlistPriority::Normal, VipTier::None),
        ("pat-1002", "Morgan Patel", WaitlistPriority::High, VipTier::Gold),
        ("pat-1003", "Riley Santos", WaitlistPriority::Urgent, VipTier::None),
        ("pat-1004", "Casey Brooks", WaitlistPriority::High, VipTier::Platinum),
        ("pat-1005", "Jamie Okafor", WaitlistPriority::Normal, VipTier::Silver),
    ];

    for (index, (patient_id, name, priority, tier)) in signups.into_iter().enumerate() {
        let mut draft = EntryDraft::new(
            patient_id,
            name,
            format!("555010{index:04}"),
            vec!["svc-botox".to_string()],
        );
        draft.patient_email = Some(format!("{patient_id}@example.com"));
        draft.priority = priority;
        draft.tier = tier;
        if index % 2 == 1 {
            draft.preferred_days = weekdays.clone();
            draft.preferred_time_ranges = vec![mornings];
        } else {
            draft.flexible_dates = true;
            draft.flexible_times = true;
        }
        service.create(draft)?;
    }
    Ok(())
}

fn print_slot(slot: &OpenSlot) {
    println!(
        "Open slot: {} {} ({}) with {}",
        slot.date,
        slot.time,
        slot.weekday().label(),
        slot.provider_name.as_deref().unwrap_or(&slot.provider_id)
    );
}

fn print_matches(matches: &[RankedCandidate]) {
    println!("\nRanked matches ({}):", matches.len());
    for (position, candidate) in matches.iter().enumerate() {
        println!(
            "  {}. {} | priority {} | tier {} | score {}",
            position + 1,
            candidate.entry.patient_name,
            candidate.entry.priority.label(),
            candidate.entry.tier.label(),
            candidate.score
        );
    }
}
