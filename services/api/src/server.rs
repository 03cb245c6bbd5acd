use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryAppointmentCalendar, LoggingNotifier};
use crate::routes::with_waitlist_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use medspa_waitlist::config::AppConfig;
use medspa_waitlist::error::AppError;
use medspa_waitlist::telemetry;
use medspa_waitlist::workflows::waitlist::{
    EntryRepository, InMemoryEntryRepository, OfferNotifier, WaitlistService, WaitlistSettings,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let waitlist_service = Arc::new(
        WaitlistService::new(
            Arc::new(InMemoryEntryRepository::default()),
            Arc::new(LoggingNotifier::default()),
            Arc::new(InMemoryAppointmentCalendar::default()),
            WaitlistSettings::default(),
        )
        .with_clinic_offset(config.waitlist.clinic_offset()?),
    );

    spawn_sweeper(waitlist_service.clone(), config.waitlist.sweep_interval());

    let app = with_waitlist_routes(waitlist_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "waitlist engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically expire lapsed offers and stale entries.
fn spawn_sweeper<R, N>(service: Arc<WaitlistService<R, N>>, every: Duration)
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.run_sweeps() {
                Ok(report) if report.offers_expired + report.entries_expired > 0 => info!(
                    offers_expired = report.offers_expired,
                    entries_expired = report.entries_expired,
                    "waitlist sweep completed"
                ),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "waitlist sweep failed"),
            }
        }
    });
}
