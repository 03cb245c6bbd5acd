use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::autofill::{
    AutoFillOptions, AutoFillRequest, MatchRequest, DEFAULT_MATCH_LIMIT, DEFAULT_MAX_OFFERS,
};
use super::collaborators::OfferNotifier;
use super::domain::{EntryId, SlotRequest};
use super::error::WaitlistError;
use super::intake::{EntryDraft, EntryPatch};
use super::offers::{minutes_remaining, OfferOptions, OfferResponse, SendOfferRequest};
use super::query::EntryQuery;
use super::repository::EntryRepository;
use super::service::WaitlistService;
use super::settings::SettingsPatch;

type Service<R, N> = State<Arc<WaitlistService<R, N>>>;
type JsonBody<T> = Result<axum::Json<T>, JsonRejection>;

/// Router exposing the waitlist endpoints under `/api/v1/waitlist`.
pub fn waitlist_router<R, N>(service: Arc<WaitlistService<R, N>>) -> Router
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/waitlist",
            get(list_handler::<R, N>).post(create_handler::<R, N>),
        )
        .route(
            "/api/v1/waitlist/settings",
            get(settings_handler::<R, N>).put(update_settings_handler::<R, N>),
        )
        .route("/api/v1/waitlist/match", post(match_handler::<R, N>))
        .route("/api/v1/waitlist/auto-fill", post(auto_fill_handler::<R, N>))
        .route(
            "/api/v1/waitlist/slot-released",
            post(slot_released_handler::<R, N>),
        )
        .route("/api/v1/waitlist/expire", post(expire_handler::<R, N>))
        .route(
            "/api/v1/waitlist/:id",
            get(get_handler::<R, N>)
                .put(update_handler::<R, N>)
                .delete(cancel_handler::<R, N>),
        )
        .route("/api/v1/waitlist/:id/offer", post(send_offer_handler::<R, N>))
        .route(
            "/api/v1/waitlist/:id/offer/accept",
            post(accept_handler::<R, N>),
        )
        .route(
            "/api/v1/waitlist/:id/offer/decline",
            post(decline_handler::<R, N>),
        )
        .with_state(service)
}

impl IntoResponse for WaitlistError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidToken | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Expired => StatusCode::GONE,
            Self::InsufficientNotice { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Repository(err) => {
                tracing::error!(error = %err, "waitlist store unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        let payload = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, axum::Json(payload)).into_response()
    }
}

fn body<T>(payload: JsonBody<T>) -> Result<T, WaitlistError> {
    payload
        .map(|axum::Json(value)| value)
        .map_err(|rejection| WaitlistError::Validation(rejection.body_text()))
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, WaitlistError>) -> Response {
    match result {
        Ok(value) => (status, axum::Json(value)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_handler<R, N>(
    State(service): Service<R, N>,
    Query(query): Query<EntryQuery>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    respond(StatusCode::OK, service.list(&query))
}

pub(crate) async fn create_handler<R, N>(
    State(service): Service<R, N>,
    payload: JsonBody<EntryDraft>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    respond(
        StatusCode::CREATED,
        body(payload).and_then(|draft| service.create(draft)),
    )
}

pub(crate) async fn get_handler<R, N>(
    State(service): Service<R, N>,
    Path(id): Path<String>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    respond(StatusCode::OK, service.get(&EntryId(id)))
}

pub(crate) async fn update_handler<R, N>(
    State(service): Service<R, N>,
    Path(id): Path<String>,
    payload: JsonBody<EntryPatch>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    respond(
        StatusCode::OK,
        body(payload).and_then(|patch| service.update(&EntryId(id), patch)),
    )
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CancelRequest {
    #[serde(default)]
    reason: Option<String>,
}

pub(crate) async fn cancel_handler<R, N>(
    State(service): Service<R, N>,
    Path(id): Path<String>,
    payload: Option<axum::Json<CancelRequest>>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    let reason = payload.and_then(|axum::Json(request)| request.reason);
    respond(StatusCode::OK, service.cancel(&EntryId(id), reason))
}

pub(crate) async fn send_offer_handler<R, N>(
    State(service): Service<R, N>,
    Path(id): Path<String>,
    payload: JsonBody<SendOfferRequest>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    let entry_id = EntryId(id);
    let result = body(payload).and_then(|request| {
        let slot = request.appointment_slot.validate()?;
        let options = OfferOptions {
            expiry_minutes: request.expiry_minutes,
            notify_patient: request.notify_patient,
        };
        service.send_offer(&entry_id, &slot, options)
    });

    match result {
        Ok(offer) => {
            let payload = json!({
                "entry_id": entry_id,
                "expires_in_minutes": minutes_remaining(&offer, offer.offered_at),
                "offer": offer,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn accept_handler<R, N>(
    State(service): Service<R, N>,
    Path(id): Path<String>,
    payload: JsonBody<OfferResponse>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    respond(
        StatusCode::OK,
        body(payload).and_then(|answer| service.accept_offer(&EntryId(id), &answer.token)),
    )
}

pub(crate) async fn decline_handler<R, N>(
    State(service): Service<R, N>,
    Path(id): Path<String>,
    payload: JsonBody<OfferResponse>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    respond(
        StatusCode::OK,
        body(payload).and_then(|answer| service.decline_offer(&EntryId(id), &answer.token)),
    )
}

pub(crate) async fn match_handler<R, N>(
    State(service): Service<R, N>,
    payload: JsonBody<MatchRequest>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    let result = body(payload).and_then(|request| {
        let slot = request.slot.validate()?;
        let limit = request.limit.unwrap_or(DEFAULT_MATCH_LIMIT);
        let matches = service.match_slot(&slot, limit)?;
        Ok(json!({
            "slot": slot,
            "total": matches.len(),
            "matches": matches,
        }))
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn auto_fill_handler<R, N>(
    State(service): Service<R, N>,
    payload: JsonBody<AutoFillRequest>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    let result = body(payload).and_then(|request| {
        let slot = request.slot.validate()?;
        let options = AutoFillOptions {
            max_offers: request.max_offers.unwrap_or(DEFAULT_MAX_OFFERS),
            send_offers: request.send_offers,
        };
        service.auto_fill(&slot, options)
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn slot_released_handler<R, N>(
    State(service): Service<R, N>,
    payload: JsonBody<SlotRequest>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    let result = body(payload).and_then(|request| {
        let slot = request.validate()?;
        let outcome = service.handle_slot_released(&slot)?;
        Ok(json!({
            "automatic_offers_enabled": outcome.is_some(),
            "outcome": outcome,
        }))
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn settings_handler<R, N>(State(service): Service<R, N>) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    respond(StatusCode::OK, service.settings())
}

pub(crate) async fn update_settings_handler<R, N>(
    State(service): Service<R, N>,
    payload: JsonBody<SettingsPatch>,
) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    respond(
        StatusCode::OK,
        body(payload).and_then(|patch| service.update_settings(patch)),
    )
}

pub(crate) async fn expire_handler<R, N>(State(service): Service<R, N>) -> Response
where
    R: EntryRepository + 'static,
    N: OfferNotifier + 'static,
{
    respond(StatusCode::OK, service.run_sweeps())
}
