//! Registration API endpoints: register, check in, cancel

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        registration::{Registration, RegistrationOutcome},
        visitor::VisitorInfo,
    },
    AppState,
};

use super::Context;

/// Register a visitor for an event.
///
/// Registering again returns the existing registration with 200.
#[utoipa::path(
    post,
    path = "/events/{id}/registrations",
    tag = "registrations",
    params(("id" = Uuid, Path, description = "Event ID")),
    request_body = VisitorInfo,
    responses(
        (status = 201, description = "Registration created", body = RegistrationOutcome),
        (status = 200, description = "Visitor was already registered", body = RegistrationOutcome),
        (status = 400, description = "Invalid visitor data", body = crate::error::ErrorResponse),
        (status = 422, description = "Event is completed", body = crate::error::ErrorResponse),
        (status = 503, description = "Store unavailable, retry", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Context(ctx): Context,
    Path(event_id): Path<Uuid>,
    Json(info): Json<VisitorInfo>,
) -> AppResult<(StatusCode, Json<RegistrationOutcome>)> {
    let outcome = state.services.registrations.register(&ctx, event_id, info).await?;
    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(outcome)))
}

/// List registrations of an event
#[utoipa::path(
    get,
    path = "/events/{id}/registrations",
    tag = "registrations",
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Registrations, oldest first", body = Vec<Registration>)
    )
)]
pub async fn list_registrations(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<Vec<Registration>>> {
    let registrations = state.services.registrations.list_for_event(event_id).await?;
    Ok(Json(registrations))
}

/// Get a registration by confirmation code
#[utoipa::path(
    get,
    path = "/registrations/{code}",
    tag = "registrations",
    params(("code" = String, Path, description = "Confirmation code")),
    responses(
        (status = 200, description = "Registration", body = Registration),
        (status = 404, description = "Unknown code", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_registration(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<Registration>> {
    let registration = state.services.registrations.get_by_code(&code).await?;
    Ok(Json(registration))
}

/// Check a visitor in at the door
#[utoipa::path(
    post,
    path = "/registrations/{code}/check-in",
    tag = "registrations",
    params(("code" = String, Path, description = "Confirmation code")),
    responses(
        (status = 200, description = "Visitor checked in", body = Registration),
        (status = 409, description = "Already checked in or cancelled", body = crate::error::ErrorResponse)
    )
)]
pub async fn check_in(
    State(state): State<AppState>,
    Context(ctx): Context,
    Path(code): Path<String>,
) -> AppResult<Json<Registration>> {
    let registration = state.services.registrations.check_in(&ctx, &code).await?;
    Ok(Json(registration))
}

/// Cancel a registration
#[utoipa::path(
    post,
    path = "/registrations/{code}/cancel",
    tag = "registrations",
    params(("code" = String, Path, description = "Confirmation code")),
    responses(
        (status = 200, description = "Registration cancelled", body = RegistrationOutcome),
        (status = 409, description = "Already cancelled or checked in", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel(
    State(state): State<AppState>,
    Context(ctx): Context,
    Path(code): Path<String>,
) -> AppResult<Json<RegistrationOutcome>> {
    let outcome = state.services.registrations.cancel(&ctx, &code).await?;
    Ok(Json(outcome))
}
