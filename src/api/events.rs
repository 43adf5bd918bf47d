//! Events API endpoints (concerts, exhibitions, workshops)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::event::{CounterAudit, CreateEvent, EventQuery, EventView, UpdateEvent},
    AppState,
};

use super::Context;

/// List events; completed events only with `include_completed=true`
#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    params(EventQuery),
    responses(
        (status = 200, description = "Events by start date", body = Vec<EventView>)
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    Context(ctx): Context,
    Query(query): Query<EventQuery>,
) -> AppResult<Json<Vec<EventView>>> {
    let events = state.services.events.list(&ctx, &query).await?;
    Ok(Json(events))
}

/// Get event by ID with its current status
#[utoipa::path(
    get,
    path = "/events/{id}",
    tag = "events",
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event details", body = EventView),
        (status = 404, description = "Event not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    Context(ctx): Context,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EventView>> {
    let event = state.services.events.get(&ctx, id).await?;
    Ok(Json(event))
}

/// Create an event
#[utoipa::path(
    post,
    path = "/events",
    tag = "events",
    request_body = CreateEvent,
    responses(
        (status = 201, description = "Event created", body = EventView),
        (status = 400, description = "Invalid event", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_event(
    State(state): State<AppState>,
    Context(ctx): Context,
    Json(data): Json<CreateEvent>,
) -> AppResult<(StatusCode, Json<EventView>)> {
    let event = state.services.events.create(&ctx, data).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Update an event
#[utoipa::path(
    put,
    path = "/events/{id}",
    tag = "events",
    params(("id" = Uuid, Path, description = "Event ID")),
    request_body = UpdateEvent,
    responses(
        (status = 200, description = "Event updated", body = EventView)
    )
)]
pub async fn update_event(
    State(state): State<AppState>,
    Context(ctx): Context,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateEvent>,
) -> AppResult<Json<EventView>> {
    let event = state.services.events.update(&ctx, id, data).await?;
    Ok(Json(event))
}

/// Delete an event without registrations
#[utoipa::path(
    delete,
    path = "/events/{id}",
    tag = "events",
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 204, description = "Event deleted"),
        (status = 409, description = "Event has registrations", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_event(
    State(state): State<AppState>,
    Context(ctx): Context,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.services.events.delete(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Compare the stored registration counter with active registrations
#[utoipa::path(
    get,
    path = "/events/{id}/counter",
    tag = "events",
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Counter audit", body = CounterAudit)
    )
)]
pub async fn audit_counter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CounterAudit>> {
    let audit = state.services.events.audit_counter(id).await?;
    Ok(Json(audit))
}

/// Reset the registration counter to the number of active registrations
#[utoipa::path(
    post,
    path = "/events/{id}/counter/repair",
    tag = "events",
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Counter after repair", body = CounterAudit)
    )
)]
pub async fn repair_counter(
    State(state): State<AppState>,
    Context(ctx): Context,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CounterAudit>> {
    let audit = state.services.events.repair_counter(&ctx, id).await?;
    Ok(Json(audit))
}
