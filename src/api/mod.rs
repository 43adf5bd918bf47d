//! API handlers for Accueil REST endpoints

pub mod events;
pub mod health;
pub mod openapi;
pub mod registrations;
pub mod visitors;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    context::{Caller, RequestContext},
    error::AppError,
    AppState,
};

/// Header naming the staff member operating the front desk
pub const STAFF_MEMBER_HEADER: &str = "x-staff-member";

/// Extractor building the request context: caller identity, evaluation
/// instant and operation deadline.
///
/// The staff header is only recorded in logs, it grants nothing.
pub struct Context(pub RequestContext);

#[async_trait]
impl FromRequestParts<AppState> for Context {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let caller = parts
            .headers
            .get(STAFF_MEMBER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Caller::Staff(name.to_string()))
            .unwrap_or(Caller::Visitor);

        Ok(Context(RequestContext::now(
            caller,
            state.config.registration.operation_timeout(),
        )))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Events
        .route("/events", get(events::list_events).post(events::create_event))
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/counter", get(events::audit_counter))
        .route("/events/:id/counter/repair", post(events::repair_counter))
        // Registrations
        .route(
            "/events/:id/registrations",
            get(registrations::list_registrations).post(registrations::register),
        )
        .route("/registrations/:code", get(registrations::get_registration))
        .route("/registrations/:code/check-in", post(registrations::check_in))
        .route("/registrations/:code/cancel", post(registrations::cancel))
        // Visitors
        .route("/visitors/lookup", get(visitors::lookup_visitor))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
