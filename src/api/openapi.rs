//! OpenAPI documentation

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::api::{events, health, registrations, visitors};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Accueil API",
        version = "0.3.0",
        description = "Event registration and front-desk check-in REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Events
        events::list_events,
        events::get_event,
        events::create_event,
        events::update_event,
        events::delete_event,
        events::audit_counter,
        events::repair_counter,
        // Registrations
        registrations::register,
        registrations::list_registrations,
        registrations::get_registration,
        registrations::check_in,
        registrations::cancel,
        // Visitors
        visitors::lookup_visitor,
    ),
    components(
        schemas(
            // Events
            crate::models::event::Event,
            crate::models::event::EventView,
            crate::models::event::EventQuery,
            crate::models::event::CreateEvent,
            crate::models::event::UpdateEvent,
            crate::models::event::CounterAudit,
            crate::lifecycle::EventStatus,
            // Registrations
            crate::models::registration::Registration,
            crate::models::registration::RegistrationStatus,
            crate::models::registration::RegistrationOutcome,
            // Visitors
            crate::models::visitor::VisitorInfo,
            crate::models::visitor::VisitorShort,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "events", description = "Event administration and listing"),
        (name = "registrations", description = "Registration, check-in and cancellation"),
        (name = "visitors", description = "Returning visitor lookup")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new().route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}
