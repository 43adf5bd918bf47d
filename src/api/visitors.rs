//! Visitor lookup endpoint

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::visitor::{VisitorLookupQuery, VisitorShort},
    AppState,
};

/// Find a returning visitor by phone number (express registration)
#[utoipa::path(
    get,
    path = "/visitors/lookup",
    tag = "visitors",
    params(VisitorLookupQuery),
    responses(
        (status = 200, description = "Visitor found", body = VisitorShort),
        (status = 404, description = "No visitor with this phone", body = crate::error::ErrorResponse)
    )
)]
pub async fn lookup_visitor(
    State(state): State<AppState>,
    Query(query): Query<VisitorLookupQuery>,
) -> AppResult<Json<VisitorShort>> {
    let visitor = state.services.visitors.lookup_by_phone(&query.phone).await?;
    Ok(Json(visitor))
}
