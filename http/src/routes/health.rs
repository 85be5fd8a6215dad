// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use utoipa::OpenApi;

use crate::{models::HealthResponse, state::AppState};

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "store is reachable and its integrity check passes", body = HealthResponse),
        (status = 503, description = "store integrity check failed"),
    )
)]
/// Health check
///
/// Runs `PRAGMA integrity_check` against the store; 503 if it reports
/// anything other than `ok`.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.integrity_check() {
        Ok(report) if report.is_ok() => {
            (StatusCode::OK, Json(HealthResponse { status: "ok".into(), db: "ok".into() }))
        }
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "unavailable".into(), db: "error".into() }),
        ),
    }
}

#[derive(OpenApi)]
#[openapi(paths(health_handler), components(schemas(HealthResponse)))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(health_handler))
}
