// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use axum::{body::Body, extract::State, http::header, response::Response, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use utoipa::OpenApi;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Metrics",
    responses(
        (status = 200, description = "current prometheus counters/gauges/histograms registered in this process"),
    )
)]
/// Prometheus metrics, distinct from the JSON business metrics at `/queue/stats`.
/// Only carries the completion/failure/dead-letter counters and the
/// claim-to-completion histogram when this process also hosts the executor
/// that increments them (see `crate::metrics`).
async fn metrics_handler(State(state): State<AppState>) -> Response {
    crate::metrics::refresh_gauges(&state.store);
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    let metric_families = prometheus::gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("encoding a gathered metric family never fails");
    Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(Body::from(buffer))
        .expect("static header and byte body always build")
}

#[derive(OpenApi)]
#[openapi(paths(metrics_handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(metrics_handler))
}
