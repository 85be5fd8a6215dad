// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use utoipa::OpenApi;

use crate::{error::HttpResult, models::StatsQuery, models::StatsResponse, state::AppState};

const SUCCESS_RATE_WINDOW: Duration = Duration::from_secs(24 * 3600);
const STALE_WORKER_THRESHOLD: Duration = Duration::from_secs(300);

#[utoipa::path(
    get,
    path = "/queue/stats",
    tag = "Queue",
    params(("type" = Option<String>, Query, description = "restrict success_rate_24h to one task type")),
    responses(
        (status = 200, description = "queue depth, success rate and latency snapshot", body = StatsResponse),
    )
)]
/// Queue statistics snapshot
async fn stats_handler(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> HttpResult<impl IntoResponse> {
    let depth_by_status = state.store.queue_depth_by_status()?;
    let mut depth_by_type = state.store.queue_depth_by_type()?;
    let mut success_rate_24h = state.store.success_rates(SUCCESS_RATE_WINDOW)?;
    if let Some(task_type) = query.task_type {
        depth_by_type.retain(|r| r.task_type == task_type);
        success_rate_24h.retain(|r| r.task_type == task_type);
    }
    let percentiles = state.store.processing_time_percentiles(SUCCESS_RATE_WINDOW)?;
    let workers = state.store.worker_activity()?;
    let workers_active = workers
        .iter()
        .filter(|w| w.seconds_since_heartbeat <= STALE_WORKER_THRESHOLD.as_secs_f64())
        .count() as i64;
    let workers_stale = workers.len() as i64 - workers_active;

    Ok(Json(StatsResponse {
        depth_by_status,
        depth_by_type,
        success_rate_24h,
        processing_ms_p95: percentiles.p95_ms,
        workers_active,
        workers_stale,
    }))
}

#[derive(OpenApi)]
#[openapi(paths(stats_handler), components(schemas(StatsResponse)))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(stats_handler))
}
