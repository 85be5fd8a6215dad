// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

pub mod enqueue;
pub mod health;
pub mod metrics;
pub mod stats;
pub mod tasks;

use axum::Router;
use utoipa::OpenApi;

use crate::{models, state::AppState};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PrismQ Queue API",
        version = "1.0",
        description = "Durable, at-least-once task queue: enqueue, poll, cancel and observe tasks over HTTP.",
        license(name = "MIT OR Apache-2.0"),
    ),
    components(schemas(
        models::EnqueueRequest,
        models::TaskResponse,
        models::StatsResponse,
        models::HealthResponse,
    )),
    tags(
        (name = "Queue", description = "Enqueue, fetch, cancel and observe tasks"),
        (name = "Health", description = "Liveness and store-integrity checks"),
        (name = "Metrics", description = "Prometheus scrape endpoint"),
    )
)]
pub struct Docs;

#[must_use]
pub fn create_docs() -> utoipa::openapi::OpenApi {
    [
        enqueue::create_docs(),
        tasks::create_docs(),
        stats::create_docs(),
        health::create_docs(),
        metrics::create_docs(),
    ]
    .into_iter()
    .fold(Docs::openapi(), |mut doc, sub_doc| {
        doc.merge(sub_doc);
        doc
    })
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .nest("/queue/enqueue", enqueue::create_router())
        .nest("/queue/tasks", tasks::create_router())
        .nest("/queue/stats", stats::create_router())
        .nest("/health", health::create_router())
        .nest("/metrics", metrics::create_router())
}
