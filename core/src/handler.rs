// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! A handler is a plain function bound to a task `type`. It receives the
//! task's raw JSON payload and a cancellation token, and returns either a
//! JSON result or an error message. Concurrency is achieved by the worker
//! engine running many handler invocations in parallel tasks, never by a
//! cooperative event loop inside a handler itself.

use std::{future::Future, pin::Pin, sync::Arc};

/// Re-exported so downstream crates don't need a direct `tokio-util` dependency.
pub type CancellationToken = tokio_util::sync::CancellationToken;

/// The result of one handler invocation.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// The handler completed; the payload is stored verbatim in `Task::result`.
    Success(Vec<u8>),
    /// The handler failed; the message is stored in `Task::error_message`.
    Failure(String),
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A registered task handler.
///
/// Implementors must not block the calling thread for longer than
/// `lease_duration` without observing `cancel` — the executor relies on
/// the handler returning promptly once cancellation is requested (see
/// `WorkerEngine` shutdown and task-cancel semantics).
pub trait Handler: Send + Sync {
    fn invoke<'a>(
        &'a self,
        payload: &'a [u8],
        cancel: CancellationToken,
    ) -> BoxFuture<'a, HandlerOutcome>;
}

/// Adapts a plain async function into a [`Handler`].
pub struct HandlerFn<F> {
    f: Arc<F>,
}

impl<F> HandlerFn<F> {
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Vec<u8>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    fn invoke<'a>(
        &'a self,
        payload: &'a [u8],
        cancel: CancellationToken,
    ) -> BoxFuture<'a, HandlerOutcome> {
        let f = self.f.clone();
        let payload = payload.to_vec();
        Box::pin(async move { f(payload, cancel).await })
    }
}
