// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use prismq_core::{HandlerManifest, RetryPolicy, RetryPolicyResolver};
use prismq_store::Store;
use prismq_worker::{config::Cli, handlers, WorkerEngine, WorkerEngineConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let opts = Cli::parse();
    init_logging(&opts);

    info!(worker_id = %opts.worker_id, db_path = %opts.db_path.display(), "starting prismq-worker");

    let store = match Store::open(&opts.db_path) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "failed to open and bootstrap store");
            return ExitCode::from(2);
        }
    };

    let registry = match &opts.handlers_config {
        Some(path) => {
            let manifest = match HandlerManifest::load_from_file(path) {
                Ok(manifest) => manifest,
                Err(err) => {
                    error!(error = %err, path = %path.display(), "failed to load handler manifest");
                    return ExitCode::from(3);
                }
            };
            match handlers::build_registry(&manifest) {
                Ok(registry) => registry,
                Err(err) => {
                    error!(error = %err, "handler manifest references an unbound handler");
                    return ExitCode::from(3);
                }
            }
        }
        None => {
            info!("no --handlers-config given, registering the bundled demo handlers");
            handlers::build_demo_registry()
        }
    };

    let config = WorkerEngineConfig {
        worker_id: opts.worker_id.clone(),
        capabilities: opts.capability_list(),
        client_id: opts.client_id.clone(),
        concurrency: opts.concurrency,
        strategy: opts.scheduling_strategy(),
        lease_duration: Duration::from_secs(opts.lease_seconds),
        heartbeat_interval: Duration::from_secs(opts.heartbeat_seconds),
        claim_backoff_base: Duration::from_millis(opts.claim_backoff_base_ms),
        claim_backoff_cap: Duration::from_millis(opts.claim_backoff_cap_ms),
        shutdown_grace: Duration::from_secs(opts.shutdown_grace_seconds),
    };

    let engine = WorkerEngine::new(
        store,
        registry,
        RetryPolicyResolver::new(RetryPolicy::default()),
        config,
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_signal.cancel();
    });

    match engine.run(shutdown).await {
        Ok(()) => ExitCode::from(130),
        Err(err) => {
            error!(error = %err, "worker engine exited with error");
            ExitCode::from(1)
        }
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

fn init_logging(opts: &Cli) {
    let env_filter = EnvFilter::try_new(&opts.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(env_filter))
        .init();
}
