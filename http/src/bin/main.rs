// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use prismq_http::{
    config::Cli, maintenance_scheduler, server, state::AppState, ApiKeyStore,
};
use prismq_store::Store;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let opts = Cli::parse();
    let _log_guard = init_logging(&opts);

    info!(address = %opts.address, db_path = %opts.db_path.display(), "starting prismq-server");

    let store = match Store::open(&opts.db_path) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "failed to open and bootstrap store");
            return ExitCode::from(2);
        }
    };

    let api_keys = Arc::new(ApiKeyStore::new(&opts.api_key, opts.rate_limit_per_minute));
    let state = AppState { store: store.clone() };
    let app = server::create_router(state, api_keys);

    let listener = match tokio::net::TcpListener::bind(opts.address.as_str()).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, address = %opts.address, "failed to bind address");
            return ExitCode::from(1);
        }
    };

    let shutdown = CancellationToken::new();
    let mut scheduler_config = maintenance_scheduler::MaintenanceConfig::default();
    scheduler_config.retention = std::time::Duration::from_secs(opts.retention_days * 24 * 3600);
    scheduler_config.stale_worker_threshold = std::time::Duration::from_secs(opts.stale_threshold_secs);
    scheduler_config.backup_dir = opts.backup_dir.clone();
    scheduler_config.backup_keep = opts.backup_keep;
    let scheduler_handle = tokio::spawn(maintenance_scheduler::run(
        store,
        scheduler_config,
        shutdown.child_token(),
    ));

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await;

    shutdown.cancel();
    let _ = scheduler_handle.await;

    match result {
        Ok(()) => ExitCode::from(130),
        Err(err) => {
            error!(error = %err, "server exited with error");
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

fn init_logging(opts: &Cli) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_new(&opts.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_filter(env_filter);

    let Some(dir) = &opts.log_dir else {
        tracing_subscriber::registry().with(stdout_layer).init();
        return None;
    };

    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("failed to create log dir {}: {err}", dir.display());
        tracing_subscriber::registry().with(stdout_layer).init();
        return None;
    }
    let file_appender = tracing_appender::rolling::daily(dir, "prismq-server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Some(guard)
}
