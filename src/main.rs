use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;

mod config;
mod error;
mod functions;
mod schema;
mod services;

use config::Config;
use functions::{AppState, DispatchSchedule, Dispatcher};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let schedule = config
        .clock
        .as_ref()
        .map(DispatchSchedule::parse)
        .transpose()?;

    let store = services::build_store(&config.store).await?;
    let provider = services::build_provider(&config.provider)?;
    let dispatcher = Arc::new(Dispatcher::new(store, provider));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let clock = schedule.map(|schedule| {
        tracing::info!("clock: in-process dispatch schedule enabled");
        tokio::spawn(functions::run_clock(dispatcher.clone(), schedule, shutdown_rx))
    });

    let app = functions::router(AppState {
        dispatcher,
        dispatch_secret: Arc::from(config.dispatch_secret.as_str()),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "dispatch trigger listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send(true).ok();
    if let Some(clock) = clock {
        clock.await.ok();
    }
    Ok(())
}
