// src/main.rs
use std::{sync::Arc, time::Duration as StdDuration};

use signin_relay::{
    activity::ActivityLog,
    api::{router, AppState},
    config::Config,
    console::WalletConsole,
    signer::LocalSigner,
    store::ChallengeStore,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let shutdown = CancellationToken::new();

    let signer = Arc::new(LocalSigner::generate(config.wallet_origin.clone()));
    info!(origin = %signer.origin(), "local wallet ready");

    let log = ActivityLog::with_retention(config.log_retention);
    let console = WalletConsole::new(signer, config.console_settings(), log.clone());
    let store = ChallengeStore::with_capacity(config.max_pending);

    let sweeper = tokio::spawn(sweep_worker(store.clone(), shutdown.clone()));

    // sign-in requests wait on the signer, leave them room to time out first
    let request_timeout = config.signer_timeout + StdDuration::from_secs(10);
    let addr = config.bind_addr;
    let app = router(AppState {
        config: Arc::new(config),
        store,
        log,
        console: Arc::new(console),
        shutdown: shutdown.clone(),
    })
    .layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(request_timeout)),
    );

    info!("sign-in relay listening on {addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    sweeper.await.ok();
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not listen for ctrl-c: {e}");
        return shutdown.cancelled().await;
    }
    info!("shutting down");
    shutdown.cancel();
}

async fn sweep_worker(store: ChallengeStore, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(StdDuration::from_secs(60)) => {
                let purged = store.purge_expired();
                if purged > 0 {
                    info!(purged, "expired challenges swept");
                }
            }
        }
    }
}
