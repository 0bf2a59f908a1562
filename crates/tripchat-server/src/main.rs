mod config;

use std::sync::Arc;

use axum::http::{Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tripchat_api::AppStateInner;
use tripchat_auth::{TokenAuthority, spawn_rotation};
use tripchat_chat::{ChatService, HttpTripDirectory, StaticTripDirectory, TripDirectory};
use tripchat_db::{Database, SqliteStore};
use tripchat_gateway::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripchat=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            eprintln!("       Fix the TRIPCHAT_* settings in your environment or .env file.");
            std::process::exit(1);
        }
    };

    info!("Starting tripchat ({:?})", config.environment);
    let db = Arc::new(Database::open(&config.db_path, config.db_readers)?);
    let store = Arc::new(SqliteStore::new(db));

    let tokens = Arc::new(TokenAuthority::new(
        config.jwt_secret.clone(),
        config.jwt_issuer.clone(),
    )?);
    let shutdown = CancellationToken::new();
    let rotation = config
        .rotation_period
        .map(|period| spawn_rotation(tokens.clone(), period, shutdown.child_token()));

    let trips: Arc<dyn TripDirectory> = match &config.trip_service_url {
        Some(url) => {
            info!("Resolving trip roles via {}", url);
            Arc::new(HttpTripDirectory::new(url.clone(), config.trip_service_timeout)?)
        }
        None => {
            let directory = StaticTripDirectory::parse(&config.trip_roles).map_err(anyhow::Error::msg)?;
            info!("Using static trip roles ({} entries)", directory.len());
            Arc::new(directory)
        }
    };

    let dispatcher = Dispatcher::with_buffer(config.event_buffer);
    let chat = ChatService::new(store, trips, Arc::new(dispatcher.clone()))
        .with_emit_timeout(config.emit_timeout);

    let state = Arc::new(AppStateInner {
        chat: Arc::new(chat),
        tokens,
        request_timeout: config.request_timeout,
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let app = tripchat_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Tripchat server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    if let Some(rotation) = rotation {
        rotation.stop().await;
    }
    dispatcher.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
    shutdown.cancel();
}
