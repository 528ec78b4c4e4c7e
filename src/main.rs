//! Chess relay server: serves `/ws` for players plus health and API docs.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use chess_relay::{
    routes,
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let state = AppState::new();
    let addr = listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, registry = ?state.config().registry_locking(), "chess relay listening");

    axum::serve(listener, app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    info!("chess relay stopped");
    Ok(())
}

fn app(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// `PORT` wins over `SERVER_PORT`; unparsable values fall back to [`DEFAULT_PORT`].
fn listen_addr() -> SocketAddr {
    let port = ["PORT", "SERVER_PORT"]
        .into_iter()
        .find_map(|key| env::var(key).ok())
        .map(|raw| {
            raw.parse::<u16>().unwrap_or_else(|_| {
                warn!(value = %raw, "invalid port, using default");
                DEFAULT_PORT
            })
        })
        .unwrap_or(DEFAULT_PORT);
    SocketAddr::from(([0, 0, 0, 0], port))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
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
    info!("shutdown requested");
}
