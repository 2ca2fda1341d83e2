//! Status HTTP server exposing router state

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::metrics::PrometheusSink;
use crate::router::{PollerState, Router, RouterError, Server, Strategy};

/// Shared state for the status handlers
#[derive(Clone)]
pub struct StatusState {
    pub router: Arc<Router>,
    pub strategy: Strategy,
    pub prometheus: Option<Arc<PrometheusSink>>,
    pub poller: Option<watch::Receiver<PollerState>>,
}

#[derive(Debug, Serialize)]
struct ServerStatus {
    name: String,
    address: String,
    load: Option<u64>,
}

#[derive(Debug, Serialize)]
struct PoolStatus {
    refreshed_at: Option<DateTime<Utc>>,
    poller: Option<PollerState>,
    servers: Vec<ServerStatus>,
}

/// Build the status routes
pub fn app(state: StatusState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/servers", get(servers_handler))
        .route("/servers/select", get(select_handler))
        .route("/servers/random", get(random_handler))
        .route("/servers/least-loaded", get(least_loaded_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the status routes until `cancel` fires
pub async fn run_server(
    config: &ServerConfig,
    state: StatusState,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("sdk-router status listening on {}", addr);

    Ok(axum::serve(listener, app(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn servers_handler(State(state): State<StatusState>) -> Json<PoolStatus> {
    let servers = state.router.get_all_servers().await;
    let loads = state.router.load().snapshot();

    Json(PoolStatus {
        refreshed_at: state.router.registry().pool().refreshed_at,
        poller: state.poller.as_ref().map(|rx| *rx.borrow()),
        servers: servers
            .iter()
            .map(|s| ServerStatus {
                name: s.name.clone(),
                address: s.address.clone(),
                load: loads.get(&s.address).copied(),
            })
            .collect(),
    })
}

async fn select_handler(State(state): State<StatusState>) -> Response {
    selection_response(state.router.select(state.strategy).await)
}

async fn random_handler(State(state): State<StatusState>) -> Response {
    selection_response(state.router.random_server().await)
}

async fn least_loaded_handler(State(state): State<StatusState>) -> Response {
    selection_response(state.router.least_loaded_server().await)
}

fn selection_response(result: Result<Server, RouterError>) -> Response {
    match result {
        Ok(server) => Json(server).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn metrics_handler(State(state): State<StatusState>) -> Response {
    let Some(prometheus) = state.prometheus else {
        return (StatusCode::NOT_FOUND, "prometheus metrics disabled").into_response();
    };

    match prometheus.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
