//! HTTP server: the `/ws` push route and a `/health` probe.

use crate::broadcaster::WsBroadcaster;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::handler::ConnectionHandler;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use lottery_core::LotteryApi;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared state of every route.
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn LotteryApi>,
    pub broadcaster: WsBroadcaster,
    pub config: GatewayConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let handler = ConnectionHandler::new(state.api.clone(), state.broadcaster.clone(), &state.config);
    ws.on_upgrade(move |socket| handler.handle(socket))
}

async fn health() -> &'static str {
    "ok"
}

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, shutdown: F) -> GatewayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    state.config.validate()?;
    let addr = state.config.bind_addr;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_on<F>(listener: TcpListener, state: AppState, shutdown: F) -> GatewayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Gateway listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Gateway stopped");
    Ok(())
}
