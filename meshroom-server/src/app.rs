use crate::config::ServerConfig;
use crate::session::{SessionCommand, SessionCoordinator};
use crate::signaling::{SignalingService, ws_handler};
use axum::{Router, routing::get};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

/// Shared by every WebSocket handler.
#[derive(Clone)]
pub struct AppState {
    pub signaling: SignalingService,
    pub sessions: mpsc::Sender<SessionCommand>,
}

/// Spawns the session coordinator and returns the state handlers need to reach it.
pub fn spawn_sessions(config: &ServerConfig) -> AppState {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(config.command_buffer);
    let signaling = SignalingService::new(config.ice_servers.clone());

    let coordinator = SessionCoordinator::new(config, cmd_rx, Arc::new(signaling.clone()));
    tokio::spawn(coordinator.run());

    AppState {
        signaling,
        sessions: cmd_tx,
    }
}

pub fn router(state: AppState) -> Router {
    // Browser clients are served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}
