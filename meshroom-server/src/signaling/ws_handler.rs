use crate::app::AppState;
use crate::session::SessionCommand;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use meshroom_core::{ClientMessage, ConnectionId, ErrorCode, ServerMessage};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::new();
    info!("New WebSocket connection: {:?}", connection_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_peer(connection_id, tx);
    state
        .signaling
        .send_signal(connection_id, ServerMessage::Welcome { connection_id });
    state.signaling.send_signal(
        connection_id,
        ServerMessage::IceConfig {
            ice_servers: state.signaling.get_ice_servers(),
        },
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match ClientMessage::parse(text.as_str()) {
                        Ok(message) => {
                            let cmd = SessionCommand::Client {
                                connection_id,
                                message,
                            };
                            if let Err(e) = state.sessions.send(cmd).await {
                                error!("Session coordinator died: {}", e);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid message from {:?}: {}", connection_id, e);
                            state.signaling.send_signal(
                                connection_id,
                                ServerMessage::error(ErrorCode::Malformed, e.to_string()),
                            );
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.signaling.remove_peer(&connection_id);
    let _ = state
        .sessions
        .send(SessionCommand::Disconnect { connection_id })
        .await;
    info!("WebSocket disconnected: {:?}", connection_id);
}
