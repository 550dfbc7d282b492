//! GroupDraw WebSocket Relay Server
//!
//! Relays opaque session payloads between peers in the same room and keeps
//! every member's roster up to date.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "message", "data": "<base64 payload>" }
//! { "type": "leave" }
//! ```
//! Binary frames are relayed as if sent in a `message` envelope.

mod config;
mod rooms;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use config::{ConfigError, ServerConfig};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use groupdraw_core::transport::{ClientMessage, ServerMessage};
use rooms::{AppState, RoomEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groupdraw_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let state = Arc::new(AppState::new(config.room_capacity));
    let app = router(state);

    info!("GroupDraw relay server listening on {}", config.addr);
    info!("WebSocket endpoint: ws://{}/ws", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "GroupDraw Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

type Sender = SplitSink<WebSocket, Message>;

/// Serialize and send one message. Returns `false` once the socket is gone.
async fn send_json(sender: &mut Sender, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

/// Per-connection room membership.
struct Membership {
    room: String,
    rx: broadcast::Receiver<RoomEvent>,
}

fn leave(state: &AppState, peer_id: &str, membership: Option<Membership>) {
    if let Some(Membership { room, .. }) = membership {
        state.leave_room(&room, peer_id);
        state.broadcast(&room, peer_id, ServerMessage::PeerLeft {
            peer_id: peer_id.to_string(),
        });
        info!("Peer {} left room {}", peer_id, room);
    }
}

/// What to do with one event from the room channel.
#[derive(Debug, PartialEq)]
enum Relay {
    Forward(ServerMessage),
    Skip,
    Disconnect,
}

fn relay_action(peer_id: &str, event: Result<RoomEvent, RecvError>) -> Relay {
    match event {
        // Don't echo back to sender
        Ok((from, _)) if from == peer_id => Relay::Skip,
        Ok((_, server_msg)) => Relay::Forward(server_msg),
        // Peers rely on complete, ordered delivery. A peer that missed
        // messages is dropped so it reconnects and catches up from a `Join`.
        Err(RecvError::Lagged(skipped)) => {
            warn!("Peer {} lagged by {} messages, disconnecting", peer_id, skipped);
            Relay::Disconnect
        }
        Err(RecvError::Closed) => Relay::Disconnect,
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut membership: Option<Membership> = None;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                let client_msg = match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => client_msg,
                        Err(e) => {
                            warn!("Invalid message from {}: {}", peer_id, e);
                            let err = ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            };
                            if !send_json(&mut sender, &err).await {
                                break;
                            }
                            continue;
                        }
                    },
                    // Binary frames carry a raw payload
                    Some(Ok(Message::Binary(data))) => ClientMessage::Message {
                        data: BASE64.encode(&data),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                };

                match client_msg {
                    ClientMessage::Join { room } => {
                        if room.trim().is_empty() {
                            let err = ServerMessage::Error {
                                message: "Room name must not be empty".to_string(),
                            };
                            if !send_json(&mut sender, &err).await {
                                break;
                            }
                            continue;
                        }

                        leave(&state, &peer_id, membership.take());

                        let (rx, peers) = state.join_room(&room, &peer_id);
                        membership = Some(Membership { room: room.clone(), rx });

                        let joined = ServerMessage::Joined {
                            room: room.clone(),
                            peer_id: peer_id.clone(),
                            peers,
                        };
                        if !send_json(&mut sender, &joined).await {
                            break;
                        }

                        // Notify others
                        state.broadcast(&room, &peer_id, ServerMessage::PeerJoined {
                            peer_id: peer_id.clone(),
                        });
                        info!("Peer {} joined room {}", peer_id, room);
                    }
                    ClientMessage::Leave => leave(&state, &peer_id, membership.take()),
                    ClientMessage::Message { data } => match &membership {
                        Some(m) => {
                            debug!("Relaying {} bytes from {} in {}", data.len(), peer_id, m.room);
                            state.broadcast(&m.room, &peer_id, ServerMessage::Message {
                                from: peer_id.clone(),
                                data,
                            });
                        }
                        None => {
                            let err = ServerMessage::Error {
                                message: "Join a room before sending".to_string(),
                            };
                            if !send_json(&mut sender, &err).await {
                                break;
                            }
                        }
                    },
                }
            }

            // Handle broadcast messages from room
            event = async {
                match &mut membership {
                    Some(m) => m.rx.recv().await,
                    // No room joined, just wait forever
                    None => std::future::pending().await,
                }
            } => {
                match relay_action(&peer_id, event) {
                    Relay::Forward(server_msg) => {
                        if !send_json(&mut sender, &server_msg).await {
                            break;
                        }
                    }
                    Relay::Skip => {}
                    Relay::Disconnect => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    leave(&state, &peer_id, membership.take());
    info!("Connection closed: {}", peer_id);
}
