//! WebSocket relay transport.
//!
//! Connects to `groupdraw-server`, which groups peers into rooms. Envelopes
//! are JSON tagged by `type`; drawing payloads travel base64-encoded inside
//! `message` envelopes:
//! ```json
//! { "type": "join", "room": "lobby" }
//! { "type": "message", "data": "<base64 payload>" }
//! { "type": "joined", "room": "lobby", "peer_id": "...", "peers": ["..."] }
//! ```

use super::{
    Inbound, InboundStream, SendError, SessionHandle, SessionProvider, TransportError,
    TransportResult,
};
use crate::config::RelayConfig;
use crate::participant::{ParticipantId, ParticipantSet};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Payload for every other peer in the room (base64)
    Message { data: String },
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with the full roster, including the joiner
    Joined {
        room: String,
        peer_id: String,
        peers: Vec<String>,
    },
    /// Peer joined the room
    PeerJoined { peer_id: String },
    /// Peer left the room
    PeerLeft { peer_id: String },
    /// Payload from another peer (base64)
    Message { from: String, data: String },
    /// Error message
    Error { message: String },
}

/// Commands sent to the writer task.
enum WsCommand {
    Send(String),
    Close,
}

/// Sessions served by a relay room.
///
/// Every subscription opens its own connection and offers exactly one
/// session for it. Reconnecting is left to the caller: discover again.
#[derive(Debug, Clone)]
pub struct RelayProvider {
    config: RelayConfig,
}

impl RelayProvider {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

impl SessionProvider for RelayProvider {
    type Handle = RelayHandle;

    fn sessions(&self) -> mpsc::UnboundedReceiver<RelayHandle> {
        let (offer_tx, offer_rx) = mpsc::unbounded_channel();
        let config = self.config.clone();

        tokio::spawn(async move {
            match RelayHandle::connect(&config).await {
                Ok(handle) => {
                    let _ = offer_tx.send(handle);
                }
                Err(e) => log::error!("Relay connection to {} failed: {}", config.url, e),
            }
        });

        offer_rx
    }
}

/// One connection to a relay room.
pub struct RelayHandle {
    room: String,
    commands: mpsc::UnboundedSender<WsCommand>,
    inbound: Option<InboundStream>,
    roster: watch::Receiver<ParticipantSet>,
    local_id: watch::Receiver<Option<ParticipantId>>,
}

impl RelayHandle {
    /// Open a connection and start its reader and writer tasks.
    pub async fn connect(config: &RelayConfig) -> TransportResult<Self> {
        log::info!("Connecting to relay {}", config.url);
        let (socket, response) = tokio_tungstenite::connect_async(config.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        log::info!("Relay connected, status: {}", response.status());

        let (mut sink, mut stream) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<WsCommand>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (roster_tx, roster_rx) = watch::channel(ParticipantSet::new());
        let (local_tx, local_rx) = watch::channel(None);

        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    WsCommand::Send(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            log::error!("Relay send error: {}", e);
                            break;
                        }
                    }
                    WsCommand::Close => {
                        log::info!("Relay close requested");
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(server_msg) => {
                                handle_server_message(server_msg, &inbound_tx, &roster_tx, &local_tx)
                            }
                            Err(e) => log::warn!("Failed to parse relay message: {}", e),
                        }
                    }
                    Ok(Message::Close(_)) => {
                        log::info!("Relay sent close frame");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::error!("Relay read error: {}", e);
                        break;
                    }
                }
            }
            log::info!("Relay connection closed");
            // Dropping the senders ends the session for the coordinator.
        });

        Ok(Self {
            room: config.room.clone(),
            commands: cmd_tx,
            inbound: Some(inbound_rx),
            roster: roster_rx,
            local_id: local_rx,
        })
    }

    /// Identity the server assigned to this connection, once joined.
    pub fn local_id(&self) -> Option<ParticipantId> {
        self.local_id.borrow().clone()
    }

    fn enqueue(&self, msg: &ClientMessage) -> Result<(), SendError> {
        let json = serde_json::to_string(msg).map_err(|e| SendError::Transport(e.to_string()))?;
        self.commands
            .send(WsCommand::Send(json))
            .map_err(|_| SendError::Closed)
    }
}

fn handle_server_message(
    msg: ServerMessage,
    inbound: &mpsc::UnboundedSender<Inbound>,
    roster: &watch::Sender<ParticipantSet>,
    local_id: &watch::Sender<Option<ParticipantId>>,
) {
    match msg {
        ServerMessage::Joined {
            room,
            peer_id,
            peers,
        } => {
            log::info!("Joined relay room {} as {} ({} peers)", room, peer_id, peers.len());
            local_id.send_replace(Some(ParticipantId::from(peer_id)));
            roster.send_replace(peers.into_iter().map(ParticipantId::from).collect());
        }
        ServerMessage::PeerJoined { peer_id } => {
            roster.send_modify(|set| {
                set.insert(ParticipantId::from(peer_id));
            });
        }
        ServerMessage::PeerLeft { peer_id } => {
            roster.send_modify(|set| {
                set.remove(&ParticipantId::from(peer_id));
            });
        }
        ServerMessage::Message { from, data } => match BASE64.decode(data.as_bytes()) {
            Ok(payload) => {
                let _ = inbound.send(Inbound {
                    from: ParticipantId::from(from),
                    payload,
                });
            }
            Err(e) => log::warn!("Dropping relay payload from {}: {}", from, e),
        },
        ServerMessage::Error { message } => log::warn!("Relay error: {}", message),
    }
}

impl SessionHandle for RelayHandle {
    fn id(&self) -> &str {
        &self.room
    }

    fn join(&self) -> TransportResult<()> {
        self.enqueue(&ClientMessage::Join {
            room: self.room.clone(),
        })
        .map_err(|_| TransportError::Closed)
    }

    fn send(&self, payload: Vec<u8>) -> Result<(), SendError> {
        self.enqueue(&ClientMessage::Message {
            data: BASE64.encode(payload),
        })
    }

    fn take_messages(&mut self) -> Option<InboundStream> {
        self.inbound.take()
    }

    fn roster(&self) -> watch::Receiver<ParticipantSet> {
        self.roster.clone()
    }

    fn local_participant(&self) -> Option<ParticipantId> {
        self.local_id()
    }

    fn end(&self) {
        let _ = self.enqueue(&ClientMessage::Leave);
        let _ = self.commands.send(WsCommand::Close);
    }
}
