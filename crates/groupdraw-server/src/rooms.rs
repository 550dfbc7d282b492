//! Room membership and fan-out.
//!
//! Rooms exist while they have peers. The server never looks inside the
//! payloads it relays and keeps no drawing state.

use dashmap::DashMap;
use groupdraw_core::transport::ServerMessage;
use std::collections::BTreeSet;
use tokio::sync::broadcast;

/// A message tagged with the peer that sent it.
pub type RoomEvent = (String, ServerMessage);

struct Room {
    tx: broadcast::Sender<RoomEvent>,
    peers: BTreeSet<String>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            peers: BTreeSet::new(),
        }
    }
}

/// Shared application state
pub struct AppState {
    rooms: DashMap<String, Room>,
    capacity: usize,
}

impl AppState {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity,
        }
    }

    /// Add a peer to a room, creating it if needed. Returns the room's
    /// event stream and its roster including the new peer.
    pub fn join_room(&self, room_id: &str, peer_id: &str) -> (broadcast::Receiver<RoomEvent>, Vec<String>) {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(self.capacity));
        room.peers.insert(peer_id.to_string());
        let rx = room.tx.subscribe();
        let peers = room.peers.iter().cloned().collect();
        (rx, peers)
    }

    /// Remove a peer; empty rooms are dropped.
    pub fn leave_room(&self, room_id: &str, peer_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.peers.remove(peer_id);
            if room.peers.is_empty() {
                drop(room);
                self.rooms.remove_if(room_id, |_, room| room.peers.is_empty());
            }
        }
    }

    /// Send to every subscriber of a room. Receivers skip their own messages.
    pub fn broadcast(&self, room_id: &str, from: &str, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((from.to_string(), msg));
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peers(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|room| room.peers.iter().cloned().collect())
            .unwrap_or_default()
    }
}
