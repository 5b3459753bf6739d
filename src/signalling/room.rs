//! A logical conference (§3): a room-id and the set of peers that
//! currently claim it. Rooms are created lazily by the first join and
//! removed by the registry the moment the last peer leaves.

use std::collections::HashMap;
use std::sync::Arc;

use sfu_proto::RoomId;

use crate::signalling::peer::{PeerContext, PeerId};

pub struct Room {
    pub id: RoomId,
    peers: HashMap<PeerId, Arc<PeerContext>>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            peers: HashMap::new(),
        }
    }

    pub fn insert(&mut self, peer: Arc<PeerContext>) {
        self.peers.insert(peer.id, peer);
    }

    pub fn remove(&mut self, id: &PeerId) -> Option<Arc<PeerContext>> {
        self.peers.remove(id)
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Peers currently in the room, optionally excluding one (used by C5
    /// to compute a peer's desired subscription set without itself).
    pub fn peers(&self, exclude: Option<PeerId>) -> Vec<Arc<PeerContext>> {
        self.peers
            .values()
            .filter(|p| Some(p.id) != exclude)
            .cloned()
            .collect()
    }
}
