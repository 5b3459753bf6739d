//! Room registry (C2): room-id -> peer set, concurrency-safe.
//!
//! Grounded in Medea's own `PeerRepository` (see the `signalling::peers`
//! module it retains in sibling forks): a single lock guarding a flat
//! map, with join/leave as the only mutating operations and deletion of
//! the room entry folded into the same critical section as the last
//! `leave` to avoid a transient empty-room window (§4.2).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sfu_proto::RoomId;

use crate::signalling::peer::{PeerContext, PeerId};
use crate::signalling::room::Room;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert: creates the room on first join.
    pub fn join(&self, room_id: RoomId, peer: Arc<PeerContext>) {
        let mut rooms = self.rooms.write();
        rooms
            .entry(room_id.clone())
            .or_insert_with(|| Room::new(room_id))
            .insert(peer);
    }

    /// Removes `peer_id` from `room_id`, deleting the room entry in the
    /// same critical section if that was its last peer (I5, §4.2).
    pub fn leave(&self, room_id: &RoomId, peer_id: &PeerId) {
        let mut rooms = self.rooms.write();
        if let Some(room) = rooms.get_mut(room_id) {
            room.remove(peer_id);
            if room.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    /// Peers currently in `room_id`, optionally excluding one.
    pub fn peers_in(&self, room_id: &RoomId, exclude: Option<PeerId>) -> Vec<Arc<PeerContext>> {
        self.rooms
            .read()
            .get(room_id)
            .map(|r| r.peers(exclude))
            .unwrap_or_default()
    }

    /// Every room currently tracked, for the Synchronizer's pass-1 walk.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> HashMap<RoomId, usize> {
        self.rooms
            .read()
            .iter()
            .map(|(id, room)| (id.clone(), room.len()))
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn peer_count(&self) -> usize {
        self.rooms.read().values().map(Room::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signalling::peer::{Renegotiate, SendFrame};
    use crate::test_support::{noop_media_session, silent_recipients};
    use sfu_proto::UserId;
    use std::sync::atomic::{AtomicBool, AtomicU64};

    async fn fixture_peer(room: RoomId, user: &str) -> Arc<PeerContext> {
        let (transport, renegotiate) = silent_recipients();
        Arc::new(PeerContext {
            id: PeerId::new(),
            user_id: UserId(user.into()),
            room,
            display_name: user.into(),
            transport,
            renegotiate,
            media: noop_media_session().await,
            attached: RwLock::new(Default::default()),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        })
    }

    #[actix_rt::test]
    async fn join_creates_room_and_leave_removes_it_when_empty() {
        let registry = RoomRegistry::new();
        let room_id = RoomId("r1".into());
        let peer = fixture_peer(room_id.clone(), "a").await;
        let peer_id = peer.id;

        registry.join(room_id.clone(), peer);
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.peers_in(&room_id, None).len(), 1);

        registry.leave(&room_id, &peer_id);
        assert_eq!(registry.room_count(), 0);
    }

    #[actix_rt::test]
    async fn peers_in_excludes_the_given_peer() {
        let registry = RoomRegistry::new();
        let room_id = RoomId("r1".into());
        let a = fixture_peer(room_id.clone(), "a").await;
        let b = fixture_peer(room_id.clone(), "b").await;
        let a_id = a.id;
        registry.join(room_id.clone(), a);
        registry.join(room_id.clone(), b);

        let others = registry.peers_in(&room_id, Some(a_id));
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].user_id.0, "b");
    }
}
