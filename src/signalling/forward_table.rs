//! Forward-track table (C3): server-owned output tracks that fan a
//! publisher's RTP out to every subscribing peer.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sfu_proto::RoomId;
use webrtc::rtp::packet::Packet as RtpPacket;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::{
    track_local_static_rtp::TrackLocalStaticRTP, TrackLocalWriter,
};

use crate::signalling::peer::PeerId;

/// Opaque, server-chosen identity for a [`ForwardSink`], chosen this way
/// specifically to avoid collisions between publishers (§4.3).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
pub struct SinkId(uuid::Uuid);

impl SinkId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

/// A publisher's inbound track, re-advertised to zero-or-more
/// subscribers. RTP is written verbatim: header fields are untouched and
/// lost packets are not recovered here (§4.3).
pub struct ForwardSink {
    pub id: SinkId,
    pub publisher: PeerId,
    pub room: RoomId,
    pub track_id: String,
    pub capability: RTCRtpCodecCapability,
    subscribers: RwLock<HashMap<PeerId, Arc<TrackLocalStaticRTP>>>,
}

impl ForwardSink {
    fn new(publisher: PeerId, room: RoomId, track_id: String, capability: RTCRtpCodecCapability) -> Self {
        Self {
            id: SinkId::new(),
            publisher,
            room,
            track_id,
            capability,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Creates (or returns the existing) local track a subscriber's media
    /// session should add to its `RTCPeerConnection`.
    pub fn subscribe(&self, subscriber: PeerId) -> Arc<TrackLocalStaticRTP> {
        if let Some(existing) = self.subscribers.read().get(&subscriber) {
            return existing.clone();
        }
        let local = Arc::new(TrackLocalStaticRTP::new(
            self.capability.clone(),
            self.track_id.clone(),
            format!("sfu-sink-{}", self.id),
        ));
        self.subscribers.write().insert(subscriber, local.clone());
        local
    }

    pub fn unsubscribe(&self, subscriber: &PeerId) {
        self.subscribers.write().remove(subscriber);
    }

    pub fn has_subscriber(&self, subscriber: &PeerId) -> bool {
        self.subscribers.read().contains_key(subscriber)
    }

    /// Writes one RTP packet, read verbatim off the publisher's inbound
    /// track, to every current subscriber's local track.
    pub async fn forward(&self, packet: &RtpPacket) {
        let subscribers: Vec<_> = self.subscribers.read().values().cloned().collect();
        for track in subscribers {
            let _ = track.write_rtp(packet).await;
        }
    }
}

/// C3: maps opaque `SinkId`s to the [`ForwardSink`]s they identify.
#[derive(Default)]
pub struct ForwardTable {
    sinks: RwLock<HashMap<SinkId, Arc<ForwardSink>>>,
}

impl ForwardTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly observed inbound track and returns its sink.
    pub fn register(
        &self,
        publisher: PeerId,
        room: RoomId,
        track_id: String,
        capability: RTCRtpCodecCapability,
    ) -> Arc<ForwardSink> {
        let sink = Arc::new(ForwardSink::new(publisher, room, track_id, capability));
        self.sinks.write().insert(sink.id, sink.clone());
        sink
    }

    pub fn get(&self, id: &SinkId) -> Option<Arc<ForwardSink>> {
        self.sinks.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    /// Removes a single sink, e.g. when its inbound track ends while the
    /// publisher's connection otherwise stays up (§4.3).
    pub fn remove(&self, id: &SinkId) {
        self.sinks.write().remove(id);
    }

    /// Removes every sink owned by `publisher`, e.g. when it leaves.
    /// Returns the removed sink ids.
    pub fn remove_by_publisher(&self, publisher: PeerId) -> Vec<SinkId> {
        let mut sinks = self.sinks.write();
        let to_remove: Vec<SinkId> = sinks
            .values()
            .filter(|s| s.publisher == publisher)
            .map(|s| s.id)
            .collect();
        for id in &to_remove {
            sinks.remove(id);
        }
        to_remove
    }

    /// The sinks a peer in `room` who is not `publisher` should subscribe
    /// to, i.e. `desired` in the Synchronizer's §4.5 step 2a.
    pub fn sinks_for_room_excluding(&self, room: &RoomId, publisher: PeerId) -> Vec<Arc<ForwardSink>> {
        self.sinks
            .read()
            .values()
            .filter(|s| &s.room == room && s.publisher != publisher)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability() -> RTCRtpCodecCapability {
        RTCRtpCodecCapability {
            mime_type: "audio/opus".into(),
            clock_rate: 48_000,
            channels: 2,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        }
    }

    #[test]
    fn register_and_exclude_publisher() {
        let table = ForwardTable::new();
        let room = RoomId("r1".into());
        let publisher = PeerId::new();
        let other = PeerId::new();
        table.register(publisher, room.clone(), "a1".into(), capability());

        let for_other = table.sinks_for_room_excluding(&room, other);
        assert_eq!(for_other.len(), 1);
        let for_publisher = table.sinks_for_room_excluding(&room, publisher);
        assert!(for_publisher.is_empty());
    }

    #[test]
    fn remove_by_publisher_drops_its_sinks_only() {
        let table = ForwardTable::new();
        let room = RoomId("r1".into());
        let a = PeerId::new();
        let b = PeerId::new();
        table.register(a, room.clone(), "a1".into(), capability());
        table.register(b, room.clone(), "b1".into(), capability());

        let removed = table.remove_by_publisher(a);
        assert_eq!(removed.len(), 1);
        assert_eq!(table.sinks_for_room_excluding(&room, PeerId::new()).len(), 1);
    }
}
