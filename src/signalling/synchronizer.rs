//! Synchronizer (C5): global reconciliation of every peer's subscription
//! set against its room's publish set.
//!
//! The pass lock is a `tokio::sync::Mutex` rather than `parking_lot`: a
//! pass performs `await`ed WebRTC operations (attach/detach a sink),
//! so the guard must be held across `.await` points. `parking_lot`'s
//! guards are explicitly not `Send`-safe for that; `tokio::sync::Mutex`
//! is the idiomatic choice whenever a critical section spans awaits, the
//! same way sibling voice servers hold `tokio::sync::RwLock` around
//! their connection state.

use std::collections::HashSet;
use std::sync::Arc;

use crate::conf;
use crate::signalling::forward_table::ForwardTable;
use crate::signalling::peer::Renegotiate;
use crate::signalling::room_registry::RoomRegistry;

pub struct Synchronizer {
    /// Ensures at most one reconciliation pass runs at a time; a caller
    /// that finds it held simply awaits its turn rather than being
    /// dropped, so no trigger is ever lost.
    lock: tokio::sync::Mutex<()>,
    conf: conf::Sync,
}

impl Synchronizer {
    pub fn new(conf: conf::Sync) -> Self {
        Self {
            lock: tokio::sync::Mutex::new(()),
            conf,
        }
    }

    /// Runs one reconciliation pass over every room.
    pub async fn run_pass(&self, registry: &RoomRegistry, sinks: &ForwardTable) {
        let _guard = self.lock.lock().await;

        // Step 1: drop peers whose signalling channel has already closed,
        // releasing the sinks they owned as a publisher.
        for room_id in registry.room_ids() {
            for peer in registry.peers_in(&room_id, None) {
                if peer.is_closed() {
                    registry.leave(&room_id, &peer.id);
                    sinks.remove_by_publisher(peer.id);
                }
            }
        }

        // Step 2: reconcile every surviving peer's attached-sink set
        // against its room's current publish set.
        for room_id in registry.room_ids() {
            for peer in registry.peers_in(&room_id, None) {
                if peer.is_closed() {
                    continue;
                }

                let desired: HashSet<_> = sinks
                    .sinks_for_room_excluding(&room_id, peer.id)
                    .iter()
                    .map(|s| s.id)
                    .collect();
                let attached = peer.attached.read().clone();

                let to_detach: Vec<_> = attached.difference(&desired).copied().collect();
                let to_attach: Vec<_> = desired.difference(&attached).copied().collect();
                if to_detach.is_empty() && to_attach.is_empty() {
                    continue;
                }

                for id in &to_detach {
                    if let Err(err) = peer.media.detach(id).await {
                        slog_scope::warn!("failed to detach sink from peer"; "error" => %err);
                    }
                    if let Some(sink) = sinks.get(id) {
                        sink.unsubscribe(&peer.id);
                    }
                }

                let mut attach_failed = false;
                for id in &to_attach {
                    let Some(sink) = sinks.get(id) else { continue };
                    let local = sink.subscribe(peer.id);
                    if self.attach_with_retry(&peer.media, *id, local).await.is_err() {
                        attach_failed = true;
                    }
                }

                {
                    let mut attached_mut = peer.attached.write();
                    for id in &to_detach {
                        attached_mut.remove(id);
                    }
                    for id in &to_attach {
                        attached_mut.insert(*id);
                    }
                }

                if attach_failed {
                    // Exhausted its own retry budget already; give up on
                    // this peer rather than leaving it half-reconciled.
                    peer.mark_closed();
                    continue;
                }

                // Ask the peer's own actor to build and write the fresh
                // offer; its mailbox serializes this against any other
                // frame destined for the same peer (I4).
                let _ = peer.renegotiate.do_send(Renegotiate);
            }
        }
    }

    /// Retries a single attach with exponential back-off, bounded by
    /// `conf.retry_max_attempts` (design default 10, base 20ms).
    async fn attach_with_retry(
        &self,
        media: &Arc<crate::media::session::MediaSession>,
        sink_id: crate::signalling::forward_table::SinkId,
        local: Arc<webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP>,
    ) -> Result<(), crate::error::TransientSyncError> {
        let mut delay = self.conf.retry_base_delay;
        for attempt in 0..self.conf.retry_max_attempts {
            match media.attach(sink_id, local.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt + 1 == self.conf.retry_max_attempts {
                        return Err(crate::error::TransientSyncError::OfferBuildFailed(e));
                    }
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        Err(crate::error::TransientSyncError::RetriesExhausted {
            attempts: self.conf.retry_max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signalling::peer::PeerContext;
    use crate::signalling::peer::PeerId;
    use crate::test_support::{noop_media_session, silent_recipients};
    use parking_lot::RwLock;
    use sfu_proto::{RoomId, UserId};
    use std::sync::atomic::{AtomicBool, AtomicU64};
    use std::time::Duration;

    fn test_conf() -> conf::Sync {
        conf::Sync {
            keyframe_interval: Duration::from_secs(3),
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    fn capability() -> webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability {
        webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability {
            mime_type: "audio/opus".into(),
            clock_rate: 48_000,
            channels: 2,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        }
    }

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
    async fn a_pass_attaches_every_other_publisher_s_sink_to_a_peer() {
        let registry = RoomRegistry::new();
        let sinks = ForwardTable::new();
        let room = RoomId("r1".into());

        let a = fixture_peer(room.clone(), "a").await;
        let b = fixture_peer(room.clone(), "b").await;
        registry.join(room.clone(), Arc::clone(&a));
        registry.join(room.clone(), Arc::clone(&b));

        // `a` publishes a track; only `b` should end up subscribed to it.
        sinks.register(a.id, room.clone(), "a-audio".into(), capability());

        let sync = Synchronizer::new(test_conf());
        sync.run_pass(&registry, &sinks).await;

        assert_eq!(b.attached.read().len(), 1);
        assert!(a.attached.read().is_empty());
    }

    #[actix_rt::test]
    async fn a_pass_drops_closed_peers_and_releases_their_sinks() {
        let registry = RoomRegistry::new();
        let sinks = ForwardTable::new();
        let room = RoomId("r1".into());

        let a = fixture_peer(room.clone(), "a").await;
        let b = fixture_peer(room.clone(), "b").await;
        registry.join(room.clone(), Arc::clone(&a));
        registry.join(room.clone(), Arc::clone(&b));
        sinks.register(a.id, room.clone(), "a-audio".into(), capability());

        a.mark_closed();

        let sync = Synchronizer::new(test_conf());
        sync.run_pass(&registry, &sinks).await;

        assert_eq!(registry.peers_in(&room, None).len(), 1);
        assert_eq!(sinks.sinks_for_room_excluding(&room, PeerId::new()).len(), 0);
    }
}
