//! A peer's media session: one `RTCPeerConnection`, its inbound tracks,
//! and the local tracks it has been handed to receive other peers'
//! forwarded media. Mirrors the shape of a voice-server `Peer` wrapper,
//! generalized from audio-only to audio+video.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use webrtc::api::API;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::{track_local_static_rtp::TrackLocalStaticRTP, TrackLocal};
use webrtc::track::track_remote::TrackRemote;

use crate::error::MediaError;
use crate::signalling::forward_table::SinkId;

/// Wraps one participant's `RTCPeerConnection`. Created once a token is
/// validated (AUTH -> EST), closed on CLOSING -> CLOSED.
pub struct MediaSession {
    pub peer_connection: Arc<RTCPeerConnection>,
    /// Inbound tracks this peer is publishing, keyed by their WebRTC
    /// track id. Populated by the `on_track` callback registered in
    /// [`MediaSession::new`].
    inbound: RwLock<HashMap<String, Arc<TrackRemote>>>,
    /// Local tracks currently attached to this connection as a
    /// subscriber, keyed by the `SinkId` they forward, alongside the
    /// `RTCRtpSender` `add_track` returned so `detach` can actually
    /// remove them from the `RTCPeerConnection`.
    outbound: RwLock<HashMap<SinkId, (Arc<TrackLocalStaticRTP>, Arc<RTCRtpSender>)>>,
}

impl MediaSession {
    pub async fn new(api: &API, config: RTCConfiguration) -> Result<Arc<Self>, MediaError> {
        let peer_connection = Arc::new(api.new_peer_connection(config).await?);

        // Recvonly transceivers for both kinds so the initial offer's
        // m-lines are ready to accept a publisher's audio and/or video
        // without a second renegotiation round purely to add them.
        peer_connection
            .add_transceiver_from_kind(
                RTPCodecType::Audio,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;
        peer_connection
            .add_transceiver_from_kind(
                RTPCodecType::Video,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;

        Ok(Arc::new(Self {
            peer_connection,
            inbound: RwLock::new(HashMap::new()),
            outbound: RwLock::new(HashMap::new()),
        }))
    }

    pub fn record_inbound(&self, track: Arc<TrackRemote>) {
        self.inbound.write().insert(track.id(), track);
    }

    pub fn inbound_tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.inbound.read().values().cloned().collect()
    }

    /// Attaches a sink's local track to this subscriber connection.
    /// Idempotent: attaching an already-attached sink is a no-op.
    pub async fn attach(&self, sink_id: SinkId, track: Arc<TrackLocalStaticRTP>) -> Result<(), MediaError> {
        if self.outbound.read().contains_key(&sink_id) {
            return Ok(());
        }
        let sender = self
            .peer_connection
            .add_track(track.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        self.outbound.write().insert(sink_id, (track, sender));
        Ok(())
    }

    /// Detaches a previously attached sink, removing its `RTCRtpSender`
    /// from the `RTCPeerConnection` so the next offer no longer
    /// describes it. Takes effect on the client after that offer's
    /// renegotiation round completes.
    pub async fn detach(&self, sink_id: &SinkId) -> Result<(), MediaError> {
        let removed = self.outbound.write().remove(sink_id);
        if let Some((_, sender)) = removed {
            self.peer_connection.remove_track(&sender).await?;
        }
        Ok(())
    }

    pub fn attached_sinks(&self) -> std::collections::HashSet<SinkId> {
        self.outbound.read().keys().copied().collect()
    }

    pub async fn create_offer(&self) -> Result<RTCSessionDescription, MediaError> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer)
    }

    pub async fn apply_answer(&self, sdp: String) -> Result<(), MediaError> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.peer_connection.set_remote_description(answer).await?;
        Ok(())
    }

    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<(), MediaError> {
        self.peer_connection.add_ice_candidate(candidate).await?;
        Ok(())
    }

    /// Registers a callback invoked with every locally gathered ICE
    /// candidate (§4.4: "locally gathered candidates are pushed to the
    /// client as they emerge").
    pub fn on_ice_candidate<F>(&self, mut f: F)
    where
        F: FnMut(RTCIceCandidate) + Send + 'static,
    {
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate| {
                if let Some(c) = candidate {
                    f(c);
                }
                Box::pin(async {})
            }));
    }

    /// Registers a callback invoked on every ICE/DTLS connection state
    /// change, so a caller can drive the peer's `any -> Closing`
    /// transition when the connection fails out from under it (§4.4,
    /// §7's `MediaError`).
    pub fn on_connection_state_change<F>(&self, mut f: F)
    where
        F: FnMut(RTCPeerConnectionState) + Send + 'static,
    {
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |state| {
                f(state);
                Box::pin(async {})
            }));
    }

    /// Issues a Picture Loss Indication for every inbound video track,
    /// used both by the C6 ticker and by on-demand keyframe requests.
    pub async fn request_keyframes(&self) {
        for track in self.inbound_tracks() {
            if track.kind() != RTPCodecType::Video {
                continue;
            }
            let pli = PictureLossIndication {
                sender_ssrc: 0,
                media_ssrc: track.ssrc(),
            };
            let _ = self.peer_connection.write_rtcp(&[Box::new(pli)]).await;
        }
    }

    pub async fn close(&self) -> Result<(), MediaError> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
