//! Per-peer signalling session (C4): the `actix` actor hosting one
//! participant's WebSocket, driving `PeerContext` through
//! AUTHENTICATING -> ESTABLISHING -> STEADY <-> RENEGOTIATING -> CLOSING.
//!
//! By the time a `WsSession` is constructed, the bearer token has
//! already been verified by `api::client::upgrade`: an invalid token
//! never gets this far, so no `Peer`, `Room`, or `MediaSession` is ever
//! allocated for it (§8). Building the `MediaSession` itself is async,
//! so it happens in `started()`'s continuation rather than in `new`.

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Instant;

use actix::{
    Actor, ActorContext, ActorFutureExt, Addr, AsyncContext, Handler, Running, StreamHandler,
    WrapFuture,
};
use actix_web_actors::ws;
use chrono::Utc;
use parking_lot::RwLock;
use sfu_proto::{
    ClientEvent, ClientEventHandler, CloseDescription, CloseReason, Frame, IceCandidateInit,
    RoomId, RpcSettings, RpcSettingsEnvelope, ServerEvent, UserId,
};
use slog_scope::{error, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

use crate::auth::Claims;
use crate::media;
use crate::media::session::MediaSession;
use crate::sfu::Sfu;
use crate::signalling::peer::{
    Peer, PeerContext, PeerId, PeerStateMachine, Renegotiate, SendFrame, Terminate,
};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// One participant's WebSocket connection.
///
/// The shared state a `Peer` needs (`transport`/`renegotiate` recipients,
/// the media session, the attached-sink set) lives in `PeerContext`; this
/// actor is the task that drives it in response to I/O. Its mailbox
/// being a serialized, single-consumer queue is what gives per-peer
/// writes their total order (I4) without an explicit lock. `peer` itself
/// holds the dispatching `PeerStateMachine`, so the AUTHENTICATING ->
/// ESTABLISHING -> STEADY <-> RENEGOTIATING -> CLOSING transitions are
/// driven here rather than left implicit.
pub struct WsSession {
    sfu: Arc<Sfu>,
    claims: Claims,
    hb: Instant,
    /// Set once the media session has been built and the peer has
    /// joined its Room (AUTHENTICATING -> ESTABLISHING).
    peer: Option<PeerStateMachine>,
}

impl WsSession {
    pub fn new(sfu: Arc<Sfu>, claims: Claims) -> Self {
        Self {
            sfu,
            claims,
            hb: Instant::now(),
            peer: None,
        }
    }

    fn peer_context(&self) -> Option<&Arc<PeerContext>> {
        self.peer.as_ref().map(PeerStateMachine::context)
    }

    fn send_event(&self, ctx: &mut ws::WebsocketContext<Self>, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(text) => ctx.text(text),
            Err(err) => error!("failed to serialize outgoing frame"; "error" => %err),
        }
    }

    fn close_with(&mut self, ctx: &mut ws::WebsocketContext<Self>, reason: CloseReason) {
        let description = serde_json::to_string(&CloseDescription::new(reason)).unwrap_or_default();
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Normal,
            description: Some(description),
        }));
        ctx.stop();
    }

    /// Advances `Establishing`/`Renegotiating` to `Steady` once an answer
    /// has been applied. A no-op for any other state (e.g. a stray
    /// answer arriving after teardown already took `peer`).
    fn advance_to_steady(&mut self) {
        self.peer = self.peer.take().map(|sm| match sm {
            PeerStateMachine::Establishing(p) => PeerStateMachine::Steady(p.into_steady()),
            PeerStateMachine::Renegotiating(p) => PeerStateMachine::Steady(p.into_steady()),
            other => other,
        });
    }

    /// Advances `Steady` to `Renegotiating` before a fresh offer is sent.
    fn advance_to_renegotiating(&mut self) {
        self.peer = self.peer.take().map(|sm| match sm {
            PeerStateMachine::Steady(p) => PeerStateMachine::Renegotiating(p.into_renegotiating()),
            other => other,
        });
    }

    /// Drives whatever state `peer` is currently in through `Closing` to
    /// `Closed`. `Authenticating`/`Closing`/`Closed` are left as-is: the
    /// first never appears in a connected `WsSession` (the context does
    /// not exist until `establish`), the latter two are already there.
    fn advance_to_closed(sm: PeerStateMachine) {
        match sm {
            PeerStateMachine::Establishing(p) => {
                p.into_closing().into_closed();
            }
            PeerStateMachine::Steady(p) => {
                p.into_closing().into_closed();
            }
            PeerStateMachine::Renegotiating(p) => {
                p.into_closing().into_closed();
            }
            PeerStateMachine::Authenticating(_)
            | PeerStateMachine::Closing(_)
            | PeerStateMachine::Closed(_) => {}
        }
    }

    /// Releases everything this peer owns. Idempotent: `stopping()` and an
    /// explicit protocol-error close may both call this.
    fn teardown(&mut self) {
        if let Some(sm) = self.peer.take() {
            let context = Arc::clone(sm.context());
            if context.is_closed() {
                return;
            }
            context.mark_closed();
            self.sfu.registry.leave(&context.room, &context.id);
            self.sfu.sinks.remove_by_publisher(context.id);
            self.sfu.request_sync();
            Self::advance_to_closed(sm);
        }
    }

    /// Builds this peer's `PeerContext`, joins its Room, wires the media
    /// session's callbacks, and sends the `RpcSettings` handshake frame
    /// followed by the initial `offer` (AUTH -> EST, §4.4).
    fn establish(&mut self, media: Arc<MediaSession>, ctx: &mut ws::WebsocketContext<Self>) {
        let addr = ctx.address();
        let room = RoomId(self.claims.room.clone());
        let context = Arc::new(PeerContext {
            id: PeerId::new(),
            user_id: UserId(self.claims.user_id.clone()),
            room: room.clone(),
            display_name: self
                .claims
                .email
                .clone()
                .unwrap_or_else(|| self.claims.user_id.clone()),
            transport: addr.clone().recipient(),
            renegotiate: addr.clone().recipient(),
            media,
            attached: RwLock::new(Default::default()),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        });

        self.register_media_callbacks(&context, &addr);
        self.sfu.registry.join(room, Arc::clone(&context));
        self.peer = Some(PeerStateMachine::Establishing(
            Peer::new(context).into_establishing(),
        ));

        let settings = RpcSettings {
            idle_timeout_ms: self.sfu.conf.rpc.idle_timeout.as_millis() as u64,
            ping_interval_ms: self.sfu.conf.rpc.ping_interval.as_millis() as u64,
        };
        match serde_json::to_string(&RpcSettingsEnvelope(&settings)) {
            Ok(text) => ctx.text(text),
            Err(err) => error!("failed to serialize rpc_settings"; "error" => %err),
        }

        self.send_offer(ctx);
        self.sfu.request_sync();
    }

    /// Wires the media session's ICE-candidate, connection-state, and
    /// inbound-track callbacks. Candidates are pushed to the client as
    /// they are gathered (§4.4); a newly observed inbound track is
    /// registered with the forward-track table and its RTP is read into
    /// the sink until the track ends, at which point the sink is
    /// released too (§4.3); an ICE/DTLS failure tears the peer down
    /// (§4.4's `any -> Closing`).
    fn register_media_callbacks(&self, context: &Arc<PeerContext>, addr: &Addr<Self>) {
        let transport = addr.clone();
        context.media.on_ice_candidate(move |candidate| {
            if let Ok(init) = candidate.to_json() {
                transport.do_send(SendFrame(ServerEvent::Candidate(IceCandidateInit {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                })));
            }
        });

        let terminate = addr.clone();
        context.media.on_connection_state_change(move |state| {
            if matches!(
                state,
                RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Closed
            ) {
                terminate.do_send(Terminate);
            }
        });

        let sfu = Arc::clone(&self.sfu);
        let publisher = context.id;
        let room = context.room.clone();
        let media = Arc::clone(&context.media);
        context
            .media
            .peer_connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let sfu = Arc::clone(&sfu);
                let room = room.clone();
                let media = Arc::clone(&media);
                Box::pin(async move {
                    media.record_inbound(Arc::clone(&track));
                    let capability = track.codec().capability;
                    let sink = sfu
                        .sinks
                        .register(publisher, room, track.id(), capability);
                    let sink_id = sink.id;
                    tokio::spawn(async move {
                        loop {
                            match track.read_rtp().await {
                                Ok((packet, _attrs)) => sink.forward(&packet).await,
                                Err(_) => break,
                            }
                        }
                        // The inbound track ended on its own (e.g. the
                        // publisher disabled it) without the connection
                        // closing; release the sink rather than leaving
                        // it forwarding nothing forever.
                        sfu.sinks.remove(&sink_id);
                        sfu.request_sync();
                    });
                    sfu.request_sync();
                })
            }));
    }

    /// Builds a fresh offer off the peer's current media session state
    /// and writes it out. Used both for the initial EST offer and for
    /// every Synchronizer-driven renegotiation (STEADY -> RENEG).
    fn send_offer(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let peer = match self.peer_context() {
            Some(p) => Arc::clone(p),
            None => return,
        };
        let addr = ctx.address();
        actix::spawn(async move {
            match peer.media.create_offer().await {
                Ok(description) => {
                    peer.next_generation();
                    addr.do_send(SendFrame(ServerEvent::Offer {
                        sdp: description.sdp,
                    }));
                }
                Err(err) => error!("failed to build offer for peer"; "error" => %err),
            }
        });
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("malformed signalling frame, closing"; "error" => %err);
                self.close_with(ctx, CloseReason::Rejected);
                return;
            }
        };

        let event = match ClientEvent::try_from(frame) {
            Ok(event) => event,
            Err(err) => {
                warn!("unrecognized signalling event, closing"; "error" => %err);
                self.close_with(ctx, CloseReason::Rejected);
                return;
            }
        };

        event.dispatch_with(&mut Dispatch { session: self, ctx });
    }

    fn handle_answer(&mut self, sdp: String) {
        let peer = match self.peer_context() {
            Some(p) => Arc::clone(p),
            None => return,
        };
        actix::spawn(async move {
            if let Err(err) = peer.media.apply_answer(sdp).await {
                error!("failed to apply answer"; "error" => %err);
            }
        });
        self.advance_to_steady();
    }

    fn handle_candidate(&mut self, candidate: IceCandidateInit) {
        let peer = match self.peer_context() {
            Some(p) => Arc::clone(p),
            None => return,
        };
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            ..Default::default()
        };
        actix::spawn(async move {
            if let Err(err) = peer.media.add_ice_candidate(init).await {
                warn!("failed to add ice candidate"; "error" => %err);
            }
        });
    }

    /// Broadcasts to every other peer in the same room, and only that
    /// room (§4.4); stamped with the sender's display name and a
    /// server-side RFC 3339 UTC timestamp.
    fn handle_chat(&mut self, text: String) {
        let peer = match self.peer_context() {
            Some(p) => p,
            None => return,
        };
        let event = ServerEvent::Chat {
            text,
            from: peer.display_name.clone(),
            time: Utc::now().to_rfc3339(),
        };
        for other in self.sfu.registry.peers_in(&peer.room, Some(peer.id)) {
            let _ = other.transport.do_send(SendFrame(event.clone()));
        }
    }
}

/// Adapts `(&mut WsSession, &mut ws::WebsocketContext<WsSession>)` to
/// `sfu_proto`'s generated `ClientEventHandler`, since the actor's
/// context lives outside `self` in `actix`.
struct Dispatch<'a> {
    session: &'a mut WsSession,
    ctx: &'a mut ws::WebsocketContext<WsSession>,
}

impl ClientEventHandler for Dispatch<'_> {
    fn on_answer(&mut self, sdp: String) {
        self.session.handle_answer(sdp);
    }

    fn on_candidate(&mut self, data: IceCandidateInit) {
        self.session.handle_candidate(data);
    }

    fn on_chat(&mut self, text: String) {
        self.session.handle_chat(text);
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let idle_timeout = self.sfu.conf.rpc.idle_timeout;
        let ping_interval = self.sfu.conf.rpc.ping_interval;
        ctx.run_interval(ping_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > idle_timeout {
                warn!("peer missed its pong deadline, evicting"; "user_id" => act.claims.user_id.clone());
                act.close_with(ctx, CloseReason::Idle);
                return;
            }
            ctx.ping(b"");
        });

        let api = Arc::clone(&self.sfu.media_api);
        let config = media::rtc_config(&self.sfu.conf.server.stun_server);

        ctx.wait(
            async move { MediaSession::new(&api, config).await }
                .into_actor(self)
                .map(|media, act, ctx| match media {
                    Ok(media) => act.establish(media, ctx),
                    Err(err) => {
                        error!("failed to allocate media session"; "error" => %err);
                        act.close_with(ctx, CloseReason::InternalError);
                    }
                }),
        );
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        self.teardown();
        Running::Stop
    }
}

impl Handler<SendFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: SendFrame, ctx: &mut Self::Context) {
        self.send_event(ctx, &msg.0);
    }
}

impl Handler<Renegotiate> for WsSession {
    type Result = ();

    fn handle(&mut self, _msg: Renegotiate, ctx: &mut Self::Context) {
        self.advance_to_renegotiating();
        self.send_offer(ctx);
    }
}

impl Handler<Terminate> for WsSession {
    type Result = ();

    fn handle(&mut self, _msg: Terminate, ctx: &mut Self::Context) {
        self.close_with(ctx, CloseReason::InternalError);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                warn!("websocket protocol error, closing"; "error" => %err);
                ctx.stop();
                return;
            }
        };

        match msg {
            ws::Message::Ping(bytes) => {
                self.hb = Instant::now();
                ctx.pong(&bytes);
            }
            ws::Message::Pong(_) => {
                self.hb = Instant::now();
            }
            ws::Message::Text(text) => self.handle_text(&text, ctx),
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Binary(_) | ws::Message::Continuation(_) | ws::Message::Nop => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::Conf;
    use crate::sfu::Sfu;
    use crate::test_support::{noop_media_session, recording_recipient};
    use sfu_proto::UserId;
    use std::sync::atomic::{AtomicBool, AtomicU64};

    fn claims(room: &str, user: &str) -> Claims {
        Claims {
            user_id: user.into(),
            room: room.into(),
            email: None,
            user_type: None,
            exp: u64::MAX,
        }
    }

    async fn fixture_context(
        sfu: &Arc<Sfu>,
        room: &str,
        user: &str,
    ) -> (
        Arc<PeerContext>,
        Arc<std::sync::Mutex<Vec<ServerEvent>>>,
    ) {
        let (transport, sent) = recording_recipient();
        let (_, renegotiate) = crate::test_support::silent_recipients();
        let context = Arc::new(PeerContext {
            id: PeerId::new(),
            user_id: UserId(user.into()),
            room: RoomId(room.into()),
            display_name: user.into(),
            transport,
            renegotiate,
            media: noop_media_session().await,
            attached: RwLock::new(Default::default()),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        });
        sfu.registry.join(context.room.clone(), Arc::clone(&context));
        (context, sent)
    }

    async fn fixture_sfu() -> Arc<Sfu> {
        Sfu::new(Conf::load().expect("defaults alone must be sufficient"))
            .expect("media api must build")
    }

    #[actix_rt::test]
    async fn chat_is_relayed_only_within_the_sender_s_room_and_excludes_the_sender() {
        let sfu = fixture_sfu().await;
        let (alice, alice_sent) = fixture_context(&sfu, "room-1", "alice").await;
        let (_bob, bob_sent) = fixture_context(&sfu, "room-1", "bob").await;
        let (_carol, carol_sent) = fixture_context(&sfu, "room-2", "carol").await;

        let mut session = WsSession::new(Arc::clone(&sfu), claims("room-1", "alice"));
        session.peer = Some(PeerStateMachine::Steady(
            Peer::new(Arc::clone(&alice)).into_establishing().into_steady(),
        ));

        session.handle_chat("hello".into());

        assert!(alice_sent.lock().unwrap().is_empty());
        assert_eq!(bob_sent.lock().unwrap().len(), 1);
        assert!(carol_sent.lock().unwrap().is_empty());

        match &bob_sent.lock().unwrap()[0] {
            ServerEvent::Chat { text, from, .. } => {
                assert_eq!(text, "hello");
                assert_eq!(from, "alice");
            }
            other => panic!("expected a Chat event, got {other:?}"),
        }
    }

    #[actix_rt::test]
    async fn teardown_leaves_the_room_releases_sinks_and_is_idempotent() {
        let sfu = fixture_sfu().await;
        let (peer, _sent) = fixture_context(&sfu, "room-1", "alice").await;
        let peer_id = peer.id;

        let mut session = WsSession::new(Arc::clone(&sfu), claims("room-1", "alice"));
        session.peer = Some(PeerStateMachine::Establishing(
            Peer::new(Arc::clone(&peer)).into_establishing(),
        ));

        assert_eq!(sfu.registry.peer_count(), 1);

        session.teardown();
        assert!(peer.is_closed());
        assert_eq!(sfu.registry.peer_count(), 0);
        assert_eq!(sfu.registry.room_count(), 0);

        // A second teardown (e.g. `stopping()` firing after an explicit
        // protocol-error close already tore the peer down) must be a no-op.
        session.peer = Some(PeerStateMachine::Establishing(
            Peer::new(Arc::clone(&peer)).into_establishing(),
        ));
        session.teardown();
        let _ = peer_id;
    }
}
