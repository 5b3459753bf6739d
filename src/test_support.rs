//! Test-only fixtures shared across the `signalling`/`media` unit tests.

#![cfg(test)]

use std::sync::{Arc, Mutex};

use actix::{Actor, Context, Handler, Recipient};
use webrtc::api::APIBuilder;
use webrtc::peer_connection::configuration::RTCConfiguration;

use crate::media::session::MediaSession;
use crate::signalling::peer::{Renegotiate, SendFrame};

struct SilentActor;

impl Actor for SilentActor {
    type Context = Context<Self>;
}

impl Handler<SendFrame> for SilentActor {
    type Result = ();
    fn handle(&mut self, _msg: SendFrame, _ctx: &mut Self::Context) {}
}

impl Handler<Renegotiate> for SilentActor {
    type Result = ();
    fn handle(&mut self, _msg: Renegotiate, _ctx: &mut Self::Context) {}
}

/// Recipients that silently discard everything sent to them, standing in
/// for a signalling transport in tests that only exercise registry/table
/// bookkeeping.
pub fn silent_recipients() -> (Recipient<SendFrame>, Recipient<Renegotiate>) {
    let addr = SilentActor.start();
    (addr.clone().recipient(), addr.recipient())
}

struct RecordingActor {
    sent: Arc<Mutex<Vec<sfu_proto::ServerEvent>>>,
}

impl Actor for RecordingActor {
    type Context = Context<Self>;
}

impl Handler<SendFrame> for RecordingActor {
    type Result = ();
    fn handle(&mut self, msg: SendFrame, _ctx: &mut Self::Context) {
        self.sent.lock().unwrap().push(msg.0);
    }
}

impl Handler<Renegotiate> for RecordingActor {
    type Result = ();
    fn handle(&mut self, _msg: Renegotiate, _ctx: &mut Self::Context) {}
}

/// A `SendFrame` recipient that appends every event it receives to a
/// shared buffer, so a test can assert what a peer's transport actually
/// observed (e.g. chat scoping, §4.4).
pub fn recording_recipient() -> (Recipient<SendFrame>, Arc<Mutex<Vec<sfu_proto::ServerEvent>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let addr = RecordingActor {
        sent: Arc::clone(&sent),
    }
    .start();
    (addr.recipient(), sent)
}

/// A real, loopback-only `RTCPeerConnection` wrapped in a `MediaSession`,
/// good enough to exercise attach/detach bookkeeping without any network
/// I/O, the same way `webrtc-rs`-based SFU test suites build fixtures.
pub async fn noop_media_session() -> Arc<MediaSession> {
    let api = APIBuilder::new().build();
    MediaSession::new(&api, RTCConfiguration::default())
        .await
        .expect("in-process peer connection must construct")
}
