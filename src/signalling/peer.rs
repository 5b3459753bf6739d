//! The per-peer session state machine (C4).
//!
//! `Peer<S>` pairs the context shared by every state with a zero-sized
//! marker for the current one; `PeerStateMachine` is the dispatching enum
//! that lets the rest of the system call shared accessors without
//! matching on the state first. This is the same shape `medea-macro`'s
//! own `enum_delegate` doc example uses for its typestate peer.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use actix::{Message, Recipient};
use parking_lot::RwLock;
use sfu_proto::{RoomId, UserId};
use uuid::Uuid;

use crate::media::session::MediaSession;
use crate::signalling::forward_table::SinkId;

/// Server-generated connection identity. Deliberately distinct from
/// [`UserId`]: two connections presenting the same `user_id` are two
/// independent peers (see the Synchronizer's open-question note).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
pub struct PeerId(Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

/// A frame the signalling transport should write to its peer, dispatched
/// through an `actix` `Recipient` so the sender doesn't need to know the
/// transport actor's concrete type. Delivery into the actor's mailbox is
/// what gives per-peer writes their total order (I4) without an explicit
/// lock: the mailbox is already a serialized, single-consumer queue.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendFrame(pub sfu_proto::ServerEvent);

/// Sent by the Synchronizer (C5) after it has already attached/detached
/// this peer's sinks, asking its actor to build a fresh offer describing
/// the new subscription set and write it out. Kept as a message (rather
/// than a direct call into the actor) so the state transition
/// `Steady -> Renegotiating` always happens on the peer's own task.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Renegotiate;

/// Sent by the media session's own ICE/DTLS connection-state callback
/// when the underlying `RTCPeerConnection` has failed or closed out from
/// under it, driving the `any -> Closing` transition described in §4.4.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Terminate;

/// Fields every state of [`Peer`] carries.
pub struct PeerContext {
    pub id: PeerId,
    pub user_id: UserId,
    pub room: RoomId,
    pub display_name: String,
    pub transport: Recipient<SendFrame>,
    pub renegotiate: Recipient<Renegotiate>,
    pub media: Arc<MediaSession>,
    /// Sinks currently attached to this peer's subscriber connection,
    /// tracked independently of the media session so the Synchronizer can
    /// diff against the desired set without awaiting into WebRTC state.
    pub attached: RwLock<std::collections::HashSet<SinkId>>,
    /// Set once the signalling channel's reader observes a close or error;
    /// consulted by the Synchronizer's pass-1 cleanup sweep (§4.5).
    pub closed: AtomicBool,
    /// Bumped on every offer sent; answers carry the generation they are
    /// replying to, so a stale answer arriving after a newer offer was
    /// already sent is detected and discarded (§4.5 ordering).
    pub generation: AtomicU64,
}

impl PeerContext {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Marker: token presented, not yet validated to completion.
pub struct Authenticating;
/// Marker: media session allocated, initial offer sent, awaiting answer.
pub struct Establishing;
/// Marker: an offer/answer round has completed; subscription set matches
/// the last offer sent.
pub struct Steady;
/// Marker: a fresh offer describing a changed subscription set is
/// outstanding.
pub struct Renegotiating;
/// Marker: teardown in progress — removed from its Room, sinks released.
pub struct Closing;
/// Marker: resources released, terminal state.
pub struct Closed;

/// One participant connection, parameterized by its current state.
pub struct Peer<S> {
    pub context: Arc<PeerContext>,
    state: S,
}

impl<S> Peer<S> {
    pub fn id(&self) -> PeerId {
        self.context.id
    }

    pub fn room(&self) -> &RoomId {
        &self.context.room
    }

    pub fn user_id(&self) -> &UserId {
        &self.context.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.context.display_name
    }

    pub fn context(&self) -> &Arc<PeerContext> {
        &self.context
    }
}

impl Peer<Authenticating> {
    pub fn new(context: Arc<PeerContext>) -> Self {
        Self {
            context,
            state: Authenticating,
        }
    }

    pub fn into_establishing(self) -> Peer<Establishing> {
        Peer {
            context: self.context,
            state: Establishing,
        }
    }
}

impl Peer<Establishing> {
    pub fn into_steady(self) -> Peer<Steady> {
        Peer {
            context: self.context,
            state: Steady,
        }
    }

    pub fn into_closing(self) -> Peer<Closing> {
        Peer {
            context: self.context,
            state: Closing,
        }
    }
}

impl Peer<Steady> {
    pub fn into_renegotiating(self) -> Peer<Renegotiating> {
        Peer {
            context: self.context,
            state: Renegotiating,
        }
    }

    pub fn into_closing(self) -> Peer<Closing> {
        Peer {
            context: self.context,
            state: Closing,
        }
    }
}

impl Peer<Renegotiating> {
    pub fn into_steady(self) -> Peer<Steady> {
        Peer {
            context: self.context,
            state: Steady,
        }
    }

    pub fn into_closing(self) -> Peer<Closing> {
        Peer {
            context: self.context,
            state: Closing,
        }
    }
}

impl Peer<Closing> {
    pub fn into_closed(self) -> Peer<Closed> {
        Peer {
            context: self.context,
            state: Closed,
        }
    }
}

/// Dispatching enum over every state a [`Peer`] can be in.
///
/// `#[enum_delegate]` generates the shared accessors below against
/// whichever variant is currently held, so callers outside this module
/// never need to match on the state themselves.
#[sfu_macro::enum_delegate(pub fn id(&self) -> PeerId)]
#[sfu_macro::enum_delegate(pub fn room(&self) -> &RoomId)]
#[sfu_macro::enum_delegate(pub fn user_id(&self) -> &UserId)]
#[sfu_macro::enum_delegate(pub fn display_name(&self) -> &str)]
#[sfu_macro::enum_delegate(pub fn context(&self) -> &Arc<PeerContext>)]
pub enum PeerStateMachine {
    Authenticating(Peer<Authenticating>),
    Establishing(Peer<Establishing>),
    Steady(Peer<Steady>),
    Renegotiating(Peer<Renegotiating>),
    Closing(Peer<Closing>),
    Closed(Peer<Closed>),
}

impl PeerStateMachine {
    pub fn is_steady(&self) -> bool {
        matches!(self, Self::Steady(_))
    }

    pub fn is_closing_or_closed(&self) -> bool {
        matches!(self, Self::Closing(_) | Self::Closed(_))
    }
}
