//! Error taxonomy for the SFU.
//!
//! Errors are scoped the way they propagate: an [`AuthError`] never
//! allocates state, a [`ProtocolError`]/[`MediaError`] is scoped to one
//! peer, a [`TransientSyncError`] is scoped to one Synchronizer pass, and
//! a [`FatalError`] aborts the process at startup.

use sfu_proto::FrameParseError;

/// Token missing, invalid, or expired. The upgrade is rejected before any
/// `Peer`, `Room`, or media session is created.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
    #[error("token expired")]
    Expired,
}

/// Malformed signalling frame or unknown event. Closes the offending
/// peer; no effect on the rest of the room.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON frame: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownFrame(#[from] FrameParseError),
}

/// ICE/DTLS/connection failure on a peer's media session. The peer
/// transitions to `CLOSING`; the Synchronizer re-converges the room.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),
    #[error("ICE connection failed")]
    IceFailed,
    #[error("no inbound track registered for sink")]
    NoInboundTrack,
}

/// Renegotiation failed to write or apply. Retried with exponential
/// back-off up to a bounded attempt count, then the affected peer
/// transitions to `CLOSING`.
#[derive(Debug, thiserror::Error)]
pub enum TransientSyncError {
    #[error("failed to build offer for peer: {0}")]
    OfferBuildFailed(#[source] MediaError),
    #[error("failed to write offer to peer: {0}")]
    WriteFailed(String),
    #[error("retry budget of {attempts} attempts exhausted")]
    RetriesExhausted { attempts: u32 },
}

/// Listener bind failure, missing configuration, or any other error that
/// makes it unsafe to continue starting up. The process aborts.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("logging initialization failed: {0}")]
    Logging(String),
    #[error("media engine initialization failed: {0}")]
    Media(#[from] MediaError),
}
