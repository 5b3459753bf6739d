//! Wire protocol types exchanged on the SFU's signalling WebSocket.
//!
//! A connection speaks a tiny JSON envelope: every frame has an `event`
//! name and a `data` payload (itself frequently JSON, carried as a
//! string). [`ClientEvent`] and [`ServerEvent`] are the typed views of
//! that envelope in each direction; they are intentionally not the same
//! type, since server-emitted `chat` frames carry two fields ([`Frame`]
//! does not) that client frames never do.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::private_intra_doc_links)]
#![forbid(non_ascii_idents, unsafe_code)]

use derive_more::{Constructor, Display};
use serde::{de::Error as _, ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use sfu_macro::dispatchable;

/// Room identifier, as carried by the auth token's `room` claim.
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct RoomId(pub String);

/// User identifier, as carried by the auth token's `user_id` claim.
///
/// Never used as a peer-identity key: two connections presenting the
/// same `UserId` are two independent peers (see the Synchronizer's
/// design notes on this point).
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Raw two-field envelope every client-originated frame has.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

/// An ICE candidate, carried JSON-encoded inside a [`Frame`]'s `data`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

/// Error parsing a raw [`Frame`] into a [`ClientEvent`].
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum FrameParseError {
    #[display(fmt = "unknown event kind `{}`", _0)]
    UnknownEvent(String),
    #[display(fmt = "malformed `data` payload for event `{}`: {}", event, reason)]
    MalformedData { event: String, reason: String },
}

impl std::error::Error for FrameParseError {}

/// Events a client may send to the server.
#[dispatchable]
#[derive(Clone, Debug)]
pub enum ClientEvent {
    /// SDP answer in response to a server `offer`.
    Answer { sdp: String },
    /// Trickled ICE candidate.
    Candidate(IceCandidateInit),
    /// Chat message to be broadcast to the rest of the room.
    Chat { text: String },
}

impl TryFrom<Frame> for ClientEvent {
    type Error = FrameParseError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        match frame.event.as_str() {
            "answer" => Ok(Self::Answer { sdp: frame.data }),
            "candidate" => {
                let candidate = serde_json::from_str(&frame.data).map_err(|e| {
                    FrameParseError::MalformedData {
                        event: frame.event.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Self::Candidate(candidate))
            }
            "chat" => Ok(Self::Chat { text: frame.data }),
            other => Err(FrameParseError::UnknownEvent(other.to_owned())),
        }
    }
}

/// Events the server may send to a client.
#[derive(Clone, Debug)]
pub enum ServerEvent {
    /// SDP offer describing the peer's current subscription set.
    Offer { sdp: String },
    /// Trickled ICE candidate gathered by the server's media session.
    Candidate(IceCandidateInit),
    /// Chat message relayed from another peer in the same room.
    Chat {
        text: String,
        from: String,
        time: String,
    },
}

impl Serialize for ServerEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Offer { sdp } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("event", "offer")?;
                map.serialize_entry("data", sdp)?;
                map.end()
            }
            Self::Candidate(candidate) => {
                let data = serde_json::to_string(candidate).map_err(S::Error::custom)?;
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("event", "candidate")?;
                map.serialize_entry("data", &data)?;
                map.end()
            }
            Self::Chat { text, from, time } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("event", "chat")?;
                map.serialize_entry("data", text)?;
                map.serialize_entry("from", from)?;
                map.serialize_entry("time", time)?;
                map.end()
            }
        }
    }
}

/// Liveness parameters pushed to the client right after the handshake
/// succeeds, so it can arm its own timers against the server's actual
/// configuration instead of an assumed default.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RpcSettings {
    /// Pong-wait deadline, in milliseconds.
    pub idle_timeout_ms: u64,
    /// Ping interval, in milliseconds.
    pub ping_interval_ms: u64,
}

impl Serialize for RpcSettingsEnvelope<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = serde_json::to_string(self.0).map_err(S::Error::custom)?;
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("event", "rpc_settings")?;
        map.serialize_entry("data", &data)?;
        map.end()
    }
}

/// Wraps [`RpcSettings`] so it serializes as an `{"event": "rpc_settings",
/// "data": "..."}` frame alongside [`ServerEvent`], without folding an
/// internal handshake message into the public event enum.
pub struct RpcSettingsEnvelope<'a>(pub &'a RpcSettings);

/// Reason a signalling connection was closed, carried in the WebSocket
/// close frame's reason text as `{"reason": "<variant>"}`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CloseReason {
    /// Normal, client-initiated disconnect.
    Finished,
    /// Connection dropped to allow the client to reconnect.
    Reconnected,
    /// Evicted by the keepalive ticker after missing pongs.
    Idle,
    /// Auth or protocol violation; the client is not welcome back as-is.
    Rejected,
    /// Unexpected server-side failure.
    InternalError,
    /// Replaced by a newer connection for the same peer slot.
    Evicted,
}

/// Typed close description sent in the WebSocket close frame.
#[derive(Clone, Copy, Constructor, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CloseDescription {
    pub reason: CloseReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_answer_frame() {
        let frame = Frame {
            event: "answer".into(),
            data: "v=0...".into(),
        };
        let event = ClientEvent::try_from(frame).unwrap();
        assert!(matches!(event, ClientEvent::Answer { sdp } if sdp == "v=0..."));
    }

    #[test]
    fn parses_candidate_frame() {
        let candidate = IceCandidateInit {
            candidate: "candidate:1 1 UDP 1 0.0.0.0 1 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        };
        let frame = Frame {
            event: "candidate".into(),
            data: serde_json::to_string(&candidate).unwrap(),
        };
        let event = ClientEvent::try_from(frame).unwrap();
        match event {
            ClientEvent::Candidate(c) => assert_eq!(c, candidate),
            _ => panic!("expected Candidate"),
        }
    }

    #[test]
    fn rejects_unknown_event() {
        let frame = Frame {
            event: "bogus".into(),
            data: String::new(),
        };
        let err = ClientEvent::try_from(frame).unwrap_err();
        assert_eq!(err, FrameParseError::UnknownEvent("bogus".into()));
    }

    #[test]
    fn serializes_offer_as_two_field_frame() {
        let event = ServerEvent::Offer { sdp: "v=0...".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"event": "offer", "data": "v=0..."}));
    }

    #[test]
    fn serializes_chat_with_from_and_time() {
        let event = ServerEvent::Chat {
            text: "hi".into(),
            from: "a".into(),
            time: "2026-07-27T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "chat",
                "data": "hi",
                "from": "a",
                "time": "2026-07-27T00:00:00Z",
            })
        );
    }

    #[test]
    fn rpc_settings_envelope_nests_as_json_string() {
        let settings = RpcSettings {
            idle_timeout_ms: 30_000,
            ping_interval_ms: 15_000,
        };
        let json = serde_json::to_value(RpcSettingsEnvelope(&settings)).unwrap();
        assert_eq!(json["event"], "rpc_settings");
        let data: RpcSettings = serde_json::from_str(json["data"].as_str().unwrap()).unwrap();
        assert_eq!(data.idle_timeout_ms, 30_000);
        assert_eq!(data.ping_interval_ms, 15_000);
    }
}
