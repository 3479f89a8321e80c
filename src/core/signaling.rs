//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The messages we exchange over the signaling relay to establish a call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{CallMediaType, ConversationId, TransportId, UserId};

/// An SDP session description, as produced and consumed by the peer
/// connection. `kind` is `"offer"` or `"answer"` on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".to_string(),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "answer".to_string(),
            sdp: sdp.into(),
        }
    }
}

impl fmt::Debug for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // SDP bodies are long and carry addresses; keep them out of logs.
        write!(f, "SessionDescription({}, {} bytes)", self.kind, self.sdp.len())
    }
}

/// A single trickled ICE candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateData {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

/// Negotiation data emitted by a peer connection, to be wrapped into the
/// matching envelope and forwarded via the signaling client.
#[derive(Clone, Debug)]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidateData),
}

impl fmt::Display for SignalPayload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let display = match self {
            Self::Offer(_) => "Offer(...)",
            Self::Answer(_) => "Answer(...)",
            Self::Candidate(_) => "Candidate(...)",
        };
        write!(f, "({})", display)
    }
}

/// An enum representing the different types of signaling envelopes that can
/// be sent and received. Destination addressing travels inside the envelope
/// (`to_*` fields); the relay routes on those and stamps `from_transport_id`
/// on delivery.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// Registers the local `(user, conversation)` pair with the relay.
    /// Sent immediately after every successful (re)connect.
    #[serde(rename_all = "camelCase")]
    Register {
        user_id: UserId,
        conversation_id: ConversationId,
    },

    /// Caller -> relay: ring `to_user_id` with this offer.
    #[serde(rename_all = "camelCase")]
    CallUser {
        to_user_id: UserId,
        offer: SessionDescription,
        call_type: CallMediaType,
    },

    /// Relay -> caller: ack that routes the callee's transport id back.
    #[serde(rename_all = "camelCase")]
    CallInitiated { to_transport_id: TransportId },

    /// Relay -> callee: an offer is waiting.
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        from_transport_id: TransportId,
        offer: SessionDescription,
        call_type: CallMediaType,
    },

    /// Callee -> relay: answer for the caller at `to_transport_id`.
    #[serde(rename_all = "camelCase")]
    AnswerCall {
        to_transport_id: TransportId,
        answer: SessionDescription,
    },

    /// Relay -> caller: the callee answered.
    #[serde(rename_all = "camelCase")]
    CallAnswered {
        from_transport_id: TransportId,
        answer: SessionDescription,
    },

    /// Either direction: one trickled candidate.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_transport_id: Option<TransportId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_transport_id: Option<TransportId>,
        candidate: IceCandidateData,
    },

    /// Either direction: hang up.
    #[serde(rename_all = "camelCase")]
    CallEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_transport_id: Option<TransportId>,
    },

    /// Relay -> caller: the callee's transport is not registered.
    UserUnavailable,
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({})", self.summary())
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Envelope {
    fn summary(&self) -> String {
        match self {
            Self::Register { user_id, .. } => format!("Register({})", user_id),
            Self::CallUser {
                to_user_id,
                call_type,
                ..
            } => format!("CallUser({}, {:?}, ...)", to_user_id, call_type),
            Self::CallInitiated { .. } => "CallInitiated(...)".to_string(),
            Self::IncomingCall { call_type, .. } => {
                format!("IncomingCall({:?}, ...)", call_type)
            }
            Self::AnswerCall { .. } => "AnswerCall(...)".to_string(),
            Self::CallAnswered { .. } => "CallAnswered(...)".to_string(),
            Self::IceCandidate { .. } => "IceCandidate(...)".to_string(),
            Self::CallEnded { .. } => "CallEnded".to_string(),
            Self::UserUnavailable => "UserUnavailable".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_wire_shape() {
        let envelope = Envelope::Register {
            user_id: "u-1".to_string(),
            conversation_id: "c-9".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"type": "register", "userId": "u-1", "conversationId": "c-9"})
        );
    }

    #[test]
    fn incoming_call_wire_shape() {
        let value = json!({
            "type": "incoming-call",
            "fromTransportId": "t-42",
            "offer": {"type": "offer", "sdp": "v=0"},
            "callType": "video",
        });
        let envelope: Envelope = serde_json::from_value(value).unwrap();
        match envelope {
            Envelope::IncomingCall {
                from_transport_id,
                offer,
                call_type,
            } => {
                assert_eq!(from_transport_id, "t-42");
                assert_eq!(offer, SessionDescription::offer("v=0"));
                assert_eq!(call_type, CallMediaType::Video);
            }
            other => panic!("unexpected envelope: {}", other),
        }
    }

    #[test]
    fn ice_candidate_omits_absent_addressing() {
        let envelope = Envelope::IceCandidate {
            to_transport_id: Some("t-1".to_string()),
            from_transport_id: None,
            candidate: IceCandidateData {
                candidate: "candidate:0 1 UDP 1 192.0.2.1 5000 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            },
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "ice-candidate");
        assert_eq!(value["toTransportId"], "t-1");
        assert!(value.get("fromTransportId").is_none());
        assert_eq!(value["candidate"]["sdpMid"], "0");
        assert_eq!(value["candidate"]["sdpMLineIndex"], 0);
    }

    #[test]
    fn unit_variants_round_trip() {
        let envelope: Envelope = serde_json::from_str(r#"{"type":"user-unavailable"}"#).unwrap();
        assert!(matches!(envelope, Envelope::UserUnavailable));

        let envelope: Envelope = serde_json::from_str(r#"{"type":"call-ended"}"#).unwrap();
        assert!(matches!(
            envelope,
            Envelope::CallEnded {
                to_transport_id: None
            }
        ));
    }

    #[test]
    fn call_type_uses_voice_and_video() {
        assert_eq!(
            serde_json::to_value(CallMediaType::Voice).unwrap(),
            json!("voice")
        );
        assert_eq!(
            serde_json::to_value(CallMediaType::Video).unwrap(),
            json!("video")
        );
    }
}
