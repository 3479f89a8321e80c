//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The one-and-only call session, owned by the call manager and mutated
//! exclusively through its verbs and event handlers.

use std::fmt;

use crate::common::{
    CallDirection, CallMediaType, CallState, CallStateSnapshot, ConversationId, TransportId,
    UserId,
};
use crate::core::platform::Platform;
use crate::core::signaling::{IceCandidateData, SessionDescription};

/// All mutable state for the current call. A session is "created" by
/// `begin_outgoing`/`begin_incoming` and "destroyed" by `reset`; the struct
/// itself lives for the lifetime of the manager and is reused across calls.
///
/// `epoch` increments on every begin and every reset. Asynchronous
/// completions capture the epoch they were started under and are discarded
/// if it no longer matches, which is what keeps a late media stream or peer
/// event from leaking into the next call.
pub struct CallSession<T>
where
    T: Platform,
{
    pub local_user_id: UserId,
    pub conversation_id: ConversationId,

    pub epoch: u64,
    pub state: CallState,
    pub direction: Option<CallDirection>,
    pub call_type: Option<CallMediaType>,
    pub remote_user_id: Option<UserId>,
    /// Learned from the relay; may arrive only with a later envelope.
    pub remote_transport_id: Option<TransportId>,

    pub local_stream: Option<T::LocalStream>,
    /// Present iff `state == Connected`.
    pub remote_stream: Option<T::RemoteStream>,
    pub connection: Option<T::Connection>,

    pub is_muted: bool,
    pub is_video_enabled: bool,

    /// Initiator only: set once our offer went out; an answer arriving
    /// before that is unsolicited and dropped.
    pub did_send_offer: bool,
    /// Set once the initial offer/answer exchange has begun on the peer
    /// connection; remote candidates are queued until then.
    pub negotiation_active: bool,

    /// The most recent unaccepted inbound offer; retained while Ringing,
    /// consumed by accept.
    pub pending_offer: Option<SessionDescription>,
    /// Local candidates produced before the remote transport id is known.
    pub pending_local_candidates: Vec<IceCandidateData>,
    /// Remote candidates that arrived before negotiation began.
    pub pending_remote_candidates: Vec<IceCandidateData>,
}

impl<T> CallSession<T>
where
    T: Platform,
{
    pub fn new(local_user_id: UserId, conversation_id: ConversationId) -> Self {
        Self {
            local_user_id,
            conversation_id,
            epoch: 0,
            state: CallState::Idle,
            direction: None,
            call_type: None,
            remote_user_id: None,
            remote_transport_id: None,
            local_stream: None,
            remote_stream: None,
            connection: None,
            is_muted: false,
            is_video_enabled: true,
            did_send_offer: false,
            negotiation_active: false,
            pending_offer: None,
            pending_local_candidates: Vec::new(),
            pending_remote_candidates: Vec::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == CallState::Idle
    }

    /// Enters `Calling` for an outgoing call and returns the new epoch.
    pub fn begin_outgoing(&mut self, remote_user_id: UserId, call_type: CallMediaType) -> u64 {
        self.epoch += 1;
        self.state = CallState::Calling;
        self.direction = Some(CallDirection::Outgoing);
        self.call_type = Some(call_type);
        self.remote_user_id = Some(remote_user_id);
        self.epoch
    }

    /// Enters `Ringing` for an inbound offer and returns the new epoch.
    pub fn begin_incoming(
        &mut self,
        from_transport_id: TransportId,
        offer: SessionDescription,
        call_type: CallMediaType,
    ) -> u64 {
        self.epoch += 1;
        self.state = CallState::Ringing;
        self.direction = Some(CallDirection::Incoming);
        self.call_type = Some(call_type);
        self.remote_transport_id = Some(from_transport_id);
        self.pending_offer = Some(offer);
        self.epoch
    }

    /// Takes the owned resources out and resets every field to its idle
    /// default, bumping the epoch so in-flight completions are discarded.
    /// The caller destroys the returned handles, peer first.
    pub fn take_and_reset(&mut self) -> (Option<T::Connection>, Option<T::LocalStream>) {
        let connection = self.connection.take();
        let local_stream = self.local_stream.take();

        self.epoch += 1;
        self.state = CallState::Idle;
        self.direction = None;
        self.call_type = None;
        self.remote_user_id = None;
        self.remote_transport_id = None;
        self.remote_stream = None;
        self.is_muted = false;
        self.is_video_enabled = true;
        self.did_send_offer = false;
        self.negotiation_active = false;
        self.pending_offer = None;
        self.pending_local_candidates.clear();
        self.pending_remote_candidates.clear();

        (connection, local_stream)
    }

    pub fn snapshot(&self) -> CallStateSnapshot {
        CallStateSnapshot {
            state: self.state,
            call_type: self.call_type,
            is_muted: self.is_muted,
            is_video_enabled: self.is_video_enabled,
            has_remote_stream: self.remote_stream.is_some(),
        }
    }
}

impl<T> fmt::Display for CallSession<T>
where
    T: Platform,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "epoch: {}, state: {}, direction: {:?}, type: {:?}",
            self.epoch, self.state, self.direction, self.call_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::sim_platform::SimPlatform;

    fn session() -> CallSession<SimPlatform> {
        CallSession::new("alice".to_string(), "conv".to_string())
    }

    #[test]
    fn reset_restores_idle_defaults_and_bumps_epoch() {
        let mut session = session();
        let epoch = session.begin_outgoing("bob".to_string(), CallMediaType::Video);
        session.is_muted = true;
        session.is_video_enabled = false;
        session.did_send_offer = true;
        session
            .pending_local_candidates
            .push(IceCandidateData {
                candidate: "candidate:0".to_string(),
                sdp_mid: None,
                sdp_mline_index: None,
            });

        let (connection, stream) = session.take_and_reset();
        assert!(connection.is_none());
        assert!(stream.is_none());
        assert!(session.is_idle());
        assert!(session.epoch > epoch);
        assert_eq!(session.snapshot(), CallStateSnapshot::idle());
        assert!(session.pending_local_candidates.is_empty());
    }

    #[test]
    fn begin_incoming_retains_offer_while_ringing() {
        let mut session = session();
        session.begin_incoming(
            "t-7".to_string(),
            SessionDescription::offer("v=0"),
            CallMediaType::Voice,
        );
        assert_eq!(session.state, CallState::Ringing);
        assert!(session.pending_offer.is_some());
        assert_eq!(session.remote_transport_id.as_deref(), Some("t-7"));
    }
}
