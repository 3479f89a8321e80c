//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Common types used throughout the library.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Common Result type, using `anyhow::Error` for Error.
pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// Application-level identity of a user, assigned by the host application.
pub type UserId = String;

/// Identity of the conversation a call is scoped to.
pub type ConversationId = String;

/// Opaque, connection-scoped address assigned by the signaling relay,
/// used to route envelopes to a specific remote participant.
pub type TransportId = String;

/// Tracks the state of the call session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    /// No call in progress.
    Idle,

    /// Outgoing call, waiting for the remote party to answer.
    Calling,

    /// Incoming call, waiting for the local user to accept.
    Ringing,

    /// The call is established and media is flowing.
    Connected,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The call direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallDirection {
    /// Incoming call.
    Incoming,

    /// Outgoing call.
    Outgoing,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Type of media for a call, fixed at origination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMediaType {
    /// Call is audio only.
    Voice,

    /// Call is audio/video.
    Video,
}

impl fmt::Display for CallMediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A plain-data view of the call session, published to the UI after every
/// transition. Stream handles are fetched separately from the manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallStateSnapshot {
    pub state: CallState,
    pub call_type: Option<CallMediaType>,
    pub is_muted: bool,
    pub is_video_enabled: bool,
    pub has_remote_stream: bool,
}

impl CallStateSnapshot {
    pub fn idle() -> Self {
        Self {
            state: CallState::Idle,
            call_type: None,
            is_muted: false,
            is_video_enabled: true,
            has_remote_stream: false,
        }
    }
}

impl Default for CallStateSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}
