//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The seam between the call state machine and a concrete media/peer
//! backend. The production backend wraps the `webrtc` crate
//! ([`crate::rtc::native`]); tests use the scripted backend in
//! [`crate::sim::sim_platform`].

use std::fmt;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::common::{CallDirection, CallMediaType, Result};
use crate::core::signaling::{IceCandidateData, SessionDescription, SignalPayload};
use crate::error::MediaError;

/// Events flowing from a peer connection (and internal timers) into the
/// call state machine. Every event carries the session epoch at which its
/// source was created; events from a torn-down session are discarded.
pub enum CallEvent<T>
where
    T: Platform,
{
    /// Negotiation data to forward via the signaling client.
    PeerSignal { epoch: u64, payload: SignalPayload },
    /// The remote media stream became available.
    PeerStream {
        epoch: u64,
        stream: T::RemoteStream,
    },
    /// Fatal peer connection error.
    PeerError {
        epoch: u64,
        error: anyhow::Error,
    },
    /// The underlying transport tore down.
    PeerClosed { epoch: u64 },
    /// The negotiation timer fired.
    NegotiationTimeout { epoch: u64 },
    /// Quiesce the event loop; used by tests and shutdown.
    Synchronize(oneshot::Sender<()>),
}

impl<T> fmt::Display for CallEvent<T>
where
    T: Platform,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let display = match self {
            Self::PeerSignal { epoch, payload } => {
                format!("PeerSignal, epoch: {}, payload: {}", epoch, payload)
            }
            Self::PeerStream { epoch, .. } => format!("PeerStream, epoch: {}", epoch),
            Self::PeerError { epoch, error } => {
                format!("PeerError, epoch: {}, error: {}", epoch, error)
            }
            Self::PeerClosed { epoch } => format!("PeerClosed, epoch: {}", epoch),
            Self::NegotiationTimeout { epoch } => {
                format!("NegotiationTimeout, epoch: {}", epoch)
            }
            Self::Synchronize(_) => "Synchronize".to_string(),
        };
        write!(f, "({})", display)
    }
}

/// Sending half of the call event channel, handed to each peer connection
/// at creation.
pub type EventSender<T> = mpsc::UnboundedSender<CallEvent<T>>;

/// A local media stream exclusively owned by the call session.
pub trait LocalStream: Clone + Send + Sync + 'static {
    /// Gates the audio track; cleared while muted.
    fn set_audio_enabled(&self, enabled: bool);

    /// Gates the video track; no-op for voice-only streams.
    fn set_video_enabled(&self, enabled: bool);

    fn has_video(&self) -> bool;

    /// Stops every track and releases device resources. Idempotent.
    fn release(&self);
}

/// Wraps exactly one underlying peer connection. All lifecycle events are
/// delivered through the [`CallEvent`] channel supplied at creation; the
/// methods here inject remote negotiation data.
#[async_trait]
pub trait PeerConnection: Clone + Send + Sync + 'static {
    /// Feeds the remote offer in (non-initiator only); the connection
    /// produces its answer autonomously and emits it as a signal event.
    async fn receive_offer(&self, offer: SessionDescription) -> Result<()>;

    /// Feeds the remote answer in (initiator only).
    async fn receive_answer(&self, answer: SessionDescription) -> Result<()>;

    /// Applies one trickled remote candidate. Valid only after the
    /// offer/answer exchange has begun.
    async fn add_remote_candidate(&self, candidate: IceCandidateData) -> Result<()>;

    /// Releases all underlying transport resources. Idempotent.
    async fn close(&self);
}

/// A platform brings media acquisition and peer connection creation.
#[async_trait]
pub trait Platform: Send + Sync + Sized + 'static {
    type LocalStream: LocalStream;
    type RemoteStream: Clone + Send + Sync + 'static;
    type Connection: PeerConnection;

    /// Requests local microphone (and camera, for video calls) access and
    /// returns the stream handle. Holds device resources until the handle
    /// is released.
    async fn acquire_media(
        &self,
        media_type: CallMediaType,
    ) -> std::result::Result<Self::LocalStream, MediaError>;

    /// Creates the one peer connection for a session. An initiator
    /// (outgoing direction) generates its offer autonomously; a
    /// non-initiator waits for [`PeerConnection::receive_offer`].
    async fn create_peer_connection(
        &self,
        local_stream: &Self::LocalStream,
        direction: CallDirection,
        epoch: u64,
        events: EventSender<Self>,
    ) -> Result<Self::Connection>;
}
