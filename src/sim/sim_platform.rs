//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Simulation platform: a fully scripted [`Platform`] with no devices and
//! no network. Tests drive it directly, injecting peer events and
//! inspecting what the state machine did with them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::common::{CallDirection, CallMediaType, Result};
use crate::core::platform::{CallEvent, EventSender, LocalStream, PeerConnection, Platform};
use crate::core::signaling::{IceCandidateData, SessionDescription, SignalPayload};
use crate::error::MediaError;

#[derive(Clone, Default)]
pub struct SimPlatform {
    inner: Arc<SimPlatformInner>,
}

#[derive(Default)]
struct SimPlatformInner {
    /// Next `acquire_media` call fails with this instead of succeeding.
    fail_next_media: Mutex<Option<MediaError>>,
    /// Next `acquire_media` call parks on `media_gate` first.
    stall_next_media: AtomicBool,
    media_gate: Notify,
    streams: Mutex<Vec<SimLocalStream>>,
    connections: Mutex<Vec<SimConnection>>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_media(&self, error: MediaError) {
        *self.inner.fail_next_media.lock().expect("sim lock") = Some(error);
    }

    /// Makes the next `acquire_media` call block until
    /// [`SimPlatform::release_media_gate`]. Models a permission prompt
    /// held open.
    pub fn stall_next_media(&self) {
        self.inner.stall_next_media.store(true, Ordering::SeqCst);
    }

    pub fn release_media_gate(&self) {
        self.inner.media_gate.notify_one();
    }

    pub fn last_stream(&self) -> Option<SimLocalStream> {
        self.inner.streams.lock().expect("sim lock").last().cloned()
    }

    pub fn last_connection(&self) -> Option<SimConnection> {
        self.inner
            .connections
            .lock()
            .expect("sim lock")
            .last()
            .cloned()
    }

    pub fn connections_created(&self) -> usize {
        self.inner.connections.lock().expect("sim lock").len()
    }
}

#[async_trait]
impl Platform for SimPlatform {
    type LocalStream = SimLocalStream;
    type RemoteStream = SimRemoteStream;
    type Connection = SimConnection;

    async fn acquire_media(
        &self,
        media_type: CallMediaType,
    ) -> std::result::Result<Self::LocalStream, MediaError> {
        if self.inner.stall_next_media.swap(false, Ordering::SeqCst) {
            self.inner.media_gate.notified().await;
        }
        if let Some(error) = self.inner.fail_next_media.lock().expect("sim lock").take() {
            info!("sim: acquire_media() scripted failure: {}", error);
            return Err(error);
        }
        let stream = SimLocalStream::new(media_type == CallMediaType::Video);
        self.inner
            .streams
            .lock()
            .expect("sim lock")
            .push(stream.clone());
        Ok(stream)
    }

    async fn create_peer_connection(
        &self,
        _local_stream: &Self::LocalStream,
        direction: CallDirection,
        epoch: u64,
        events: EventSender<Self>,
    ) -> Result<Self::Connection> {
        let connection = SimConnection::new(direction, epoch, events.clone());
        self.inner
            .connections
            .lock()
            .expect("sim lock")
            .push(connection.clone());

        if direction == CallDirection::Outgoing {
            // Initiators produce their offer as soon as the connection exists.
            let _ = events.send(CallEvent::PeerSignal {
                epoch,
                payload: SignalPayload::Offer(SessionDescription::offer("SIM-OFFER")),
            });
        }
        Ok(connection)
    }
}

#[derive(Clone)]
pub struct SimLocalStream {
    inner: Arc<SimLocalStreamInner>,
}

struct SimLocalStreamInner {
    has_video: bool,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    released: AtomicBool,
}

impl SimLocalStream {
    fn new(has_video: bool) -> Self {
        Self {
            inner: Arc::new(SimLocalStreamInner {
                has_video,
                audio_enabled: AtomicBool::new(true),
                video_enabled: AtomicBool::new(has_video),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn audio_enabled(&self) -> bool {
        self.inner.audio_enabled.load(Ordering::SeqCst)
    }

    pub fn video_enabled(&self) -> bool {
        self.inner.video_enabled.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }
}

impl LocalStream for SimLocalStream {
    fn set_audio_enabled(&self, enabled: bool) {
        self.inner.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    fn set_video_enabled(&self, enabled: bool) {
        if self.inner.has_video {
            self.inner.video_enabled.store(enabled, Ordering::SeqCst);
        }
    }

    fn has_video(&self) -> bool {
        self.inner.has_video
    }

    fn release(&self) {
        self.inner.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
pub struct SimRemoteStream {
    pub id: String,
}

#[derive(Clone)]
pub struct SimConnection {
    inner: Arc<SimConnectionInner>,
}

struct SimConnectionInner {
    direction: CallDirection,
    epoch: u64,
    events: EventSender<SimPlatform>,
    received_offers: Mutex<Vec<SessionDescription>>,
    received_answers: Mutex<Vec<SessionDescription>>,
    remote_candidates: Mutex<Vec<IceCandidateData>>,
    closed: AtomicBool,
}

impl SimConnection {
    fn new(direction: CallDirection, epoch: u64, events: EventSender<SimPlatform>) -> Self {
        Self {
            inner: Arc::new(SimConnectionInner {
                direction,
                epoch,
                events,
                received_offers: Mutex::new(Vec::new()),
                received_answers: Mutex::new(Vec::new()),
                remote_candidates: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn direction(&self) -> CallDirection {
        self.inner.direction
    }

    pub fn received_offers(&self) -> Vec<SessionDescription> {
        self.inner.received_offers.lock().expect("sim lock").clone()
    }

    pub fn received_answers(&self) -> Vec<SessionDescription> {
        self.inner
            .received_answers
            .lock()
            .expect("sim lock")
            .clone()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidateData> {
        self.inner
            .remote_candidates
            .lock()
            .expect("sim lock")
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    // ----- scripted peer behavior, driven from tests -----------------------

    pub fn inject_remote_stream(&self) {
        let _ = self.inner.events.send(CallEvent::PeerStream {
            epoch: self.inner.epoch,
            stream: SimRemoteStream {
                id: format!("sim-remote-{}", self.inner.epoch),
            },
        });
    }

    pub fn inject_error(&self, message: &str) {
        let _ = self.inner.events.send(CallEvent::PeerError {
            epoch: self.inner.epoch,
            error: anyhow::anyhow!(message.to_string()),
        });
    }

    pub fn inject_closed(&self) {
        let _ = self.inner.events.send(CallEvent::PeerClosed {
            epoch: self.inner.epoch,
        });
    }

    pub fn inject_local_candidate(&self, candidate: IceCandidateData) {
        let _ = self.inner.events.send(CallEvent::PeerSignal {
            epoch: self.inner.epoch,
            payload: SignalPayload::Candidate(candidate),
        });
    }
}

#[async_trait]
impl PeerConnection for SimConnection {
    async fn receive_offer(&self, offer: SessionDescription) -> Result<()> {
        self.inner
            .received_offers
            .lock()
            .expect("sim lock")
            .push(offer);
        // A real connection derives its answer from the offer; the sim
        // just emits a canned one.
        let _ = self.inner.events.send(CallEvent::PeerSignal {
            epoch: self.inner.epoch,
            payload: SignalPayload::Answer(SessionDescription::answer("SIM-ANSWER")),
        });
        Ok(())
    }

    async fn receive_answer(&self, answer: SessionDescription) -> Result<()> {
        self.inner
            .received_answers
            .lock()
            .expect("sim lock")
            .push(answer);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidateData) -> Result<()> {
        self.inner
            .remote_candidates
            .lock()
            .expect("sim lock")
            .push(candidate);
        Ok(())
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}
