//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The call state machine.
//!
//! The manager owns the one [`CallSession`] and is the sole arbiter of its
//! transitions. Inputs arrive three ways and all funnel into the same
//! guarded mutations:
//!
//! - verbs invoked by the UI (`start`, `accept`, `end`, the toggles),
//! - envelopes from the signaling relay ([`CallManager::received_envelope`]),
//! - peer connection events, delivered on one typed channel and consumed by
//!   a dispatcher task spawned at construction.
//!
//! Session state lives behind a [`CallMutex`]; critical sections never hold
//! the lock across an await. Asynchronous completions re-lock and verify
//! the session epoch before committing, so a late media stream or peer
//! event after `end()` is discarded and its resources released rather than
//! applied to a fresh session.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::common::{
    CallDirection, CallMediaType, CallState, CallStateSnapshot, ConversationId, Result,
    TransportId, UserId,
};
use crate::config::CallConfig;
use crate::core::call_mutex::CallMutex;
use crate::core::platform::{
    CallEvent, EventSender, LocalStream, PeerConnection, Platform,
};
use crate::core::session::CallSession;
use crate::core::signaling::{Envelope, IceCandidateData, SessionDescription, SignalPayload};
use crate::error::CallError;

pub struct CallManager<T>
where
    T: Platform,
{
    platform: Arc<T>,
    /// The current (or idle) session; exactly one per manager.
    session: Arc<CallMutex<CallSession<T>>>,
    /// Outbound envelopes, consumed by the signaling client. Best effort.
    outbound: mpsc::UnboundedSender<Envelope>,
    /// Injects events into the dispatcher task.
    event_tx: EventSender<T>,
    /// Publishes a snapshot after every transition; the UI renders from it.
    state_tx: Arc<watch::Sender<CallStateSnapshot>>,
    config: Arc<CallConfig>,
}

impl<T> Clone for CallManager<T>
where
    T: Platform,
{
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            session: Arc::clone(&self.session),
            outbound: self.outbound.clone(),
            event_tx: self.event_tx.clone(),
            state_tx: Arc::clone(&self.state_tx),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T> CallManager<T>
where
    T: Platform,
{
    /// Creates a manager and spawns its event dispatcher. Must be called
    /// from within a tokio runtime.
    pub fn new(
        platform: T,
        local_user_id: impl Into<UserId>,
        conversation_id: impl Into<ConversationId>,
        outbound: mpsc::UnboundedSender<Envelope>,
        config: CallConfig,
    ) -> Self {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(CallStateSnapshot::idle());

        let manager = Self {
            platform: Arc::new(platform),
            session: Arc::new(CallMutex::new(
                CallSession::new(local_user_id.into(), conversation_id.into()),
                "session",
            )),
            outbound,
            event_tx,
            state_tx: Arc::new(state_tx),
            config: Arc::new(config),
        };

        let dispatcher = manager.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!("event: {}", event);
                if let Err(e) = dispatcher.handle_event(event).await {
                    error!("event handling failed: {}", e);
                }
            }
            debug!("call event loop ended");
        });

        manager
    }

    /// Spawns a task that feeds inbound relay envelopes into the manager.
    pub fn attach_signaling(&self, mut inbound: mpsc::UnboundedReceiver<Envelope>) {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                if let Err(e) = manager.received_envelope(envelope).await {
                    error!("envelope handling failed: {}", e);
                }
            }
        });
    }

    // ----- observable state ------------------------------------------------

    pub fn state(&self) -> CallStateSnapshot {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallStateSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn local_stream(&self) -> Option<T::LocalStream> {
        self.session
            .with(|session| session.local_stream.clone())
            .ok()
            .flatten()
    }

    /// Present only while connected.
    pub fn remote_stream(&self) -> Option<T::RemoteStream> {
        self.session
            .with(|session| session.remote_stream.clone())
            .ok()
            .flatten()
    }

    // ----- verbs -----------------------------------------------------------

    /// Starts an outgoing call. Returns `Ok(false)` if local media could
    /// not be acquired (nothing was signaled to the remote party); rejects
    /// with [`CallError::CallAlreadyInProgress`] while a session exists.
    pub async fn start(
        &self,
        remote_user_id: impl Into<UserId>,
        call_type: CallMediaType,
    ) -> Result<bool> {
        info!("start(): type: {}", call_type);

        let epoch = {
            let mut session = self.session.lock()?;
            if !session.is_idle() {
                return Err(CallError::CallAlreadyInProgress.into());
            }
            let epoch = session.begin_outgoing(remote_user_id.into(), call_type);
            self.publish(&session);
            epoch
        };

        self.setup_session(epoch, call_type, CallDirection::Outgoing)
            .await
    }

    /// Accepts the ringing incoming call. Returns `Ok(false)` if local
    /// media could not be acquired; rejects with
    /// [`CallError::NoIncomingCall`] when nothing is ringing.
    pub async fn accept(&self) -> Result<bool> {
        info!("accept():");

        // Claiming the offer under the lock is what makes accept single
        // shot: a concurrent accept finds it gone and is rejected here,
        // before either of them awaits.
        let (epoch, call_type, offer) = {
            let mut session = self.session.lock()?;
            if session.state != CallState::Ringing {
                return Err(CallError::NoIncomingCall.into());
            }
            match (session.call_type, session.pending_offer.take()) {
                (Some(call_type), Some(offer)) => (session.epoch, call_type, offer),
                _ => return Err(CallError::NoIncomingCall.into()),
            }
        };

        if !self
            .setup_session(epoch, call_type, CallDirection::Incoming)
            .await?
        {
            return Ok(false);
        }

        // Feed the claimed offer in; the connection produces its answer
        // autonomously and emits it as a signal event.
        let connection = {
            let session = self.session.lock()?;
            if session.epoch != epoch {
                return Ok(false);
            }
            match session.connection.clone() {
                Some(connection) => connection,
                None => return Ok(false),
            }
        };

        if let Err(e) = connection.receive_offer(offer).await {
            error!("applying inbound offer failed: {}", e);
            self.terminate_session(false, "offer-failed", Some(epoch))
                .await?;
            return Ok(false);
        }

        self.negotiation_started(epoch).await?;
        Ok(true)
    }

    /// Ends the current call, if any. Safe to call from any state and
    /// idempotent; this is the single cancellation primitive.
    pub async fn end(&self) -> Result<()> {
        info!("end():");
        self.terminate_session(true, "local-hangup", None).await
    }

    /// Flips the local audio track gate. Returns the new `is_muted`.
    pub fn toggle_mute(&self) -> Result<bool> {
        let mut session = self.session.lock()?;
        let stream = match &session.local_stream {
            Some(stream) => stream.clone(),
            None => return Err(CallError::NoActiveCall.into()),
        };
        session.is_muted = !session.is_muted;
        stream.set_audio_enabled(!session.is_muted);
        self.publish(&session);
        Ok(session.is_muted)
    }

    /// Flips the local video track gate. No-op for voice calls. Returns
    /// the new `is_video_enabled`.
    pub fn toggle_video(&self) -> Result<bool> {
        let mut session = self.session.lock()?;
        let stream = match &session.local_stream {
            Some(stream) => stream.clone(),
            None => return Err(CallError::NoActiveCall.into()),
        };
        if session.call_type != Some(CallMediaType::Video) {
            return Ok(session.is_video_enabled);
        }
        session.is_video_enabled = !session.is_video_enabled;
        stream.set_video_enabled(session.is_video_enabled);
        self.publish(&session);
        Ok(session.is_video_enabled)
    }

    /// Quiesces the event dispatcher: resolves once every event enqueued
    /// before this call has been handled.
    pub async fn synchronize(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.event_tx
            .send(CallEvent::Synchronize(done_tx))
            .map_err(|_| anyhow::anyhow!("call event loop is gone"))?;
        let _ = done_rx.await;
        Ok(())
    }

    // ----- inbound envelopes ----------------------------------------------

    pub async fn received_envelope(&self, envelope: Envelope) -> Result<()> {
        debug!("rx: {}", envelope);
        match envelope {
            Envelope::IncomingCall {
                from_transport_id,
                offer,
                call_type,
            } => self.received_incoming_call(from_transport_id, offer, call_type),
            Envelope::CallInitiated { to_transport_id } => {
                self.received_call_initiated(to_transport_id)
            }
            Envelope::CallAnswered {
                from_transport_id,
                answer,
            } => self.received_answer(from_transport_id, answer).await,
            Envelope::IceCandidate { candidate, .. } => {
                self.received_ice_candidate(candidate).await
            }
            Envelope::CallEnded { .. } => {
                self.terminate_session(false, "remote-hangup", None).await
            }
            Envelope::UserUnavailable => {
                self.terminate_session(false, "remote-unavailable", None)
                    .await
            }
            other => {
                warn!("rx: outbound-only envelope {}, ignoring", other);
                Ok(())
            }
        }
    }

    fn received_incoming_call(
        &self,
        from_transport_id: TransportId,
        offer: SessionDescription,
        call_type: CallMediaType,
    ) -> Result<()> {
        let mut session = self.session.lock()?;
        if !session.is_idle() {
            // One session at a time; the caller will give up or hang up.
            warn!("incoming call while busy, ignoring");
            return Ok(());
        }
        session.begin_incoming(from_transport_id, offer, call_type);
        info!("incoming call: {}", *session);
        self.publish(&session);
        Ok(())
    }

    fn received_call_initiated(&self, to_transport_id: TransportId) -> Result<()> {
        let flushed: Vec<IceCandidateData> = {
            let mut session = self.session.lock()?;
            if session.state != CallState::Calling {
                debug!("call-initiated outside calling state, ignoring");
                return Ok(());
            }
            session.remote_transport_id = Some(to_transport_id.clone());
            session.pending_local_candidates.drain(..).collect()
        };
        for candidate in flushed {
            self.send_envelope(Envelope::IceCandidate {
                to_transport_id: Some(to_transport_id.clone()),
                from_transport_id: None,
                candidate,
            });
        }
        Ok(())
    }

    async fn received_answer(
        &self,
        from_transport_id: TransportId,
        answer: SessionDescription,
    ) -> Result<()> {
        let (connection, epoch, flushed) = {
            let mut session = self.session.lock()?;
            if session.state != CallState::Calling
                || session.direction != Some(CallDirection::Outgoing)
            {
                warn!("answer outside an outgoing call, dropping");
                return Ok(());
            }
            if !session.did_send_offer {
                warn!("unsolicited answer before our offer went out, dropping");
                return Ok(());
            }
            let connection = match session.connection.clone() {
                Some(connection) => connection,
                None => return Ok(()),
            };
            session.remote_transport_id = Some(from_transport_id.clone());
            let flushed: Vec<IceCandidateData> =
                session.pending_local_candidates.drain(..).collect();
            (connection, session.epoch, flushed)
        };

        for candidate in flushed {
            self.send_envelope(Envelope::IceCandidate {
                to_transport_id: Some(from_transport_id.clone()),
                from_transport_id: None,
                candidate,
            });
        }

        if let Err(e) = connection.receive_answer(answer).await {
            error!("applying answer failed: {}", e);
            return self
                .terminate_session(false, "answer-failed", Some(epoch))
                .await;
        }

        self.negotiation_started(epoch).await?;
        self.arm_negotiation_timeout(epoch);
        Ok(())
    }

    async fn received_ice_candidate(&self, candidate: IceCandidateData) -> Result<()> {
        let connection = {
            let mut session = self.session.lock()?;
            if session.is_idle() {
                debug!("candidate with no active call, dropping");
                return Ok(());
            }
            match session.connection.clone() {
                // Candidates may only be applied once offer/answer has begun.
                Some(connection) if session.negotiation_active => connection,
                _ => {
                    session.pending_remote_candidates.push(candidate);
                    return Ok(());
                }
            }
        };
        if let Err(e) = connection.add_remote_candidate(candidate).await {
            warn!("failed to apply remote candidate: {}", e);
        }
        Ok(())
    }

    // ----- peer events -----------------------------------------------------

    async fn handle_event(&self, event: CallEvent<T>) -> Result<()> {
        match event {
            CallEvent::PeerSignal { epoch, payload } => self.handle_peer_signal(epoch, payload),
            CallEvent::PeerStream { epoch, stream } => self.handle_peer_stream(epoch, stream),
            CallEvent::PeerError { epoch, error } => {
                error!("peer connection error: {}", error);
                self.terminate_session(false, "peer-error", Some(epoch))
                    .await
            }
            CallEvent::PeerClosed { epoch } => {
                self.terminate_session(false, "peer-closed", Some(epoch))
                    .await
            }
            CallEvent::NegotiationTimeout { epoch } => {
                self.handle_negotiation_timeout(epoch).await
            }
            CallEvent::Synchronize(done) => {
                let _ = done.send(());
                Ok(())
            }
        }
    }

    fn handle_peer_signal(&self, epoch: u64, payload: SignalPayload) -> Result<()> {
        let mut armed_epoch = None;
        let envelope = {
            let mut session = self.session.lock()?;
            if session.epoch != epoch {
                debug!("stale peer signal, dropping");
                return Ok(());
            }
            match payload {
                SignalPayload::Offer(offer) => {
                    let (to_user_id, call_type) =
                        match (session.remote_user_id.clone(), session.call_type) {
                            (Some(to), Some(call_type)) => (to, call_type),
                            _ => return Ok(()),
                        };
                    session.did_send_offer = true;
                    Some(Envelope::CallUser {
                        to_user_id,
                        offer,
                        call_type,
                    })
                }
                SignalPayload::Answer(answer) => match session.remote_transport_id.clone() {
                    Some(to_transport_id) => {
                        armed_epoch = Some(epoch);
                        Some(Envelope::AnswerCall {
                            to_transport_id,
                            answer,
                        })
                    }
                    None => {
                        warn!("answer with unknown transport id, dropping");
                        None
                    }
                },
                SignalPayload::Candidate(candidate) => {
                    match session.remote_transport_id.clone() {
                        Some(to_transport_id) => Some(Envelope::IceCandidate {
                            to_transport_id: Some(to_transport_id),
                            from_transport_id: None,
                            candidate,
                        }),
                        None => {
                            // Queued until the relay tells us where to send.
                            session.pending_local_candidates.push(candidate);
                            None
                        }
                    }
                }
            }
        };

        if let Some(envelope) = envelope {
            self.send_envelope(envelope);
        }
        if let Some(epoch) = armed_epoch {
            self.arm_negotiation_timeout(epoch);
        }
        Ok(())
    }

    fn handle_peer_stream(&self, epoch: u64, stream: T::RemoteStream) -> Result<()> {
        let mut session = self.session.lock()?;
        if session.epoch != epoch {
            debug!("stale remote stream, dropping");
            return Ok(());
        }
        match session.state {
            CallState::Calling | CallState::Ringing => {
                session.state = CallState::Connected;
                session.remote_stream = Some(stream);
                info!("connected: {}", *session);
                self.publish(&session);
            }
            _ => debug!("remote stream in state {}, ignoring", session.state),
        }
        Ok(())
    }

    async fn handle_negotiation_timeout(&self, epoch: u64) -> Result<()> {
        {
            let session = self.session.lock()?;
            if session.epoch != epoch || session.state == CallState::Connected {
                return Ok(());
            }
        }
        warn!("negotiation timed out before media arrived");
        self.terminate_session(false, "negotiation-timeout", Some(epoch))
            .await
    }

    // ----- session setup and teardown --------------------------------------

    /// Acquires media and creates the peer connection for a session begun
    /// at `epoch`, committing both into the session. Returns `Ok(false)`
    /// and cleans up if acquisition fails or the session ended while an
    /// asynchronous step was in flight.
    async fn setup_session(
        &self,
        epoch: u64,
        call_type: CallMediaType,
        direction: CallDirection,
    ) -> Result<bool> {
        let stream = match self.platform.acquire_media(call_type).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("media acquisition failed: {}", e);
                self.abort_setup(epoch)?;
                return Ok(false);
            }
        };

        // The user may have hung up while the permission prompt was open.
        {
            let session = self.session.lock()?;
            if session.epoch != epoch {
                drop(session);
                stream.release();
                return Ok(false);
            }
        }

        let connection = match self
            .platform
            .create_peer_connection(&stream, direction, epoch, self.event_tx.clone())
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                error!("peer connection creation failed: {}", e);
                stream.release();
                self.abort_setup(epoch)?;
                return Ok(false);
            }
        };

        let stale = {
            let mut session = self.session.lock()?;
            // Never displace handles another setup already committed; the
            // displaced pair would escape every cleanup path.
            if session.epoch != epoch
                || session.connection.is_some()
                || session.local_stream.is_some()
            {
                true
            } else {
                session.local_stream = Some(stream.clone());
                session.connection = Some(connection.clone());
                self.publish(&session);
                false
            }
        };
        if stale {
            stream.release();
            connection.close().await;
            return Ok(false);
        }
        Ok(true)
    }

    fn abort_setup(&self, epoch: u64) -> Result<()> {
        let mut session = self.session.lock()?;
        if session.epoch == epoch {
            let _ = session.take_and_reset();
            self.publish(&session);
        }
        Ok(())
    }

    /// Marks offer/answer negotiation as begun and applies any remote
    /// candidates that were queued while waiting for it.
    async fn negotiation_started(&self, epoch: u64) -> Result<()> {
        let (connection, queued) = {
            let mut session = self.session.lock()?;
            if session.epoch != epoch {
                return Ok(());
            }
            session.negotiation_active = true;
            let connection = match session.connection.clone() {
                Some(connection) => connection,
                None => return Ok(()),
            };
            let queued: Vec<IceCandidateData> =
                session.pending_remote_candidates.drain(..).collect();
            (connection, queued)
        };
        for candidate in queued {
            if let Err(e) = connection.add_remote_candidate(candidate).await {
                warn!("failed to apply queued remote candidate: {}", e);
            }
        }
        Ok(())
    }

    /// The one cleanup path. Destroys the peer handle, releases local
    /// media, resets the session to idle defaults and clears every queue.
    /// `required_epoch` guards event-triggered teardown against racing a
    /// session that has already moved on; verbs pass `None`.
    async fn terminate_session(
        &self,
        send_hangup: bool,
        reason: &str,
        required_epoch: Option<u64>,
    ) -> Result<()> {
        let (connection, stream, hangup_to) = {
            let mut session = self.session.lock()?;
            if session.is_idle() {
                debug!("terminate_session(): no active call");
                return Ok(());
            }
            if let Some(required) = required_epoch {
                if session.epoch != required {
                    debug!("terminate_session(): stale trigger, ignoring");
                    return Ok(());
                }
            }
            info!("terminate_session(): reason: {}, {}", reason, *session);
            let hangup_to = if send_hangup {
                session.remote_transport_id.clone()
            } else {
                None
            };
            let (connection, stream) = session.take_and_reset();
            self.publish(&session);
            (connection, stream, hangup_to)
        };

        if let Some(to_transport_id) = hangup_to {
            self.send_envelope(Envelope::CallEnded {
                to_transport_id: Some(to_transport_id),
            });
        }
        if let Some(connection) = connection {
            connection.close().await;
        }
        if let Some(stream) = stream {
            stream.release();
        }
        Ok(())
    }

    fn arm_negotiation_timeout(&self, epoch: u64) {
        let events = self.event_tx.clone();
        let timeout = self.config.negotiation_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(CallEvent::NegotiationTimeout { epoch });
        });
    }

    fn send_envelope(&self, envelope: Envelope) {
        debug!("tx: {}", envelope);
        if self.outbound.send(envelope).is_err() {
            // Best effort; the relay client owns delivery.
            debug!("signaling consumer gone, envelope dropped");
        }
    }

    fn publish(&self, session: &CallSession<T>) {
        self.state_tx.send_replace(session.snapshot());
    }
}
