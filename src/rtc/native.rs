//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Production [`Platform`] backed by the `webrtc` crate.
//!
//! Local media here is a pair of sample-fed tracks; the host application
//! pushes encoded Opus/VP8 samples into [`NativeLocalStream`] from whatever
//! capture pipeline it owns. Mute and video toggles gate those writes, so a
//! muted track simply goes silent on the wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::common::{CallDirection, CallMediaType, Result};
use crate::config::CallConfig;
use crate::core::platform::{CallEvent, EventSender, LocalStream, PeerConnection, Platform};
use crate::core::signaling::{IceCandidateData, SessionDescription, SignalPayload};
use crate::error::{CallError, MediaError};

pub struct NativePlatform {
    api: Arc<API>,
    ice_servers: Vec<String>,
}

impl NativePlatform {
    /// Builds the shared webrtc API object. Done once; peer connections
    /// are minted from it per call.
    pub fn new(config: &CallConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Ok(Self {
            api: Arc::new(api),
            ice_servers: config.ice_servers.clone(),
        })
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

#[async_trait]
impl Platform for NativePlatform {
    type LocalStream = NativeLocalStream;
    type RemoteStream = NativeRemoteStream;
    type Connection = NativeConnection;

    async fn acquire_media(
        &self,
        media_type: CallMediaType,
    ) -> std::result::Result<Self::LocalStream, MediaError> {
        Ok(NativeLocalStream::new(media_type == CallMediaType::Video))
    }

    async fn create_peer_connection(
        &self,
        local_stream: &Self::LocalStream,
        direction: CallDirection,
        epoch: u64,
        events: EventSender<Self>,
    ) -> Result<Self::Connection> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.rtc_configuration())
                .await?,
        );

        pc.add_track(local_stream.audio_track() as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        if let Some(video) = local_stream.video_track() {
            pc.add_track(video as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
        }

        let remote_stream = NativeRemoteStream::default();
        let announced = Arc::new(AtomicBool::new(false));
        {
            let events = events.clone();
            let remote_stream = remote_stream.clone();
            let announced = Arc::clone(&announced);
            pc.on_track(Box::new(move |track, _receiver, _transceiver| {
                let events = events.clone();
                let remote_stream = remote_stream.clone();
                let announced = Arc::clone(&announced);
                Box::pin(async move {
                    debug!("on_track: {}", track.codec().capability.mime_type);
                    remote_stream.push(track);
                    // One stream announcement per connection, on first track.
                    if !announced.swap(true, Ordering::SeqCst) {
                        let _ = events.send(CallEvent::PeerStream {
                            epoch,
                            stream: remote_stream.clone(),
                        });
                    }
                })
            }));
        }

        {
            let events = events.clone();
            pc.on_ice_candidate(Box::new(move |candidate| {
                let events = events.clone();
                Box::pin(async move {
                    // None marks end of gathering; nothing to trickle.
                    let Some(candidate) = candidate else {
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = events.send(CallEvent::PeerSignal {
                                epoch,
                                payload: SignalPayload::Candidate(IceCandidateData {
                                    candidate: init.candidate,
                                    sdp_mid: init.sdp_mid,
                                    sdp_mline_index: init.sdp_mline_index,
                                }),
                            });
                        }
                        Err(e) => warn!("on_ice_candidate: to_json failed: {}", e),
                    }
                })
            }));
        }

        {
            let events = events.clone();
            pc.on_peer_connection_state_change(Box::new(move |state| {
                let events = events.clone();
                Box::pin(async move {
                    debug!("peer connection state: {}", state);
                    match state {
                        RTCPeerConnectionState::Failed => {
                            let _ = events.send(CallEvent::PeerError {
                                epoch,
                                error: CallError::NegotiationFailed(
                                    "peer connection failed".to_string(),
                                )
                                .into(),
                            });
                        }
                        RTCPeerConnectionState::Closed => {
                            let _ = events.send(CallEvent::PeerClosed { epoch });
                        }
                        RTCPeerConnectionState::Disconnected => {
                            // Often transient; ICE may still recover it.
                            warn!("peer connection disconnected");
                        }
                        _ => {}
                    }
                })
            }));
        }

        if direction == CallDirection::Outgoing {
            let offer = pc.create_offer(None).await?;
            pc.set_local_description(offer.clone()).await?;
            let _ = events.send(CallEvent::PeerSignal {
                epoch,
                payload: SignalPayload::Offer(SessionDescription::offer(offer.sdp)),
            });
        }

        Ok(NativeConnection {
            inner: Arc::new(NativeConnectionInner {
                pc,
                epoch,
                events,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

/// Sample-fed local tracks for one call. The host pushes encoded samples
/// via `write_audio`/`write_video`; gates drop them while muted.
#[derive(Clone)]
pub struct NativeLocalStream {
    inner: Arc<NativeLocalStreamInner>,
}

struct NativeLocalStreamInner {
    audio: Arc<TrackLocalStaticSample>,
    video: Option<Arc<TrackLocalStaticSample>>,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    released: AtomicBool,
}

impl NativeLocalStream {
    fn new(with_video: bool) -> Self {
        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "peercall-local".to_owned(),
        ));
        let video = with_video.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    ..Default::default()
                },
                "video".to_owned(),
                "peercall-local".to_owned(),
            ))
        });
        Self {
            inner: Arc::new(NativeLocalStreamInner {
                audio,
                video,
                audio_enabled: AtomicBool::new(true),
                video_enabled: AtomicBool::new(with_video),
                released: AtomicBool::new(false),
            }),
        }
    }

    fn audio_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.inner.audio)
    }

    fn video_track(&self) -> Option<Arc<TrackLocalStaticSample>> {
        self.inner.video.as_ref().map(Arc::clone)
    }

    fn is_writable(&self) -> bool {
        !self.inner.released.load(Ordering::SeqCst)
    }

    /// Pushes one encoded audio sample, silently discarded while muted or
    /// after release.
    pub async fn write_audio(&self, sample: Sample) -> Result<()> {
        if self.is_writable() && self.inner.audio_enabled.load(Ordering::SeqCst) {
            self.inner.audio.write_sample(&sample).await?;
        }
        Ok(())
    }

    /// Pushes one encoded video frame, silently discarded while video is
    /// disabled, for voice calls, or after release.
    pub async fn write_video(&self, sample: Sample) -> Result<()> {
        if self.is_writable() && self.inner.video_enabled.load(Ordering::SeqCst) {
            if let Some(video) = &self.inner.video {
                video.write_sample(&sample).await?;
            }
        }
        Ok(())
    }
}

impl LocalStream for NativeLocalStream {
    fn set_audio_enabled(&self, enabled: bool) {
        self.inner.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    fn set_video_enabled(&self, enabled: bool) {
        if self.inner.video.is_some() {
            self.inner.video_enabled.store(enabled, Ordering::SeqCst);
        }
    }

    fn has_video(&self) -> bool {
        self.inner.video.is_some()
    }

    fn release(&self) {
        self.inner.released.store(true, Ordering::SeqCst);
    }
}

/// Remote tracks as they arrive over the connection. The host application
/// reads RTP from these on its own tasks.
#[derive(Clone, Default)]
pub struct NativeRemoteStream {
    tracks: Arc<Mutex<Vec<Arc<TrackRemote>>>>,
}

impl NativeRemoteStream {
    fn push(&self, track: Arc<TrackRemote>) {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.push(track);
        }
    }

    pub fn tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.tracks
            .lock()
            .map(|tracks| tracks.clone())
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct NativeConnection {
    inner: Arc<NativeConnectionInner>,
}

struct NativeConnectionInner {
    pc: Arc<RTCPeerConnection>,
    epoch: u64,
    events: EventSender<NativePlatform>,
    closed: AtomicBool,
}

#[async_trait]
impl PeerConnection for NativeConnection {
    async fn receive_offer(&self, offer: SessionDescription) -> Result<()> {
        let remote = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| CallError::InvalidSessionDescription(e.to_string()))?;
        self.inner.pc.set_remote_description(remote).await?;

        let answer = self.inner.pc.create_answer(None).await?;
        self.inner.pc.set_local_description(answer.clone()).await?;
        let _ = self.inner.events.send(CallEvent::PeerSignal {
            epoch: self.inner.epoch,
            payload: SignalPayload::Answer(SessionDescription::answer(answer.sdp)),
        });
        Ok(())
    }

    async fn receive_answer(&self, answer: SessionDescription) -> Result<()> {
        let remote = RTCSessionDescription::answer(answer.sdp)
            .map_err(|e| CallError::InvalidSessionDescription(e.to_string()))?;
        self.inner.pc.set_remote_description(remote).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidateData) -> Result<()> {
        self.inner
            .pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.inner.pc.close().await {
                warn!("peer connection close failed: {}", e);
            }
        }
    }
}
