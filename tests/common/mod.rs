//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Test harness around a call manager driven by the simulation platform.

#![allow(dead_code)]

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use peercall::common::CallMediaType;
use peercall::config::CallConfig;
use peercall::core::call_manager::CallManager;
use peercall::core::signaling::{Envelope, IceCandidateData, SessionDescription};
use peercall::sim::sim_platform::{SimConnection, SimPlatform};

pub const LOCAL_USER: &str = "alice";
pub const REMOTE_USER: &str = "bob";
pub const REMOTE_TRANSPORT: &str = "t-remote";

pub fn test_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct TestContext {
    pub manager: CallManager<SimPlatform>,
    pub platform: SimPlatform,
    pub outbound_rx: mpsc::UnboundedReceiver<Envelope>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(CallConfig::default())
    }

    pub fn with_config(config: CallConfig) -> Self {
        test_init();
        let platform = SimPlatform::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let manager = CallManager::new(platform.clone(), LOCAL_USER, "conv-1", outbound_tx, config);
        Self {
            manager,
            platform,
            outbound_rx,
        }
    }

    /// Waits until the event dispatcher has drained everything enqueued
    /// so far.
    pub async fn settle(&self) {
        self.manager.synchronize().await.expect("synchronize");
    }

    pub async fn expect_envelope(&mut self) -> Envelope {
        timeout(Duration::from_secs(1), self.outbound_rx.recv())
            .await
            .expect("timed out waiting for an outbound envelope")
            .expect("outbound channel closed")
    }

    pub fn try_envelope(&mut self) -> Option<Envelope> {
        self.outbound_rx.try_recv().ok()
    }

    pub fn connection(&self) -> SimConnection {
        self.platform
            .last_connection()
            .expect("no peer connection was created")
    }
}

/// Lets freshly spawned tasks run up to their first await point.
pub async fn yield_briefly() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn remote_offer() -> SessionDescription {
    SessionDescription::offer("REMOTE-OFFER")
}

pub fn remote_answer() -> SessionDescription {
    SessionDescription::answer("REMOTE-ANSWER")
}

pub fn candidate(n: u16) -> IceCandidateData {
    IceCandidateData {
        candidate: format!(
            "candidate:{} 1 UDP 2122252543 192.0.2.1 {} typ host",
            n,
            40000 + n
        ),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
    }
}

pub fn incoming_call(call_type: CallMediaType) -> Envelope {
    Envelope::IncomingCall {
        from_transport_id: REMOTE_TRANSPORT.to_string(),
        offer: remote_offer(),
        call_type,
    }
}

pub fn call_answered() -> Envelope {
    Envelope::CallAnswered {
        from_transport_id: REMOTE_TRANSPORT.to_string(),
        answer: remote_answer(),
    }
}
