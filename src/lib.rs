//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! # PeerCall -- a peer-to-peer call core
//!
//! This crate implements the real-time call subsystem embedded in a chat
//! feature: a reconnecting signaling client, a WebRTC peer-connection
//! wrapper, local media acquisition, and the call state machine that ties
//! them together. It establishes direct one-to-one audio/video calls; the
//! surrounding chat UI only invokes the verbs on [`CallManager`] and renders
//! the observable call state.
//!
//! Typical wiring:
//!
//! ```no_run
//! use peercall::config::CallConfig;
//! use peercall::core::call_manager::CallManager;
//! use peercall::relay::SignalingClient;
//! use peercall::rtc::native::NativePlatform;
//! use tokio::sync::mpsc;
//!
//! # async fn wire() -> anyhow::Result<()> {
//! let config = CallConfig::from_env();
//! let platform = NativePlatform::new(&config)?;
//!
//! let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
//! let relay = SignalingClient::connect(&config, "user-1", "conv-1", inbound_tx)?;
//!
//! let manager = CallManager::new(platform, "user-1", "conv-1", relay.sender(), config);
//! manager.attach_signaling(inbound_rx);
//! # Ok(())
//! # }
//! ```
//!
//! [`CallManager`]: core::call_manager::CallManager

#[macro_use]
extern crate log;

pub mod common;
pub mod config;
pub mod error;

/// Core, platform independent functionality.
pub mod core {
    pub mod call_manager;
    pub mod call_mutex;
    pub mod platform;
    pub mod session;
    pub mod signaling;
}

/// The signaling relay transport.
pub mod relay;

/// Peer connection and media backends.
pub mod rtc {
    pub mod native;
}

/// Scripted backend for tests; no devices, no network.
pub mod sim {
    pub mod sim_platform;
}
