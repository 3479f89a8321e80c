//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Common error codes.

use thiserror::Error;

/// Platform independent error conditions.
#[derive(Error, Debug)]
pub enum CallError {
    // Project wide common error codes
    #[error("Mutex poisoned: {0}")]
    MutexPoisoned(String),

    // Call manager error codes
    #[error("Active call already in progress")]
    CallAlreadyInProgress,
    #[error("No active call found")]
    NoActiveCall,
    #[error("No incoming call to accept")]
    NoIncomingCall,

    // Negotiation error codes
    #[error("Peer connection reported a fatal error: {0}")]
    NegotiationFailed(String),
    #[error("Negotiation timed out before media arrived")]
    NegotiationTimedOut,
    #[error("Invalid session description: {0}")]
    InvalidSessionDescription(String),

    // Relay error codes
    #[error("Invalid relay endpoint: {0}")]
    InvalidRelayEndpoint(String),
}

/// Local media acquisition failures. These abort `start`/`accept` without
/// any signaling reaching the remote party.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaError {
    #[error("Media permission denied")]
    PermissionDenied,
    #[error("Media device unavailable")]
    DeviceUnavailable,
}
