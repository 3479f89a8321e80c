//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Tests for incoming calls, driven from the callee's side.

mod common;

use common::{candidate, incoming_call, remote_offer, yield_briefly, TestContext, REMOTE_TRANSPORT};
use peercall::common::{CallMediaType, CallState};
use peercall::core::signaling::Envelope;
use peercall::error::{CallError, MediaError};

/// Delivers an inbound offer and asserts the session is ringing.
async fn ring(cx: &mut TestContext, call_type: CallMediaType) {
    cx.manager
        .received_envelope(incoming_call(call_type))
        .await
        .unwrap();
    assert_eq!(cx.manager.state().state, CallState::Ringing);
}

#[tokio::test]
async fn inbound_offer_rings_without_acquiring_media() {
    let mut cx = TestContext::new();
    ring(&mut cx, CallMediaType::Video).await;

    let snapshot = cx.manager.state();
    assert_eq!(snapshot.call_type, Some(CallMediaType::Video));
    // Nothing touches devices or the network until the user accepts.
    assert!(cx.platform.last_stream().is_none());
    assert_eq!(cx.platform.connections_created(), 0);
    assert!(cx.try_envelope().is_none());
}

#[tokio::test]
async fn accept_answers_and_connects() {
    let mut cx = TestContext::new();
    ring(&mut cx, CallMediaType::Voice).await;

    assert!(cx.manager.accept().await.unwrap());
    cx.settle().await;

    match cx.expect_envelope().await {
        Envelope::AnswerCall {
            to_transport_id,
            answer,
        } => {
            assert_eq!(to_transport_id, REMOTE_TRANSPORT);
            assert_eq!(answer.kind, "answer");
        }
        other => panic!("unexpected envelope: {}", other),
    }

    // Answered, but not connected until remote media arrives.
    assert_eq!(cx.manager.state().state, CallState::Ringing);
    assert_eq!(cx.connection().received_offers(), vec![remote_offer()]);

    cx.connection().inject_remote_stream();
    cx.settle().await;

    let snapshot = cx.manager.state();
    assert_eq!(snapshot.state, CallState::Connected);
    assert!(snapshot.has_remote_stream);
    // A callee never rings anyone.
    assert!(cx.try_envelope().is_none());
}

#[tokio::test]
async fn accept_without_incoming_call_is_rejected() {
    let cx = TestContext::new();
    let err = cx.manager.accept().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CallError>(),
        Some(CallError::NoIncomingCall)
    ));
}

#[tokio::test]
async fn second_accept_during_media_acquisition_is_rejected() {
    let mut cx = TestContext::new();
    ring(&mut cx, CallMediaType::Voice).await;

    cx.platform.stall_next_media();
    let manager = cx.manager.clone();
    let accept_task = tokio::spawn(async move { manager.accept().await });
    yield_briefly().await;

    // The first accept claimed the offer; there is nothing left to accept.
    let err = cx.manager.accept().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CallError>(),
        Some(CallError::NoIncomingCall)
    ));

    cx.platform.release_media_gate();
    assert!(accept_task.await.unwrap().unwrap());
    cx.settle().await;

    // Exactly one session's worth of resources exists.
    assert_eq!(cx.platform.connections_created(), 1);
    assert!(matches!(
        cx.expect_envelope().await,
        Envelope::AnswerCall { .. }
    ));

    cx.manager.end().await.unwrap();
    assert!(cx.connection().is_closed());
    assert!(cx.platform.last_stream().unwrap().is_released());
}

#[tokio::test]
async fn accept_media_failure_abandons_the_call() {
    let mut cx = TestContext::new();
    ring(&mut cx, CallMediaType::Video).await;
    cx.platform.fail_next_media(MediaError::DeviceUnavailable);

    assert!(!cx.manager.accept().await.unwrap());
    cx.settle().await;

    assert_eq!(cx.manager.state().state, CallState::Idle);
    assert_eq!(cx.platform.connections_created(), 0);
    // The caller learns of the failure only through its own timeout.
    assert!(cx.try_envelope().is_none());
}

#[tokio::test]
async fn early_remote_candidates_apply_after_accept() {
    let mut cx = TestContext::new();
    ring(&mut cx, CallMediaType::Voice).await;

    // Trickled ahead of the accept; nowhere to put them yet.
    for n in 0..2 {
        cx.manager
            .received_envelope(Envelope::IceCandidate {
                to_transport_id: None,
                from_transport_id: Some(REMOTE_TRANSPORT.to_string()),
                candidate: candidate(n),
            })
            .await
            .unwrap();
    }
    assert_eq!(cx.platform.connections_created(), 0);

    assert!(cx.manager.accept().await.unwrap());
    cx.settle().await;
    assert_eq!(cx.connection().remote_candidates().len(), 2);

    // Late candidates now apply directly.
    cx.manager
        .received_envelope(Envelope::IceCandidate {
            to_transport_id: None,
            from_transport_id: Some(REMOTE_TRANSPORT.to_string()),
            candidate: candidate(2),
        })
        .await
        .unwrap();
    assert_eq!(cx.connection().remote_candidates().len(), 3);
}

#[tokio::test]
async fn candidates_without_a_call_are_dropped() {
    let mut cx = TestContext::new();
    cx.manager
        .received_envelope(Envelope::IceCandidate {
            to_transport_id: None,
            from_transport_id: Some(REMOTE_TRANSPORT.to_string()),
            candidate: candidate(0),
        })
        .await
        .unwrap();
    assert_eq!(cx.manager.state().state, CallState::Idle);
    assert!(cx.try_envelope().is_none());
}

#[tokio::test]
async fn remote_hangup_while_ringing_returns_to_idle() {
    let mut cx = TestContext::new();
    ring(&mut cx, CallMediaType::Voice).await;

    cx.manager
        .received_envelope(Envelope::CallEnded {
            to_transport_id: None,
        })
        .await
        .unwrap();

    assert_eq!(cx.manager.state().state, CallState::Idle);
    assert!(cx.try_envelope().is_none());

    // The retained offer went with the session.
    let err = cx.manager.accept().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CallError>(),
        Some(CallError::NoIncomingCall)
    ));
}

#[tokio::test]
async fn decline_by_hanging_up_notifies_the_caller() {
    let mut cx = TestContext::new();
    ring(&mut cx, CallMediaType::Voice).await;

    cx.manager.end().await.unwrap();

    // The offer carried the caller's transport id, so the decline routes.
    match cx.expect_envelope().await {
        Envelope::CallEnded { to_transport_id } => {
            assert_eq!(to_transport_id.as_deref(), Some(REMOTE_TRANSPORT));
        }
        other => panic!("unexpected envelope: {}", other),
    }
    assert_eq!(cx.manager.state().state, CallState::Idle);
}

#[tokio::test]
async fn second_incoming_call_is_ignored_while_ringing() {
    let mut cx = TestContext::new();
    ring(&mut cx, CallMediaType::Voice).await;

    cx.manager
        .received_envelope(Envelope::IncomingCall {
            from_transport_id: "t-other".to_string(),
            offer: remote_offer(),
            call_type: CallMediaType::Video,
        })
        .await
        .unwrap();

    // Still the first call, untouched.
    let snapshot = cx.manager.state();
    assert_eq!(snapshot.state, CallState::Ringing);
    assert_eq!(snapshot.call_type, Some(CallMediaType::Voice));

    assert!(cx.manager.accept().await.unwrap());
    cx.settle().await;
    match cx.expect_envelope().await {
        Envelope::AnswerCall {
            to_transport_id, ..
        } => assert_eq!(to_transport_id, REMOTE_TRANSPORT),
        other => panic!("unexpected envelope: {}", other),
    }
}
