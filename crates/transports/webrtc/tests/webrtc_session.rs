//! Sessions driven over the real WebRTC transport
//!
//! The offline tests only need the local peer connection machinery. The
//! loopback test needs a usable non-loopback interface and is ignored by
//! default: `cargo test -p peerpaste-webrtc -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use peerpaste_core::{
    DescriptionKind, Error, EventKind, IceCandidate, Operation, Phase, Session, SessionEvent,
};
use peerpaste_webrtc::{WebRtcTransportConfig, WebRtcTransportFactory};
use tokio::sync::mpsc::UnboundedReceiver;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,peerpaste_core=debug,peerpaste_webrtc=debug")
        .with_test_writer()
        .try_init();
}

fn local_session() -> Session {
    let factory = WebRtcTransportFactory::new(WebRtcTransportConfig::local_only());
    Session::new(Arc::new(factory))
}

async fn wait_for<F>(events: &mut UnboundedReceiver<SessionEvent>, timeout: Duration, mut predicate: F)
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("observer set was detached");
        if predicate(&event) {
            return;
        }
    }
}

async fn wait_for_phase(session: &Session, phase: Phase, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while session.phase().await != Some(phase) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for phase {}",
            phase
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_offer_negotiates_data_channel() {
    init_logging();
    let session = local_session();

    session.initialize().await.unwrap();
    assert_eq!(session.phase().await, Some(Phase::Fresh));

    session.create_outbound_channel("chat").await.unwrap();
    let offer = session.create_offer().await.unwrap();
    assert_eq!(offer.kind, DescriptionKind::Offer);
    assert!(offer.sdp.contains("m=application"));

    // Generated but not committed: still fresh
    assert_eq!(session.phase().await, Some(Phase::Fresh));

    session.set_local_description().await.unwrap();
    assert_eq!(session.phase().await, Some(Phase::LocalOfferSent));

    let err = session.create_offer().await.unwrap_err();
    assert!(matches!(
        err,
        Error::IllegalPhase {
            operation: Operation::CreateOffer,
            phase: Some(Phase::LocalOfferSent)
        }
    ));
    assert!(session.set_local_description().await.is_err());
    assert!(session.send_message("too early").await.is_err());
}

#[tokio::test]
async fn test_answerer_gating() {
    init_logging();
    let offerer = local_session();
    offerer.initialize().await.unwrap();
    offerer.create_outbound_channel("chat").await.unwrap();
    offerer.create_offer().await.unwrap();
    offerer.set_local_description().await.unwrap();
    let offer = offerer.local_description().await.unwrap();

    let answerer = local_session();
    answerer.initialize().await.unwrap();
    answerer.apply_remote_description(&offer).await.unwrap();
    assert_eq!(answerer.phase().await, Some(Phase::RemoteOfferPending));

    // Candidates first
    assert!(matches!(
        answerer.create_answer().await,
        Err(Error::IllegalPhase { .. })
    ));
    assert_eq!(answerer.apply_remote_candidates(&[]).await.unwrap(), 0);
    assert!(answerer.apply_remote_candidates(&[]).await.is_err());

    let answer = answerer.create_answer().await.unwrap();
    assert_eq!(answer.kind, DescriptionKind::Answer);
    answerer.set_local_description().await.unwrap();

    let phase = answerer.phase().await;
    assert!(
        matches!(
            phase,
            Some(Phase::AnswerAcceptancePending) | Some(Phase::Connected)
        ),
        "unexpected phase {:?}",
        phase
    );

    offerer.clear_observers();
    answerer.clear_observers();
}

#[tokio::test]
async fn test_malformed_remote_input_is_transport_failure() {
    init_logging();
    let session = local_session();
    session.initialize().await.unwrap();

    let garbage = peerpaste_core::SessionDescription::offer("not an sdp");
    let err = session.apply_remote_description(&garbage).await.unwrap_err();
    assert!(err.is_transport_error(), "unexpected error {:?}", err);
    assert_eq!(session.phase().await, Some(Phase::Fresh));

    // A real offer, then a rejected candidate
    let offerer = local_session();
    offerer.initialize().await.unwrap();
    offerer.create_outbound_channel("chat").await.unwrap();
    offerer.create_offer().await.unwrap();
    offerer.set_local_description().await.unwrap();
    let offer = offerer.local_description().await.unwrap();

    session.apply_remote_description(&offer).await.unwrap();
    let err = session
        .apply_remote_candidates(&[IceCandidate::new("candidate:garbage")])
        .await
        .unwrap_err();
    assert!(err.is_transport_error(), "unexpected error {:?}", err);
    assert!(!session.snapshot().await.remote_candidates_applied);
}

#[tokio::test]
#[ignore = "needs a non-loopback network interface"]
async fn test_loopback_session_exchanges_messages() {
    init_logging();
    let timeout = Duration::from_secs(15);

    let a = local_session();
    let b = local_session();
    let mut a_events = a.subscribe();
    let mut b_events = b.subscribe();

    a.initialize().await.unwrap();
    a.create_outbound_channel("chat").await.unwrap();
    a.create_offer().await.unwrap();
    a.set_local_description().await.unwrap();
    wait_for(&mut a_events, timeout, |e| {
        matches!(e.kind, EventKind::LocalCandidateGenerated(_))
    })
    .await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let offer = a.exchange_payload().await.unwrap();

    b.initialize().await.unwrap();
    b.apply_remote_description(&offer.description).await.unwrap();
    b.apply_remote_candidates(&offer.candidates).await.unwrap();
    b.create_outbound_channel("reply").await.unwrap();
    b.create_answer().await.unwrap();
    b.set_local_description().await.unwrap();
    let answer = b.exchange_payload().await.unwrap();

    a.apply_remote_description(&answer.description).await.unwrap();

    wait_for_phase(&a, Phase::Connected, timeout).await;
    wait_for_phase(&b, Phase::Connected, timeout).await;
    wait_for(&mut a_events, timeout, |e| {
        matches!(&e.kind, EventKind::ChannelOpened(c) if c.label == "chat")
    })
    .await;

    a.send_message("hello").await.unwrap();
    wait_for(&mut b_events, timeout, |e| {
        matches!(&e.kind, EventKind::MessageReceived { message, .. } if message.as_text() == Some("hello"))
    })
    .await;

    a.close_connection().await.unwrap();
    assert_eq!(a.phase().await, Some(Phase::Closed));
    wait_for(&mut b_events, Duration::from_secs(60), |e| {
        matches!(e.kind, EventKind::RemotePeerClosed)
    })
    .await;
    assert_eq!(b.phase().await, Some(Phase::Closed));
}
