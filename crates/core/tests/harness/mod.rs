//! Shared helpers for session integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use peerpaste_core::mock::MockNetwork;
use peerpaste_core::{EventKind, ExchangePayload, Phase, Session, SessionEvent};
use tokio::sync::mpsc::UnboundedReceiver;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Initialize test logging (safe to call from every test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,peerpaste_core=debug")
        .with_test_writer()
        .try_init();
}

/// A session plus the receiving end of its observer set
pub struct Peer {
    pub session: Session,
    pub events: UnboundedReceiver<SessionEvent>,
}

impl Peer {
    pub fn new(network: &MockNetwork) -> Self {
        let session = Session::new(Arc::new(network.factory()));
        let events = session.subscribe();
        Self { session, events }
    }

    /// Wait for the first event matching `predicate`, skipping others
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        loop {
            let event = tokio::time::timeout_at(deadline, self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("observer set was detached");
            if predicate(&event) {
                return event;
            }
        }
    }

    /// Wait until the session reaches `phase`
    pub async fn wait_for_phase(&self, phase: Phase) {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        while self.session.phase().await != Some(phase) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for phase {}",
                phase
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until `count` local candidates were accumulated
    pub async fn wait_for_candidates(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        while self.session.local_candidates().await.len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} local candidates",
                count
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Count recorded events of one kind
    pub fn history_count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&EventKind) -> bool,
    {
        self.session
            .event_history()
            .iter()
            .filter(|e| predicate(&e.kind))
            .count()
    }
}

/// Drive the offerer side up to a committed offer with one channel
pub async fn prepare_offer(offerer: &Peer, label: &str) -> ExchangePayload {
    offerer.session.initialize().await.unwrap();
    offerer.session.create_outbound_channel(label).await.unwrap();
    offerer.session.create_offer().await.unwrap();
    offerer.session.set_local_description().await.unwrap();
    offerer.wait_for_candidates(1).await;
    offerer.session.exchange_payload().await.unwrap()
}

/// Drive the answerer side from a pasted offer to a committed answer
pub async fn prepare_answer(answerer: &Peer, offer: &ExchangePayload) -> ExchangePayload {
    answerer.session.initialize().await.unwrap();
    answerer
        .session
        .apply_remote_description(&offer.description)
        .await
        .unwrap();
    answerer
        .session
        .apply_remote_candidates(&offer.candidates)
        .await
        .unwrap();
    answerer.session.create_answer().await.unwrap();
    answerer.session.set_local_description().await.unwrap();
    answerer.session.exchange_payload().await.unwrap()
}

/// Full manual exchange; returns once both peers are connected
pub async fn connect(a: &Peer, b: &Peer) {
    let offer = prepare_offer(a, "chat").await;
    // Round-trip through the paste token like a person would
    let offer = ExchangePayload::decode(&offer.encode().unwrap()).unwrap();
    let answer = prepare_answer(b, &offer).await;
    a.session
        .apply_remote_description(&answer.description)
        .await
        .unwrap();

    a.wait_for_phase(Phase::Connected).await;
    b.wait_for_phase(Phase::Connected).await;
}
