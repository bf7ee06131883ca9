//! Wallet-side publishing: canonical bytes onto the right topic, with
//! retry on transport back-pressure.
//!
//! Publish is best-effort; `Busy` is the transport's back-pressure signal
//! and must be retried. The retry schedule doubles from `initial_backoff`
//! and gives up at the deadline.

use std::time::Duration;

use tracing::debug;

use credence_core::error::CredenceError;
use credence_core::records::Checkpoint;
use credence_events::Event;
use credence_gossip::{GossipTransport, Topic};

#[derive(Clone, Debug)]
pub struct Publisher {
    initial_backoff: Duration,
    max_attempts: u32,
}

impl Default for Publisher {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(25),
            max_attempts: 6,
        }
    }
}

impl Publisher {
    pub fn new(initial_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            initial_backoff,
            max_attempts,
        }
    }

    /// Publish a signed event on `events/<context>`.
    pub async fn publish_event<T: GossipTransport>(
        &self,
        transport: &T,
        event: &Event,
    ) -> Result<(), CredenceError> {
        let topic = Topic::events(event.context.as_str());
        self.publish_with_backoff(transport, &topic, event.wire_bytes()?)
            .await
    }

    /// Publish a sealed checkpoint on `checkpoints/<tree_id>`.
    pub async fn publish_checkpoint<T: GossipTransport>(
        &self,
        transport: &T,
        checkpoint: &Checkpoint,
    ) -> Result<(), CredenceError> {
        let topic = Topic::checkpoints(checkpoint.tree_id.to_string());
        self.publish_with_backoff(transport, &topic, checkpoint.wire_bytes()?)
            .await
    }

    /// Best-effort publish with exponential back-off on `Busy`.
    pub async fn publish_with_backoff<T: GossipTransport>(
        &self,
        transport: &T,
        topic: &Topic,
        payload: Vec<u8>,
    ) -> Result<(), CredenceError> {
        let mut backoff = self.initial_backoff;
        for attempt in 1..=self.max_attempts {
            match transport.publish(topic, payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    debug!(%topic, attempt, "transport busy; backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
        Err(CredenceError::Busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use credence_core::types::{Context, Epoch};
    use credence_crypto::KeyPair;
    use credence_events::EventKind;
    use credence_gossip::MemoryTransport;

    fn signed_vouch() -> Event {
        let a = KeyPair::from_seed([0x31; 32]);
        let b = KeyPair::from_seed([0x32; 32]);
        let mut ev = Event::new(
            EventKind::Vouch,
            a.id.clone(),
            Some(b.id.clone()),
            Context::Hiring,
            Epoch::new(2025, 9).unwrap(),
            &[5u8; 12],
            Utc.with_ymd_and_hms(2025, 9, 10, 10, 0, 0).unwrap(),
        );
        ev.sign(&a).unwrap();
        ev
    }

    #[tokio::test]
    async fn event_lands_on_its_context_topic() {
        let transport = MemoryTransport::new();
        let mut rx = transport
            .subscribe(&Topic::events("hiring"))
            .await
            .unwrap();
        let event = signed_vouch();
        Publisher::default()
            .publish_event(&transport, &event)
            .await
            .unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.payload, event.wire_bytes().unwrap());
    }

    #[tokio::test]
    async fn busy_transport_is_retried_until_clear() {
        let transport = MemoryTransport::new();
        transport.set_busy(true);
        let publisher = Publisher::new(Duration::from_millis(5), 10);

        let unblock = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            unblock.set_busy(false);
        });

        publisher
            .publish_with_backoff(&transport, &Topic::rules("all"), b"bundle".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn persistent_back_pressure_gives_up_with_busy() {
        let transport = MemoryTransport::new();
        transport.set_busy(true);
        let publisher = Publisher::new(Duration::from_millis(1), 3);
        let err = publisher
            .publish_with_backoff(&transport, &Topic::rules("all"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CredenceError::Busy));
    }
}
