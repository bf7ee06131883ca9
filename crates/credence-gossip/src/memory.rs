//! In-process transport for tests and single-node runs.
//!
//! Same contract as the network transport: best-effort publish with
//! `Busy` back-pressure, point-to-point blob fetch with a deadline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use credence_core::error::CredenceError;
use credence_core::types::ContentAddress;

use crate::topic::Topic;
use crate::{GossipMessage, GossipTransport};

#[derive(Default)]
struct Inner {
    subscribers: Mutex<HashMap<Topic, Vec<mpsc::Sender<GossipMessage>>>>,
    blobs: Mutex<HashMap<ContentAddress, Vec<u8>>>,
    busy: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make publish report `Busy` until cleared; drives back-off tests.
    pub fn set_busy(&self, busy: bool) {
        self.inner.busy.store(busy, Ordering::SeqCst);
    }

    /// Seed a blob that `fetch` can serve.
    pub fn insert_blob(&self, bytes: Vec<u8>) -> ContentAddress {
        let addr = credence_core::canonical::content_address_of_bytes(&bytes);
        self.inner.blobs.lock().unwrap().insert(addr, bytes);
        addr
    }
}

impl GossipTransport for MemoryTransport {
    async fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), CredenceError> {
        if self.inner.busy.load(Ordering::SeqCst) {
            return Err(CredenceError::Busy);
        }
        let message = GossipMessage {
            topic: topic.clone(),
            payload,
        };
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        if let Some(list) = subscribers.get_mut(topic) {
            // Best-effort: a full or closed subscriber just misses out.
            list.retain(|tx| !tx.is_closed());
            for tx in list.iter() {
                let _ = tx.try_send(message.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &Topic,
    ) -> Result<mpsc::Receiver<GossipMessage>, CredenceError> {
        let (tx, rx) = mpsc::channel(256);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .entry(topic.clone())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn fetch(
        &self,
        addr: &ContentAddress,
        deadline: Duration,
    ) -> Result<Vec<u8>, CredenceError> {
        if let Some(bytes) = self.inner.blobs.lock().unwrap().get(addr) {
            return Ok(bytes.clone());
        }
        tokio::time::sleep(deadline).await;
        // One more look after the wait so racing inserts still land.
        self.inner
            .blobs
            .lock()
            .unwrap()
            .get(addr)
            .cloned()
            .ok_or_else(|| CredenceError::Timeout(deadline.as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers_per_topic() {
        let transport = MemoryTransport::new();
        let topic = Topic::events("commerce");
        let mut rx = transport.subscribe(&topic).await.unwrap();
        let other = Topic::events("hiring");
        let mut other_rx = transport.subscribe(&other).await.unwrap();

        transport.publish(&topic, b"hello".to_vec()).await.unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.payload, b"hello");
        assert!(other_rx.try_recv().is_err(), "other topics stay quiet");
    }

    #[tokio::test]
    async fn busy_transport_surfaces_back_pressure() {
        let transport = MemoryTransport::new();
        transport.set_busy(true);
        let err = transport
            .publish(&Topic::rules("all"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CredenceError::Busy));
        assert!(err.is_retryable());

        transport.set_busy(false);
        transport.publish(&Topic::rules("all"), vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn fetch_serves_blobs_or_times_out() {
        let transport = MemoryTransport::new();
        let addr = transport.insert_blob(b"blob".to_vec());
        let got = transport
            .fetch(&addr, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(got, b"blob");

        let missing = credence_core::canonical::content_address_of_bytes(b"missing");
        let err = transport
            .fetch(&missing, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, CredenceError::Timeout(_)));
    }
}
