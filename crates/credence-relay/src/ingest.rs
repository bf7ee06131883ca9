//! The relay ingest pipeline: validate → persist → enqueue leaf.
//!
//! A relay consumes raw event bytes from gossip, runs the full validation
//! pipeline, persists blob + indexes atomically, and submits the leaf to
//! the log appender. Duplicate gossip is dropped silently; every other
//! rejection is surfaced to the caller (and merely logged when pulled from
//! a gossip loop).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use credence_core::error::CredenceError;
use credence_core::types::{ContentAddress, Context, LeafIndex};
use credence_events::{Event, Validator};
use credence_gossip::{GossipTransport, Topic};
use credence_log::LogHandle;
use credence_store::EventStore;

/// A successfully ingested event.
#[derive(Clone, Debug)]
pub struct IngestOutcome {
    pub address: ContentAddress,
    pub leaf_index: LeafIndex,
}

pub struct Relay {
    validator: Validator,
    store: Arc<dyn EventStore>,
    log: LogHandle,
    append_deadline: Duration,
}

impl Relay {
    pub fn new(store: Arc<dyn EventStore>, log: LogHandle) -> Self {
        Self {
            validator: Validator::default(),
            store,
            log,
            append_deadline: Duration::from_secs(10),
        }
    }

    pub fn with_append_deadline(mut self, deadline: Duration) -> Self {
        self.append_deadline = deadline;
        self
    }

    /// Run one event through the full pipeline.
    pub async fn ingest(&self, bytes: &[u8]) -> Result<IngestOutcome, CredenceError> {
        self.ingest_at(bytes, Utc::now()).await
    }

    /// Clock-explicit variant used by tests.
    pub async fn ingest_at(
        &self,
        bytes: &[u8],
        now: chrono::DateTime<Utc>,
    ) -> Result<IngestOutcome, CredenceError> {
        let event = self.validator.validate_bytes(bytes, now)?;
        self.commit(&event).await
    }

    /// Persist a validated event and append its leaf.
    pub async fn commit(&self, event: &Event) -> Result<IngestOutcome, CredenceError> {
        let address = self.store.put_event(event)?;
        let leaf = event.leaf()?;
        let indices = self.log.queue(vec![leaf], self.append_deadline).await?;
        let leaf_index = indices[0];
        debug!(%address, leaf_index, kind = %event.kind, "event ingested");
        Ok(IngestOutcome { address, leaf_index })
    }

    /// Consume an event topic until the transport closes it. Duplicates
    /// are dropped silently; invalid events are logged and dropped.
    pub async fn serve<T: GossipTransport>(
        &self,
        transport: &T,
        context: Context,
    ) -> Result<(), CredenceError> {
        let topic = Topic::events(context.as_str());
        let mut rx = transport.subscribe(&topic).await?;
        info!(%topic, "relay consuming events");
        while let Some(message) = rx.recv().await {
            match self.ingest(&message.payload).await {
                Ok(outcome) => {
                    debug!(address = %outcome.address, leaf = outcome.leaf_index, "accepted");
                }
                Err(CredenceError::DuplicateEvent(_)) => {
                    // Replayed gossip; drop without noise.
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "event rejected"),
            }
        }
        Ok(())
    }
}
