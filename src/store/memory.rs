//! In-memory event store.
//!
//! [`Store`] is a thread-safe, process-local implementation of
//! [`EventStore`](super::EventStore) suitable for unit tests, examples, and
//! single-process demonstrations. There is no durability: dropping the store
//! drops the log.
//!
//! # Example
//!
//! ```
//! use refold::store::memory;
//!
//! let store: memory::Store<String, ()> = memory::Store::new();
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::Utc;
use nonempty::NonEmpty;

use crate::{
    concurrency::ConcurrencyConflict,
    event::EventKind,
    store::{
        CommitError, Committed, EventFilter, EventStore, LoadEventsResult, OptimisticCommitError,
        StoredEvent, StreamKey,
    },
};

/// In-memory event store backed by a single append-ordered log.
///
/// The log preserves global append order, so cross-aggregate projections see
/// events interleaved chronologically. Per-stream versions (event counts) are
/// tracked alongside for optimistic concurrency checks; sequence numbers are
/// assigned per stream, zero-based and gap-free.
///
/// Generic over:
/// - `Id`: aggregate identifier type (must be hashable/equatable)
/// - `M`: metadata type (use `()` when not needed)
#[derive(Clone)]
pub struct Store<Id, M> {
    inner: Arc<RwLock<Inner<Id, M>>>,
}

struct Inner<Id, M> {
    log: Vec<StoredEvent<Id, M>>,
    versions: HashMap<StreamKey<Id>, u64>,
}

impl<Id, M> Store<Id, M> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                log: Vec::new(),
                versions: HashMap::new(),
            })),
        }
    }
}

impl<Id, M> Default for Store<Id, M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for the in-memory store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// An event payload could not be serialized to JSON.
    #[error("serialization error: {0}")]
    Serialization(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// A stored payload could not be deserialized into the requested type.
    #[error("deserialization error: {0}")]
    Deserialization(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl<Id, M> Inner<Id, M>
where
    Id: Clone + Eq + std::hash::Hash,
    M: Clone,
{
    /// Append pre-serialized events to a stream and return its new version.
    ///
    /// Sequence numbers continue from the stream's current event count, so
    /// the invariant `version == event count` holds after every append.
    fn append_staged(
        &mut self,
        aggregate_kind: &str,
        aggregate_id: &Id,
        staged: Vec<(String, serde_json::Value)>,
        metadata: &M,
    ) -> u64 {
        let key = StreamKey::new(aggregate_kind, aggregate_id.clone());
        let version = self.versions.entry(key).or_insert(0);
        let recorded_at = Utc::now();

        for (kind, data) in staged {
            self.log.push(StoredEvent {
                aggregate_kind: aggregate_kind.to_string(),
                aggregate_id: aggregate_id.clone(),
                kind,
                sequence: *version,
                recorded_at,
                data,
                metadata: metadata.clone(),
            });
            *version += 1;
        }

        *version
    }
}

fn stage_events<E>(events: &NonEmpty<E>) -> Result<Vec<(String, serde_json::Value)>, (usize, MemoryError)>
where
    E: EventKind + serde::Serialize,
{
    let mut staged = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        let data = serde_json::to_value(event)
            .map_err(|e| (index, MemoryError::Serialization(Box::new(e))))?;
        staged.push((event.kind().to_string(), data));
    }
    Ok(staged)
}

impl<Id, M> EventStore for Store<Id, M>
where
    Id: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    M: Clone + Send + Sync + 'static,
{
    type Error = MemoryError;
    type Id = Id;
    type Metadata = M;

    fn decode_event<E>(&self, stored: &StoredEvent<Self::Id, Self::Metadata>) -> Result<E, Self::Error>
    where
        E: crate::event::DomainEvent + serde::de::DeserializeOwned,
    {
        serde_json::from_value(stored.data.clone())
            .map_err(|e| MemoryError::Deserialization(Box::new(e)))
    }

    #[tracing::instrument(skip(self, aggregate_id))]
    fn stream_version<'a>(
        &'a self,
        aggregate_kind: &'a str,
        aggregate_id: &'a Self::Id,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a {
        let key = StreamKey::new(aggregate_kind, aggregate_id.clone());
        let version = {
            let inner = self.inner.read().expect("in-memory store lock poisoned");
            inner.versions.get(&key).copied().unwrap_or(0)
        };
        tracing::trace!(version, "retrieved stream version");
        std::future::ready(Ok(version))
    }

    #[tracing::instrument(skip(self, aggregate_id, events, metadata), fields(event_count = events.len()))]
    fn commit_events<'a, E>(
        &'a self,
        aggregate_kind: &'a str,
        aggregate_id: &'a Self::Id,
        events: NonEmpty<E>,
        metadata: &'a Self::Metadata,
    ) -> impl Future<Output = Result<Committed, CommitError<Self::Error>>> + Send + 'a
    where
        E: EventKind + serde::Serialize + Send + Sync + 'a,
        Self::Metadata: Clone,
    {
        let result = (|| {
            // Serialize outside the lock; a bad payload must not append anything.
            let staged = stage_events(&events)
                .map_err(|(index, source)| CommitError::Serialization { index, source })?;

            let mut inner = self.inner.write().expect("in-memory store lock poisoned");
            let version = inner.append_staged(aggregate_kind, aggregate_id, staged, metadata);
            drop(inner);

            tracing::debug!(events_appended = events.len(), version, "events committed");
            Ok(Committed { version })
        })();

        std::future::ready(result)
    }

    #[tracing::instrument(skip(self, aggregate_id, events, metadata), fields(event_count = events.len()))]
    fn commit_events_optimistic<'a, E>(
        &'a self,
        aggregate_kind: &'a str,
        aggregate_id: &'a Self::Id,
        expected_version: u64,
        events: NonEmpty<E>,
        metadata: &'a Self::Metadata,
    ) -> impl Future<Output = Result<Committed, OptimisticCommitError<Self::Error>>> + Send + 'a
    where
        E: EventKind + serde::Serialize + Send + Sync + 'a,
        Self::Metadata: Clone,
    {
        let result = (|| {
            let staged = stage_events(&events)
                .map_err(|(index, source)| OptimisticCommitError::Serialization { index, source })?;

            let mut inner = self.inner.write().expect("in-memory store lock poisoned");

            // Compare-and-append: the stored event count must still equal the
            // version the caller read at load time.
            let key = StreamKey::new(aggregate_kind, aggregate_id.clone());
            let actual = inner.versions.get(&key).copied().unwrap_or(0);
            if actual != expected_version {
                drop(inner);
                tracing::debug!(
                    expected = expected_version,
                    actual,
                    "version mismatch, rejecting commit"
                );
                return Err(ConcurrencyConflict {
                    expected: expected_version,
                    actual,
                }
                .into());
            }

            let version = inner.append_staged(aggregate_kind, aggregate_id, staged, metadata);
            drop(inner);

            tracing::debug!(
                events_appended = events.len(),
                version,
                "events committed (optimistic)"
            );
            Ok(Committed { version })
        })();

        std::future::ready(result)
    }

    #[tracing::instrument(skip(self, filters), fields(filter_count = filters.len()))]
    fn load_events<'a>(
        &'a self,
        filters: &'a [EventFilter<Self::Id>],
    ) -> impl Future<Output = LoadEventsResult<Self::Id, Self::Metadata, Self::Error>> + Send + 'a
    {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        // The log is already in global append order; overlapping filters
        // cannot duplicate an event because each log entry is visited once.
        let result: Vec<_> = inner
            .log
            .iter()
            .filter(|event| filters.iter().any(|f| f.matches(event)))
            .cloned()
            .collect();
        drop(inner);

        tracing::debug!(events_loaded = result.len(), "loaded events from store");
        std::future::ready(Ok(result))
    }
}
