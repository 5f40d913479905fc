//! Persistence layer abstractions.
//!
//! This module describes the storage contract ([`EventStore`]), the stored
//! event record, load filters, and commit outcomes. The reference in-memory
//! implementation lives in [`memory`].
//!
//! A stream's *version* is the number of events it contains. Sequence numbers
//! are zero-based and gap-free within a stream, so the version of a stream is
//! always one past the sequence number of its latest event.

use std::future::Future;

use chrono::{DateTime, Utc};
pub use nonempty::NonEmpty;
use thiserror::Error;

use crate::{concurrency::ConcurrencyConflict, event::EventKind};

pub mod memory;

/// Event materialized from the store.
///
/// Generic parameters:
/// - `Id`: aggregate identifier type
/// - `M`: metadata type (use `()` when not needed)
///
/// Payloads are stored as `serde_json::Value`; [`EventStore::decode_event`]
/// turns them back into typed domain events.
#[derive(Clone, Debug)]
pub struct StoredEvent<Id, M> {
    /// The aggregate type identifier ([`Aggregate::KIND`](crate::aggregate::Aggregate::KIND)).
    pub aggregate_kind: String,
    /// The aggregate instance identifier.
    pub aggregate_id: Id,
    /// The event kind ([`DomainEvent::KIND`](crate::event::DomainEvent::KIND)).
    pub kind: String,
    /// Zero-based, gap-free position within the aggregate's stream.
    pub sequence: u64,
    /// When the store accepted the event.
    pub recorded_at: DateTime<Utc>,
    /// The serialized event payload.
    pub data: serde_json::Value,
    /// Infrastructure metadata attached at commit time.
    pub metadata: M,
}

/// Convenience alias for event batches loaded from a store.
pub type LoadEventsResult<Id, M, Err> = Result<Vec<StoredEvent<Id, M>>, Err>;

/// Filter describing which events should be loaded from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFilter<Id> {
    /// Restrict to one event kind. `None` matches any.
    pub event_kind: Option<String>,
    /// Restrict to one aggregate type. `None` matches any.
    pub aggregate_kind: Option<String>,
    /// Restrict to one aggregate instance. `None` matches any.
    pub aggregate_id: Option<Id>,
}

impl<Id> EventFilter<Id> {
    /// Load all events of the specified kind across every aggregate.
    #[must_use]
    pub fn for_event(kind: impl Into<String>) -> Self {
        Self {
            event_kind: Some(kind.into()),
            aggregate_kind: None,
            aggregate_id: None,
        }
    }

    /// Load events of the specified kind for a single aggregate instance.
    #[must_use]
    pub fn for_aggregate(
        event_kind: impl Into<String>,
        aggregate_kind: impl Into<String>,
        aggregate_id: impl Into<Id>,
    ) -> Self {
        Self {
            event_kind: Some(event_kind.into()),
            aggregate_kind: Some(aggregate_kind.into()),
            aggregate_id: Some(aggregate_id.into()),
        }
    }

    /// Load an aggregate instance's entire stream, regardless of event kind.
    ///
    /// This is what aggregate rebuilds use: the whole stream is replayed, so
    /// an event kind the aggregate cannot fold surfaces as a decode failure
    /// instead of being silently skipped.
    #[must_use]
    pub fn for_stream(aggregate_kind: impl Into<String>, aggregate_id: impl Into<Id>) -> Self {
        Self {
            event_kind: None,
            aggregate_kind: Some(aggregate_kind.into()),
            aggregate_id: Some(aggregate_id.into()),
        }
    }

    /// Whether a stored event satisfies this filter.
    #[must_use]
    pub fn matches<M>(&self, event: &StoredEvent<Id, M>) -> bool
    where
        Id: PartialEq,
    {
        self.event_kind
            .as_ref()
            .is_none_or(|kind| *kind == event.kind)
            && self
                .aggregate_kind
                .as_ref()
                .is_none_or(|kind| *kind == event.aggregate_kind)
            && self
                .aggregate_id
                .as_ref()
                .is_none_or(|id| *id == event.aggregate_id)
    }
}

/// Result of a successful commit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Committed {
    /// The stream version after the append (its new event count).
    pub version: u64,
}

/// Error from commits without version checking.
#[derive(Debug, Error)]
pub enum CommitError<StoreError>
where
    StoreError: std::error::Error,
{
    /// An event in the batch could not be serialized. Nothing was appended.
    #[error("failed to serialize event at index {index}: {source}")]
    Serialization {
        /// Position of the offending event within the batch.
        index: usize,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

/// Error from commits with optimistic version checking.
#[derive(Debug, Error)]
pub enum OptimisticCommitError<StoreError>
where
    StoreError: std::error::Error,
{
    /// The stream's stored event count no longer matches the expected
    /// version. Nothing was appended.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// An event in the batch could not be serialized. Nothing was appended.
    #[error("failed to serialize event at index {index}: {source}")]
    Serialization {
        /// Position of the offending event within the batch.
        index: usize,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

/// Abstraction over the persistence layer for event streams.
///
/// The log is append-only: stores never expose mutation or deletion of
/// existing events. Associated types let stores customize their behavior:
/// - `Id`: aggregate identifier type
/// - `Metadata`: infrastructure metadata (causation tracking, actors, etc.)
pub trait EventStore: Send + Sync {
    /// Aggregate identifier type.
    ///
    /// Must be clonable so repositories can reuse ids across calls. Common
    /// choices: `String`, `Uuid`, or custom id types.
    type Id: Clone + Send + Sync + 'static;

    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Metadata type for infrastructure concerns.
    type Metadata: Send + Sync + 'static;

    /// Decode a stored event payload into a typed domain event.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the payload cannot be
    /// deserialized into `E`.
    fn decode_event<E>(&self, stored: &StoredEvent<Self::Id, Self::Metadata>) -> Result<E, Self::Error>
    where
        E: crate::event::DomainEvent + serde::de::DeserializeOwned;

    /// Get the current version (stored event count) of an aggregate stream.
    ///
    /// Returns `0` for streams with no events.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn stream_version<'a>(
        &'a self,
        aggregate_kind: &'a str,
        aggregate_id: &'a Self::Id,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

    /// Append events without version checking (last writer wins).
    ///
    /// The batch is appended atomically: either every event is persisted, or
    /// none is.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Serialization`] if an event cannot be encoded,
    /// or [`CommitError::Store`] if persistence fails.
    fn commit_events<'a, E>(
        &'a self,
        aggregate_kind: &'a str,
        aggregate_id: &'a Self::Id,
        events: NonEmpty<E>,
        metadata: &'a Self::Metadata,
    ) -> impl Future<Output = Result<Committed, CommitError<Self::Error>>> + Send + 'a
    where
        E: EventKind + serde::Serialize + Send + Sync + 'a,
        Self::Metadata: Clone;

    /// Append events only if the stream still holds exactly
    /// `expected_version` events (compare-and-append).
    ///
    /// `expected_version == 0` expresses "I expect a brand-new stream".
    ///
    /// # Errors
    ///
    /// Returns [`OptimisticCommitError::Conflict`] if the stored event count
    /// differs from `expected_version`; nothing is appended in that case.
    /// Serialization and store failures map to the remaining variants.
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
        Self::Metadata: Clone;

    /// Load events matching the specified filters.
    ///
    /// Each filter describes an optional event kind and aggregate identity:
    /// - [`EventFilter::for_event`] loads every event of the given kind
    /// - [`EventFilter::for_aggregate`] narrows to a single aggregate
    ///   instance
    /// - [`EventFilter::for_stream`] loads a single aggregate instance's
    ///   whole stream, any kind
    ///
    /// Events are returned in global append order, which within a single
    /// stream coincides with ascending sequence order.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn load_events<'a>(
        &'a self,
        filters: &'a [EventFilter<Self::Id>],
    ) -> impl Future<Output = LoadEventsResult<Self::Id, Self::Metadata, Self::Error>> + Send + 'a;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct StreamKey<Id> {
    aggregate_kind: String,
    aggregate_id: Id,
}

impl<Id> StreamKey<Id> {
    pub(crate) fn new(aggregate_kind: impl Into<String>, aggregate_id: Id) -> Self {
        Self {
            aggregate_kind: aggregate_kind.into(),
            aggregate_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(aggregate_kind: &str, aggregate_id: &str, kind: &str) -> StoredEvent<String, ()> {
        StoredEvent {
            aggregate_kind: aggregate_kind.to_string(),
            aggregate_id: aggregate_id.to_string(),
            kind: kind.to_string(),
            sequence: 0,
            recorded_at: Utc::now(),
            data: serde_json::Value::Null,
            metadata: (),
        }
    }

    #[test]
    fn for_event_is_unrestricted() {
        let filter: EventFilter<String> = EventFilter::for_event("lead-contacted");
        assert_eq!(filter.event_kind.as_deref(), Some("lead-contacted"));
        assert_eq!(filter.aggregate_kind, None);
        assert_eq!(filter.aggregate_id, None);
    }

    #[test]
    fn for_aggregate_is_restricted() {
        let filter: EventFilter<String> =
            EventFilter::for_aggregate("lead-contacted", "lead", "l-1");
        assert_eq!(filter.event_kind.as_deref(), Some("lead-contacted"));
        assert_eq!(filter.aggregate_kind.as_deref(), Some("lead"));
        assert_eq!(filter.aggregate_id.as_deref(), Some("l-1"));
    }

    #[test]
    fn unrestricted_filter_matches_any_aggregate() {
        let filter: EventFilter<String> = EventFilter::for_event("lead-contacted");
        assert!(filter.matches(&stored("lead", "l-1", "lead-contacted")));
        assert!(filter.matches(&stored("lead", "l-2", "lead-contacted")));
        assert!(!filter.matches(&stored("lead", "l-1", "lead-registered")));
    }

    #[test]
    fn restricted_filter_matches_single_instance() {
        let filter: EventFilter<String> =
            EventFilter::for_aggregate("lead-contacted", "lead", "l-1");
        assert!(filter.matches(&stored("lead", "l-1", "lead-contacted")));
        assert!(!filter.matches(&stored("lead", "l-2", "lead-contacted")));
        assert!(!filter.matches(&stored("ticket", "l-1", "lead-contacted")));
    }

    #[test]
    fn stream_filter_matches_every_kind_in_the_stream() {
        let filter: EventFilter<String> = EventFilter::for_stream("lead", "l-1");
        assert!(filter.matches(&stored("lead", "l-1", "lead-contacted")));
        assert!(filter.matches(&stored("lead", "l-1", "lead-registered")));
        assert!(filter.matches(&stored("lead", "l-1", "some-unknown-kind")));
        assert!(!filter.matches(&stored("lead", "l-2", "lead-contacted")));
        assert!(!filter.matches(&stored("ticket", "l-1", "lead-contacted")));
    }
}
