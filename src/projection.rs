//! Read-side primitives.
//!
//! Projections rebuild query models from streams of stored events. This
//! module provides the projection trait, event application hooks via
//! [`ApplyProjection`], and the [`ProjectionBuilder`] that wires everything
//! together.

use std::{collections::HashMap, marker::PhantomData};

use thiserror::Error;

use crate::{
    aggregate::Aggregate,
    event::{DomainEvent, EventDecodeError, StreamEvent},
    store::{EventFilter, EventStore, StoredEvent},
};

/// Trait implemented by read models that can be constructed from an event
/// stream.
///
/// Implementors specify the identifier and metadata types their
/// [`ApplyProjection`] handlers expect. Projections are rebuilt by calling
/// [`Repository::build_projection`](crate::repository::Repository::build_projection),
/// configuring the desired event streams, and invoking
/// [`ProjectionBuilder::load`].
pub trait Projection: Default {
    /// Aggregate identifier type this projection is compatible with.
    type Id;
    /// Metadata type expected by this projection.
    type Metadata;
}

/// Apply an event to a projection with access to envelope context.
///
/// Implementations receive the aggregate identifier, the pure domain event,
/// and metadata supplied by the backing store.
///
/// ```ignore
/// impl ApplyProjection<LeadEvent> for LeadPipelineReport {
///     fn apply_projection(&mut self, aggregate_id: &Self::Id, event: &LeadEvent, _metadata: &Self::Metadata) {
///         let summary = self.leads.entry(aggregate_id.clone()).or_default();
///         summary.fold(event);
///     }
/// }
/// ```
pub trait ApplyProjection<E>: Projection {
    /// Fold one event into the read model.
    fn apply_projection(&mut self, aggregate_id: &Self::Id, event: &E, metadata: &Self::Metadata);
}

/// Errors that can occur when rebuilding a projection or an aggregate.
#[derive(Debug, Error)]
pub enum ProjectionError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// The store failed to load events.
    #[error("failed to load events: {0}")]
    Store(#[source] StoreError),
    /// A stored event could not be decoded.
    #[error("failed to decode event: {0}")]
    EventDecode(#[source] EventDecodeError<StoreError>),
}

#[derive(Debug)]
enum HandlerError<StoreError> {
    EventDecode(EventDecodeError<StoreError>),
    Store(StoreError),
}

impl<StoreError> From<StoreError> for HandlerError<StoreError> {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

type EventHandler<P, S> = Box<
    dyn Fn(
            &mut P,
            &<S as EventStore>::Id,
            &StoredEvent<<S as EventStore>::Id, <S as EventStore>::Metadata>,
            &<S as EventStore>::Metadata,
            &S,
        ) -> Result<(), HandlerError<<S as EventStore>::Error>>
        + Send
        + Sync,
>;

/// Builder used to configure which events should be loaded for a projection.
pub struct ProjectionBuilder<'a, S, P>
where
    S: EventStore,
    P: Projection<Id = S::Id>,
{
    store: &'a S,
    /// Event kind -> handler mapping for O(1) dispatch.
    handlers: HashMap<&'static str, EventHandler<P, S>>,
    /// Filters for loading events from the store.
    filters: Vec<EventFilter<S::Id>>,
    _phantom: PhantomData<fn() -> P>,
}

impl<'a, S, P> ProjectionBuilder<'a, S, P>
where
    S: EventStore,
    P: Projection<Id = S::Id>,
{
    pub(crate) fn new(store: &'a S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            filters: Vec::new(),
            _phantom: PhantomData,
        }
    }

    /// Register a specific event type to load from all aggregates.
    ///
    /// The store's metadata type must be convertible to the projection's
    /// metadata type; it is cloned once per event.
    ///
    /// # Example
    /// ```ignore
    /// builder.event::<LeadRegistered>()  // All leads
    /// ```
    #[must_use]
    pub fn event<E>(mut self) -> Self
    where
        E: DomainEvent + serde::de::DeserializeOwned,
        P: ApplyProjection<E>,
        S::Metadata: Clone + Into<P::Metadata>,
    {
        self.filters.push(EventFilter::for_event(E::KIND));
        self.handlers.insert(
            E::KIND,
            Box::new(|projection, aggregate_id, stored, metadata, store| {
                let event: E = store.decode_event(stored)?;
                let metadata: P::Metadata = metadata.clone().into();
                ApplyProjection::apply_projection(projection, aggregate_id, &event, &metadata);
                Ok(())
            }),
        );
        self
    }

    /// Register all event kinds of a [`StreamEvent`] sum type across all
    /// aggregates.
    ///
    /// Use this to subscribe to an aggregate's whole event enum as one unit
    /// rather than registering each event type individually.
    ///
    /// # Example
    /// ```ignore
    /// builder.events::<LeadEvent>() // All leads, all lead event variants
    /// ```
    #[must_use]
    pub fn events<E>(mut self) -> Self
    where
        E: StreamEvent,
        P: ApplyProjection<E>,
        S::Metadata: Clone + Into<P::Metadata>,
    {
        for &kind in E::EVENT_KINDS {
            self.filters.push(EventFilter::for_event(kind));
            self.handlers.insert(
                kind,
                Box::new(move |projection, aggregate_id, stored, metadata, store| {
                    let event = E::from_stored(stored, store).map_err(HandlerError::EventDecode)?;
                    let metadata: P::Metadata = metadata.clone().into();
                    ApplyProjection::apply_projection(projection, aggregate_id, &event, &metadata);
                    Ok(())
                }),
            );
        }
        self
    }

    /// Register all event kinds for a specific aggregate instance.
    ///
    /// Subscribes the projection to the aggregate's event sum type
    /// (`A::Event`) and loads only that instance's stream.
    ///
    /// # Example
    /// ```ignore
    /// let history = repository
    ///     .build_projection::<LeadDirectory>()
    ///     .events_for::<Lead>(&lead_id)
    ///     .load()
    ///     .await?;
    /// ```
    #[must_use]
    pub fn events_for<A>(mut self, aggregate_id: &S::Id) -> Self
    where
        A: Aggregate<Id = S::Id>,
        A::Event: StreamEvent,
        P: ApplyProjection<A::Event>,
        S::Metadata: Clone + Into<P::Metadata>,
    {
        for &kind in <A::Event as StreamEvent>::EVENT_KINDS {
            self.filters
                .push(EventFilter::for_aggregate(kind, A::KIND, aggregate_id.clone()));
            self.handlers.insert(
                kind,
                Box::new(move |projection, aggregate_id, stored, metadata, store| {
                    let event = <A::Event as StreamEvent>::from_stored(stored, store)
                        .map_err(HandlerError::EventDecode)?;
                    let metadata: P::Metadata = metadata.clone().into();
                    ApplyProjection::apply_projection(projection, aggregate_id, &event, &metadata);
                    Ok(())
                }),
            );
        }
        self
    }

    /// Replay the configured events and materialize the projection.
    ///
    /// Events are folded in global append order, so cross-aggregate read
    /// models see history interleaved chronologically.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] when the store fails to load events or
    /// when an event cannot be decoded.
    #[tracing::instrument(
        skip(self),
        fields(
            projection_type = std::any::type_name::<P>(),
            filter_count = self.filters.len(),
        )
    )]
    pub async fn load(self) -> Result<P, ProjectionError<S::Error>> {
        let events = self
            .store
            .load_events(&self.filters)
            .await
            .map_err(ProjectionError::Store)?;

        let mut projection = P::default();
        let event_count = events.len();
        tracing::debug!(events_to_replay = event_count, "replaying events into projection");

        for stored in &events {
            if let Some(handler) = self.handlers.get(stored.kind.as_str()) {
                (handler)(
                    &mut projection,
                    &stored.aggregate_id,
                    stored,
                    &stored.metadata,
                    self.store,
                )
                .map_err(|error| match error {
                    HandlerError::Store(error) => {
                        ProjectionError::EventDecode(EventDecodeError::Store(error))
                    }
                    HandlerError::EventDecode(error) => ProjectionError::EventDecode(error),
                })?;
            }
        }

        tracing::info!(events_applied = event_count, "projection loaded");
        Ok(projection)
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error, io};

    use super::*;

    #[test]
    fn error_display_store_mentions_loading() {
        let error: ProjectionError<io::Error> =
            ProjectionError::Store(io::Error::new(io::ErrorKind::NotFound, "not found"));
        let msg = error.to_string();
        assert!(msg.contains("failed to load events"));
        assert!(error.source().is_some());
    }

    #[test]
    fn error_display_decode_mentions_decoding() {
        let error: ProjectionError<io::Error> =
            ProjectionError::EventDecode(EventDecodeError::UnsupportedKind {
                kind: "mystery-event".to_string(),
                expected: &[],
            });
        assert!(error.to_string().contains("failed to decode event"));
    }
}
