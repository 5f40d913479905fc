//! Application service orchestration.
//!
//! [`Repository`] coordinates the load → rebuild → command → commit protocol:
//! it fetches an aggregate's events, folds them into current state, invokes
//! the command handler, and commits the resulting event back to the store.
//! With the default [`Optimistic`] strategy the version read at load time is
//! handed to the store for compare-and-append.

use std::marker::PhantomData;

use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    aggregate::{Aggregate, Handle},
    concurrency::{ConcurrencyConflict, ConcurrencyStrategy, Optimistic, Unchecked},
    event::{EventKind, StreamEvent},
    projection::{Projection, ProjectionBuilder, ProjectionError},
    store::{CommitError, EventFilter, EventStore, OptimisticCommitError},
};

/// Error type for unchecked command execution (no concurrency variant).
#[derive(Debug, Error)]
pub enum CommandError<AggregateError, StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// The aggregate's command handler returned a domain error.
    #[error("aggregate rejected command: {0}")]
    Aggregate(AggregateError),
    /// Events could not be loaded or folded into current state.
    #[error("failed to rebuild aggregate state: {0}")]
    Replay(#[source] ProjectionError<StoreError>),
    /// The produced event could not be persisted.
    #[error("failed to persist event: {0}")]
    Commit(#[source] CommitError<StoreError>),
}

/// Error type for optimistic command execution (includes concurrency).
#[derive(Debug, Error)]
pub enum OptimisticCommandError<AggregateError, StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// The aggregate's command handler returned a domain error.
    #[error("aggregate rejected command: {0}")]
    Aggregate(AggregateError),
    /// Another writer appended to the stream between load and commit.
    #[error(transparent)]
    Concurrency(ConcurrencyConflict),
    /// Events could not be loaded or folded into current state.
    #[error("failed to rebuild aggregate state: {0}")]
    Replay(#[source] ProjectionError<StoreError>),
    /// The produced event could not be persisted.
    #[error("failed to persist event: {0}")]
    Commit(#[source] CommitError<StoreError>),
}

/// Result type alias for unchecked command execution.
pub type CommandResult<A, S> =
    Result<(), CommandError<<A as Aggregate>::Error, <S as EventStore>::Error>>;

/// Result type alias for optimistic command execution.
pub type OptimisticCommandResult<A, S> =
    Result<(), OptimisticCommandError<<A as Aggregate>::Error, <S as EventStore>::Error>>;

/// Result type alias for retrying command execution. The success value is the
/// number of attempts that were made.
pub type RetryResult<A, S> =
    Result<usize, OptimisticCommandError<<A as Aggregate>::Error, <S as EventStore>::Error>>;

struct LoadedAggregate<A> {
    aggregate: A,
    /// Number of events folded; doubles as the optimistic-concurrency token.
    version: u64,
}

/// Repository over an event store, generic over the concurrency strategy.
pub struct Repository<S, C = Optimistic>
where
    S: EventStore,
    C: ConcurrencyStrategy,
{
    pub(crate) store: S,
    _concurrency: PhantomData<C>,
}

impl<S> Repository<S>
where
    S: EventStore,
{
    /// Create a repository with optimistic concurrency checking (the
    /// default).
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
            _concurrency: PhantomData,
        }
    }
}

impl<S> Repository<S, Optimistic>
where
    S: EventStore,
{
    /// Disable optimistic concurrency checking for this repository.
    #[must_use]
    pub fn without_concurrency_checking(self) -> Repository<S, Unchecked> {
        Repository {
            store: self.store,
            _concurrency: PhantomData,
        }
    }
}

impl<S, C> Repository<S, C>
where
    S: EventStore,
    C: ConcurrencyStrategy,
{
    /// Access the underlying event store.
    #[must_use]
    pub const fn event_store(&self) -> &S {
        &self.store
    }

    /// Start building a read model over this repository's event store.
    pub fn build_projection<P>(&self) -> ProjectionBuilder<'_, S, P>
    where
        P: Projection<Id = S::Id>,
    {
        ProjectionBuilder::new(&self.store)
    }

    /// Load an aggregate by replaying its entire event stream.
    ///
    /// The whole stream is loaded, not just the kinds the aggregate's event
    /// sum type knows about, so a stream containing a foreign event kind
    /// fails the rebuild with
    /// [`EventDecodeError::UnsupportedKind`](crate::event::EventDecodeError::UnsupportedKind)
    /// rather than folding a partial history.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the store fails to load events or if an
    /// event cannot be decoded into the aggregate's event sum type. Decode
    /// failures abort the fold; no partially rebuilt state escapes.
    pub async fn load<A>(&self, id: &S::Id) -> Result<A, ProjectionError<S::Error>>
    where
        A: Aggregate<Id = S::Id>,
        A::Event: StreamEvent,
    {
        Ok(self.load_aggregate::<A>(id).await?.aggregate)
    }

    async fn load_aggregate<A>(
        &self,
        id: &S::Id,
    ) -> Result<LoadedAggregate<A>, ProjectionError<S::Error>>
    where
        A: Aggregate<Id = S::Id>,
        A::Event: StreamEvent,
    {
        // Load the whole stream so foreign kinds are seen (and rejected) by
        // the fold, and so the version counts every stored event.
        let filters = [EventFilter::for_stream(A::KIND, id.clone())];

        let events = self
            .store
            .load_events(&filters)
            .await
            .map_err(ProjectionError::Store)?;

        let mut aggregate = A::default();
        for stored in &events {
            let event =
                A::Event::from_stored(stored, &self.store).map_err(ProjectionError::EventDecode)?;
            aggregate.apply(&event);
        }

        tracing::trace!(
            aggregate_kind = A::KIND,
            events_replayed = events.len(),
            "aggregate rebuilt from history"
        );

        Ok(LoadedAggregate {
            aggregate,
            version: events.len() as u64,
        })
    }
}

impl<S> Repository<S, Unchecked>
where
    S: EventStore,
{
    /// Execute a command with last-writer-wins semantics (no concurrency
    /// checking).
    ///
    /// A command producing no event (`Ok(None)`) commits nothing and leaves
    /// the stream untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the aggregate rejects the command, the
    /// aggregate cannot be rebuilt, or the store fails to persist.
    pub async fn execute_command<A, Cmd>(
        &self,
        id: &S::Id,
        command: &Cmd,
        metadata: &S::Metadata,
    ) -> CommandResult<A, S>
    where
        A: Aggregate<Id = S::Id> + Handle<Cmd>,
        A::Event: StreamEvent + EventKind + serde::Serialize + Send + Sync,
        Cmd: Sync,
        S::Metadata: Clone,
    {
        let LoadedAggregate { aggregate, .. } = self
            .load_aggregate::<A>(id)
            .await
            .map_err(CommandError::Replay)?;

        let Some(event) =
            Handle::<Cmd>::handle(&aggregate, command).map_err(CommandError::Aggregate)?
        else {
            return Ok(());
        };

        drop(aggregate);

        self.store
            .commit_events(A::KIND, id, NonEmpty::singleton(event), metadata)
            .await
            .map(|_| ())
            .map_err(CommandError::Commit)
    }
}

impl<S> Repository<S, Optimistic>
where
    S: EventStore,
{
    /// Execute a command using optimistic concurrency control.
    ///
    /// The version read at load time is passed to the store, which accepts
    /// the append only if the stream's stored event count still matches
    /// (compare-and-append).
    ///
    /// A command producing no event (`Ok(None)`) commits nothing; it cannot
    /// conflict.
    ///
    /// # Errors
    ///
    /// Returns [`OptimisticCommandError::Concurrency`] if the stream version
    /// changed between loading and committing. Other variants cover aggregate
    /// validation, rebuild, and persistence errors.
    pub async fn execute_command<A, Cmd>(
        &self,
        id: &S::Id,
        command: &Cmd,
        metadata: &S::Metadata,
    ) -> OptimisticCommandResult<A, S>
    where
        A: Aggregate<Id = S::Id> + Handle<Cmd>,
        A::Event: StreamEvent + EventKind + serde::Serialize + Send + Sync,
        Cmd: Sync,
        S::Metadata: Clone,
    {
        let LoadedAggregate { aggregate, version } = self
            .load_aggregate::<A>(id)
            .await
            .map_err(OptimisticCommandError::Replay)?;

        let Some(event) =
            Handle::<Cmd>::handle(&aggregate, command).map_err(OptimisticCommandError::Aggregate)?
        else {
            return Ok(());
        };

        drop(aggregate);

        match self
            .store
            .commit_events_optimistic(A::KIND, id, version, NonEmpty::singleton(event), metadata)
            .await
        {
            Ok(_) => Ok(()),
            Err(OptimisticCommitError::Conflict(conflict)) => {
                Err(OptimisticCommandError::Concurrency(conflict))
            }
            Err(OptimisticCommitError::Serialization { index, source }) => Err(
                OptimisticCommandError::Commit(CommitError::Serialization { index, source }),
            ),
            Err(OptimisticCommitError::Store(error)) => {
                Err(OptimisticCommandError::Commit(CommitError::Store(error)))
            }
        }
    }

    /// Execute a command with bounded retry on concurrency conflicts.
    ///
    /// Each retry reloads the aggregate, so the command is re-validated
    /// against the latest state. Returns the number of attempts made.
    ///
    /// # Errors
    ///
    /// Returns the last error if all retries are exhausted, or a
    /// non-concurrency error immediately.
    pub async fn execute_with_retry<A, Cmd>(
        &self,
        id: &S::Id,
        command: &Cmd,
        metadata: &S::Metadata,
        max_retries: usize,
    ) -> RetryResult<A, S>
    where
        A: Aggregate<Id = S::Id> + Handle<Cmd>,
        A::Event: StreamEvent + EventKind + serde::Serialize + Send + Sync,
        Cmd: Sync,
        S::Metadata: Clone,
    {
        for attempt in 1..=max_retries {
            match self.execute_command::<A, Cmd>(id, command, metadata).await {
                Ok(()) => return Ok(attempt),
                Err(OptimisticCommandError::Concurrency(conflict)) => {
                    tracing::debug!(attempt, %conflict, "conflict, retrying command");
                }
                Err(e) => return Err(e),
            }
        }

        self.execute_command::<A, Cmd>(id, command, metadata)
            .await
            .map(|()| max_retries + 1)
    }
}
