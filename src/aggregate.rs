//! Command-side domain primitives.
//!
//! Aggregates rebuild their state by folding events ([`Aggregate::apply`]) and
//! validate commands via [`Handle`]. Both are pure: replaying the same event
//! sequence always yields the same state, and handling a command never
//! mutates the aggregate.

/// Command-side entities that produce domain events.
///
/// An aggregate is a versioned projection of its event stream: starting from
/// [`Default::default()`], events are applied left-to-right in ascending
/// sequence order. The fold must be deterministic; `apply` has no access to
/// clocks, randomness, or the store.
pub trait Aggregate: Default + Sized {
    /// Aggregate type identifier used by the event store.
    ///
    /// This is combined with the aggregate id to identify event streams. Use
    /// lowercase kebab-case: `"ticket"`, `"lead"`, etc.
    const KIND: &'static str;

    /// The event sum type folded into this aggregate.
    type Event;
    /// Domain error produced when a command is rejected.
    type Error;
    /// Aggregate instance identifier.
    type Id;

    /// Apply an event to update aggregate state.
    ///
    /// Called during replay to rebuild state from history, one event at a
    /// time, each exactly once. Implement with a match over the event enum:
    ///
    /// ```ignore
    /// fn apply(&mut self, event: &Self::Event) {
    ///     match event {
    ///         TicketEvent::Opened(e) => {
    ///             self.opened = true;
    ///             self.status = TicketStatus::Open;
    ///         }
    ///         TicketEvent::Closed(_) => self.status = TicketStatus::Closed,
    ///     }
    /// }
    /// ```
    fn apply(&mut self, event: &Self::Event);
}

/// Entry point for command handling.
///
/// Each command type gets its own implementation, letting the aggregate
/// express validation logic in a strongly typed way. A command produces at
/// most one event:
///
/// - `Ok(Some(event))` - the command was accepted; the event is buffered for
///   commit. History is never mutated.
/// - `Ok(None)` - the command is a no-op for the current state (e.g.
///   escalating an already-escalated ticket). Nothing is committed.
/// - `Err(_)` - the command is invalid for the current state.
///
/// ```ignore
/// impl Handle<RequestEscalation> for Ticket {
///     fn handle(&self, command: &RequestEscalation) -> Result<Option<Self::Event>, Self::Error> {
///         if !self.opened {
///             return Err(TicketError::NotOpened);
///         }
///         if self.status != TicketStatus::Open || self.escalated {
///             return Ok(None);
///         }
///         Ok(Some(TicketEscalated { escalated_at: command.at }.into()))
///     }
/// }
/// ```
pub trait Handle<C>: Aggregate {
    /// Handle a command and produce at most one event.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the command is invalid for the current
    /// aggregate state.
    fn handle(&self, command: &C) -> Result<Option<Self::Event>, Self::Error>;
}
