//! Event-sourced aggregates with an append-only log and optimistic
//! concurrency.
//!
//! State is never stored directly: every change is captured as an immutable
//! domain event, and current state is rebuilt on demand by folding an
//! aggregate's event stream from the beginning. Commits use compare-and-append
//! so concurrent writers cannot silently overwrite each other.
//!
//! - [`aggregate`] - Command-side primitives (`Aggregate`, `Handle`)
//! - [`projection`] - Read-side primitives (`Projection`, `ApplyProjection`, `ProjectionBuilder`)
//! - [`repository`] - Command execution and aggregate lifecycle (`Repository`)
//! - [`store`] - Event persistence abstraction (`EventStore`) and the
//!   in-memory reference implementation
//! - [`event`] - Event marker traits (`DomainEvent`, `EventKind`, `StreamEvent`)
//! - [`concurrency`] - Concurrency strategy markers (`Optimistic`, `Unchecked`)
//! - [`test`] - Given/when/then testing utilities for aggregates
//!
//! Two worked domains exercise the full stack: [`ticket`] (a small lifecycle
//! aggregate) and [`lead`] (a sales pipeline with two read models).
//!
//! # Example
//!
//! ```
//! use refold::{repository::Repository, store::memory};
//!
//! // Create an in-memory store and repository
//! let store: memory::Store<String, ()> = memory::Store::new();
//! let repo = Repository::new(store);
//! ```

pub mod aggregate;
pub mod concurrency;
pub mod event;
pub mod lead;
pub mod projection;
pub mod repository;
pub mod store;
pub mod ticket;

pub use aggregate::{Aggregate, Handle};
pub use concurrency::{ConcurrencyConflict, Optimistic, Unchecked};
pub use event::{DomainEvent, EventDecodeError, EventKind, StreamEvent};
pub use projection::{ApplyProjection, Projection, ProjectionError};
pub use repository::Repository;
pub use store::{EventFilter, EventStore, StoredEvent};
