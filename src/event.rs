//! Domain event markers and stream decoding.
//!
//! `DomainEvent` is the lightweight trait every concrete event struct
//! implements. It intentionally avoids persistence concerns; serialization is
//! handled by the event stores. `StreamEvent` is implemented by the per-domain
//! event sum types so that stored events can be routed back to the correct
//! variant during replay.

use thiserror::Error;

use crate::store::{EventStore, StoredEvent};

/// Error returned when decoding a stored event fails.
#[derive(Debug, Error)]
pub enum EventDecodeError<StoreError> {
    /// The event kind was not recognized by this event sum type.
    ///
    /// Replay fails as a whole: an aggregate rebuilt from a stream containing
    /// a kind it cannot fold is never partially constructed.
    #[error("unsupported event kind `{kind}`, expected one of {expected:?}")]
    UnsupportedKind {
        /// The unrecognized event kind string.
        kind: String,
        /// The list of event kinds this sum type can handle.
        expected: &'static [&'static str],
    },
    /// The store failed to deserialize the event payload.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

/// Marker trait for events that can be persisted by an event store.
///
/// Each event carries a unique [`Self::KIND`] identifier so the repository can
/// route stored payloads back to the correct type when rebuilding aggregates
/// or projections. Use lowercase kebab-case: `"ticket-opened"`,
/// `"lead-registered"`, etc.
pub trait DomainEvent {
    /// Stable identifier for this event type.
    const KIND: &'static str;
}

/// Extension trait for reading the event kind from an event instance.
///
/// Blanket-implemented for every [`DomainEvent`], so `kind()` always agrees
/// with the `KIND` constant. Event sum types implement it by hand, dispatching
/// on the variant.
pub trait EventKind {
    /// The kind identifier of this event value.
    fn kind(&self) -> &'static str;
}

impl<T: DomainEvent> EventKind for T {
    fn kind(&self) -> &'static str {
        T::KIND
    }
}

/// Trait for event sum types that can decode themselves from stored events.
///
/// Implemented by the event enum of each aggregate. [`Self::EVENT_KINDS`]
/// drives which events projections subscribe to; [`Self::from_stored`] routes
/// a stored payload to the matching variant, rejecting kinds the enum does
/// not know.
///
/// ```ignore
/// impl StreamEvent for TicketEvent {
///     const EVENT_KINDS: &'static [&'static str] = &[TicketOpened::KIND, TicketClosed::KIND];
///
///     fn from_stored<S: EventStore>(
///         stored: &StoredEvent<S::Id, S::Metadata>,
///         store: &S,
///     ) -> Result<Self, EventDecodeError<S::Error>> {
///         match stored.kind.as_str() {
///             TicketOpened::KIND => Ok(Self::Opened(
///                 store.decode_event(stored).map_err(EventDecodeError::Store)?,
///             )),
///             other => Err(EventDecodeError::UnsupportedKind {
///                 kind: other.to_string(),
///                 expected: Self::EVENT_KINDS,
///             }),
///         }
///     }
/// }
/// ```
pub trait StreamEvent: Sized {
    /// The list of event kinds this sum type can decode.
    const EVENT_KINDS: &'static [&'static str];

    /// Decode an event from its stored representation.
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError::UnsupportedKind`] if the event kind is not
    /// recognized, or [`EventDecodeError::Store`] if deserialization fails.
    fn from_stored<S: EventStore>(
        stored: &StoredEvent<S::Id, S::Metadata>,
        store: &S,
    ) -> Result<Self, EventDecodeError<S::Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Pinged;

    impl DomainEvent for Pinged {
        const KIND: &'static str = "pinged";
    }

    #[test]
    fn event_kind_agrees_with_kind_constant() {
        assert_eq!(Pinged.kind(), Pinged::KIND);
    }

    #[test]
    fn unsupported_kind_lists_expected_kinds() {
        let error: EventDecodeError<std::io::Error> = EventDecodeError::UnsupportedKind {
            kind: "mystery-event".to_string(),
            expected: &["pinged"],
        };
        let msg = error.to_string();
        assert!(msg.contains("unsupported event kind `mystery-event`"));
        assert!(msg.contains("pinged"));
    }
}
