//! Support ticket aggregate.
//!
//! A ticket moves through open → escalated → closed. Escalation is only
//! allowed for a ticket that is open and not yet escalated; requesting it in
//! any other state is a visible no-op rather than an error, so repeated
//! escalation requests never pile up duplicate events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    aggregate::{Aggregate, Handle},
    event::{DomainEvent, EventDecodeError, EventKind, StreamEvent},
    store::{EventStore, StoredEvent},
};

/// Ticket instance identifier.
pub type TicketId = Uuid;

/// A ticket was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketOpened {
    /// When the ticket was opened.
    pub opened_at: DateTime<Utc>,
}

impl DomainEvent for TicketOpened {
    const KIND: &'static str = "ticket-opened";
}

/// An open ticket was escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEscalated {
    /// When the escalation was requested.
    pub escalated_at: DateTime<Utc>,
}

impl DomainEvent for TicketEscalated {
    const KIND: &'static str = "ticket-escalated";
}

/// A ticket was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClosed {
    /// When the ticket was closed.
    pub closed_at: DateTime<Utc>,
}

impl DomainEvent for TicketClosed {
    const KIND: &'static str = "ticket-closed";
}

/// Sum type of all ticket events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketEvent {
    /// See [`TicketOpened`].
    Opened(TicketOpened),
    /// See [`TicketEscalated`].
    Escalated(TicketEscalated),
    /// See [`TicketClosed`].
    Closed(TicketClosed),
}

impl From<TicketOpened> for TicketEvent {
    fn from(event: TicketOpened) -> Self {
        Self::Opened(event)
    }
}

impl From<TicketEscalated> for TicketEvent {
    fn from(event: TicketEscalated) -> Self {
        Self::Escalated(event)
    }
}

impl From<TicketClosed> for TicketEvent {
    fn from(event: TicketClosed) -> Self {
        Self::Closed(event)
    }
}

impl EventKind for TicketEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Opened(_) => TicketOpened::KIND,
            Self::Escalated(_) => TicketEscalated::KIND,
            Self::Closed(_) => TicketClosed::KIND,
        }
    }
}

impl Serialize for TicketEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Opened(inner) => inner.serialize(serializer),
            Self::Escalated(inner) => inner.serialize(serializer),
            Self::Closed(inner) => inner.serialize(serializer),
        }
    }
}

impl StreamEvent for TicketEvent {
    const EVENT_KINDS: &'static [&'static str] = &[
        TicketOpened::KIND,
        TicketEscalated::KIND,
        TicketClosed::KIND,
    ];

    fn from_stored<S: EventStore>(
        stored: &StoredEvent<S::Id, S::Metadata>,
        store: &S,
    ) -> Result<Self, EventDecodeError<S::Error>> {
        match stored.kind.as_str() {
            TicketOpened::KIND => Ok(Self::Opened(
                store.decode_event(stored).map_err(EventDecodeError::Store)?,
            )),
            TicketEscalated::KIND => Ok(Self::Escalated(
                store.decode_event(stored).map_err(EventDecodeError::Store)?,
            )),
            TicketClosed::KIND => Ok(Self::Closed(
                store.decode_event(stored).map_err(EventDecodeError::Store)?,
            )),
            other => Err(EventDecodeError::UnsupportedKind {
                kind: other.to_string(),
                expected: Self::EVENT_KINDS,
            }),
        }
    }
}

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketStatus {
    /// Awaiting handling.
    #[default]
    Open,
    /// Handed to a senior agent.
    Escalated,
    /// Resolved; no further transitions.
    Closed,
}

/// Domain errors produced by ticket commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TicketError {
    /// The ticket stream already contains an opened event.
    #[error("ticket is already open")]
    AlreadyOpen,
    /// The command requires an opened ticket.
    #[error("ticket has not been opened yet")]
    NotOpened,
}

/// Event-sourced ticket state.
///
/// Rebuilt purely by folding [`TicketEvent`]s; the default value represents a
/// ticket whose stream holds no events yet.
#[derive(Debug, Default)]
pub struct Ticket {
    opened: bool,
    status: TicketStatus,
    escalated: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TicketStatus {
        self.status
    }

    /// Whether an escalation has ever been recorded.
    #[must_use]
    pub const fn is_escalated(&self) -> bool {
        self.escalated
    }

    /// Timestamp of the most recent event, if any.
    #[must_use]
    pub const fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl Aggregate for Ticket {
    type Error = TicketError;
    type Event = TicketEvent;
    type Id = TicketId;

    const KIND: &'static str = "ticket";

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TicketEvent::Opened(e) => {
                self.opened = true;
                self.status = TicketStatus::Open;
                self.escalated = false;
                self.updated_at = Some(e.opened_at);
            }
            TicketEvent::Escalated(e) => {
                self.status = TicketStatus::Escalated;
                self.escalated = true;
                self.updated_at = Some(e.escalated_at);
            }
            TicketEvent::Closed(e) => {
                self.status = TicketStatus::Closed;
                self.updated_at = Some(e.closed_at);
            }
        }
    }
}

/// Open a new ticket.
#[derive(Debug, Clone, Copy)]
pub struct OpenTicket {
    /// Timestamp recorded on the opened event.
    pub at: DateTime<Utc>,
}

impl Handle<OpenTicket> for Ticket {
    fn handle(&self, command: &OpenTicket) -> Result<Option<Self::Event>, Self::Error> {
        if self.opened {
            return Err(TicketError::AlreadyOpen);
        }
        Ok(Some(TicketOpened { opened_at: command.at }.into()))
    }
}

/// Request escalation of an open ticket.
#[derive(Debug, Clone, Copy)]
pub struct RequestEscalation {
    /// Timestamp recorded on the escalated event.
    pub at: DateTime<Utc>,
}

impl Handle<RequestEscalation> for Ticket {
    fn handle(&self, command: &RequestEscalation) -> Result<Option<Self::Event>, Self::Error> {
        if !self.opened {
            return Err(TicketError::NotOpened);
        }
        // Only an open, not-yet-escalated ticket escalates; anything else is
        // a no-op, not an error.
        if self.status != TicketStatus::Open || self.escalated {
            return Ok(None);
        }
        Ok(Some(
            TicketEscalated {
                escalated_at: command.at,
            }
            .into(),
        ))
    }
}

/// Close a ticket.
#[derive(Debug, Clone, Copy)]
pub struct CloseTicket {
    /// Timestamp recorded on the closed event.
    pub at: DateTime<Utc>,
}

impl Handle<CloseTicket> for Ticket {
    fn handle(&self, command: &CloseTicket) -> Result<Option<Self::Event>, Self::Error> {
        if !self.opened {
            return Err(TicketError::NotOpened);
        }
        if self.status == TicketStatus::Closed {
            return Ok(None);
        }
        Ok(Some(TicketClosed { closed_at: command.at }.into()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test::TestFramework;

    type TicketTest = TestFramework<Ticket>;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 5, 20, 9, 52, second).unwrap()
    }

    #[test]
    fn opening_a_new_ticket_produces_event() {
        TicketTest::given(&[])
            .when(&OpenTicket { at: at(0) })
            .then_expect_event(&TicketOpened { opened_at: at(0) }.into());
    }

    #[test]
    fn opening_twice_is_rejected() {
        TicketTest::given(&[TicketOpened { opened_at: at(0) }.into()])
            .when(&OpenTicket { at: at(1) })
            .then_expect_error_eq(&TicketError::AlreadyOpen);
    }

    #[test]
    fn escalating_an_open_ticket_produces_event() {
        TicketTest::given(&[TicketOpened { opened_at: at(0) }.into()])
            .when(&RequestEscalation { at: at(1) })
            .then_expect_event(&TicketEscalated { escalated_at: at(1) }.into());
    }

    #[test]
    fn escalating_twice_is_a_no_op() {
        TicketTest::given(&[
            TicketOpened { opened_at: at(0) }.into(),
            TicketEscalated { escalated_at: at(1) }.into(),
        ])
        .when(&RequestEscalation { at: at(2) })
        .then_expect_no_event();
    }

    #[test]
    fn escalating_a_closed_ticket_is_a_no_op() {
        TicketTest::given(&[
            TicketOpened { opened_at: at(0) }.into(),
            TicketClosed { closed_at: at(1) }.into(),
        ])
        .when(&RequestEscalation { at: at(2) })
        .then_expect_no_event();
    }

    #[test]
    fn escalating_before_opening_is_rejected() {
        TicketTest::given(&[])
            .when(&RequestEscalation { at: at(0) })
            .then_expect_error_eq(&TicketError::NotOpened);
    }

    #[test]
    fn closing_an_escalated_ticket_produces_event() {
        TicketTest::given(&[
            TicketOpened { opened_at: at(0) }.into(),
            TicketEscalated { escalated_at: at(1) }.into(),
        ])
        .when(&CloseTicket { at: at(2) })
        .then_expect_event(&TicketClosed { closed_at: at(2) }.into());
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        TicketTest::given(&[
            TicketOpened { opened_at: at(0) }.into(),
            TicketClosed { closed_at: at(1) }.into(),
        ])
        .when(&CloseTicket { at: at(2) })
        .then_expect_no_event();
    }

    #[test]
    fn replaying_the_same_history_twice_yields_identical_state() {
        let history: Vec<TicketEvent> = vec![
            TicketOpened { opened_at: at(0) }.into(),
            TicketEscalated { escalated_at: at(1) }.into(),
            TicketClosed { closed_at: at(2) }.into(),
        ];

        let rebuild = |events: &[TicketEvent]| {
            let mut ticket = Ticket::default();
            for event in events {
                ticket.apply(event);
            }
            ticket
        };

        let first = rebuild(&history);
        let second = rebuild(&history);
        assert_eq!(first.status(), second.status());
        assert_eq!(first.is_escalated(), second.is_escalated());
        assert_eq!(first.updated_at(), second.updated_at());
        assert_eq!(first.status(), TicketStatus::Closed);
    }
}
