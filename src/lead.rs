//! Sales lead aggregate and its read models.
//!
//! A lead is registered with contact details and then worked through a
//! pipeline: contacted, scheduled for follow-up, order submitted, payment
//! confirmed. Two projections demonstrate that different read models can be
//! rebuilt from the same history: [`LeadPipelineReport`] summarises pipeline
//! progress, while [`LeadDirectory`] indexes every name and phone number a
//! lead has ever used.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    aggregate::{Aggregate, Handle},
    event::{DomainEvent, EventDecodeError, EventKind, StreamEvent},
    projection::{ApplyProjection, Projection},
    store::{EventStore, StoredEvent},
};

/// Lead instance identifier.
pub type LeadId = String;

/// A person's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    /// Wrap a raw name.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A phone number, stored as entered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Wrap a raw phone number.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw phone number.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline stage of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Registered but not yet worked.
    #[default]
    NewLead,
    /// A follow-up appointment is scheduled.
    FollowupSet,
    /// An order was submitted; awaiting payment.
    PendingPayment,
    /// Payment confirmed; the lead is won.
    Converted,
    /// The lead was abandoned.
    Closed,
}

/// A new lead was registered with initial contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRegistered {
    /// Name the lead was registered under.
    pub name: Name,
    /// Phone number the lead was registered under.
    pub phone_number: PhoneNumber,
    /// When the lead was registered.
    pub at: DateTime<Utc>,
}

impl DomainEvent for LeadRegistered {
    const KIND: &'static str = "lead-registered";
}

/// The lead was contacted; any scheduled follow-up is fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadContacted {
    /// When the contact happened.
    pub at: DateTime<Utc>,
}

impl DomainEvent for LeadContacted {
    const KIND: &'static str = "lead-contacted";
}

/// A follow-up appointment was scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupSet {
    /// When the follow-up is due.
    pub at: DateTime<Utc>,
}

impl DomainEvent for FollowupSet {
    const KIND: &'static str = "lead-followup-set";
}

/// The lead's contact details were updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetailsChanged {
    /// The new name.
    pub name: Name,
    /// The new phone number.
    pub phone_number: PhoneNumber,
    /// When the details were changed.
    pub at: DateTime<Utc>,
}

impl DomainEvent for ContactDetailsChanged {
    const KIND: &'static str = "lead-contact-details-changed";
}

/// The lead submitted an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmitted {
    /// When the order was submitted.
    pub at: DateTime<Utc>,
}

impl DomainEvent for OrderSubmitted {
    const KIND: &'static str = "lead-order-submitted";
}

/// Payment for a submitted order was confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    /// When the payment was confirmed.
    pub at: DateTime<Utc>,
}

impl DomainEvent for PaymentConfirmed {
    const KIND: &'static str = "lead-payment-confirmed";
}

/// Sum type of all lead events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadEvent {
    /// See [`LeadRegistered`].
    Registered(LeadRegistered),
    /// See [`LeadContacted`].
    Contacted(LeadContacted),
    /// See [`FollowupSet`].
    FollowupSet(FollowupSet),
    /// See [`ContactDetailsChanged`].
    ContactDetailsChanged(ContactDetailsChanged),
    /// See [`OrderSubmitted`].
    OrderSubmitted(OrderSubmitted),
    /// See [`PaymentConfirmed`].
    PaymentConfirmed(PaymentConfirmed),
}

impl From<LeadRegistered> for LeadEvent {
    fn from(event: LeadRegistered) -> Self {
        Self::Registered(event)
    }
}

impl From<LeadContacted> for LeadEvent {
    fn from(event: LeadContacted) -> Self {
        Self::Contacted(event)
    }
}

impl From<FollowupSet> for LeadEvent {
    fn from(event: FollowupSet) -> Self {
        Self::FollowupSet(event)
    }
}

impl From<ContactDetailsChanged> for LeadEvent {
    fn from(event: ContactDetailsChanged) -> Self {
        Self::ContactDetailsChanged(event)
    }
}

impl From<OrderSubmitted> for LeadEvent {
    fn from(event: OrderSubmitted) -> Self {
        Self::OrderSubmitted(event)
    }
}

impl From<PaymentConfirmed> for LeadEvent {
    fn from(event: PaymentConfirmed) -> Self {
        Self::PaymentConfirmed(event)
    }
}

impl EventKind for LeadEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Registered(_) => LeadRegistered::KIND,
            Self::Contacted(_) => LeadContacted::KIND,
            Self::FollowupSet(_) => FollowupSet::KIND,
            Self::ContactDetailsChanged(_) => ContactDetailsChanged::KIND,
            Self::OrderSubmitted(_) => OrderSubmitted::KIND,
            Self::PaymentConfirmed(_) => PaymentConfirmed::KIND,
        }
    }
}

impl Serialize for LeadEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Registered(inner) => inner.serialize(serializer),
            Self::Contacted(inner) => inner.serialize(serializer),
            Self::FollowupSet(inner) => inner.serialize(serializer),
            Self::ContactDetailsChanged(inner) => inner.serialize(serializer),
            Self::OrderSubmitted(inner) => inner.serialize(serializer),
            Self::PaymentConfirmed(inner) => inner.serialize(serializer),
        }
    }
}

impl StreamEvent for LeadEvent {
    const EVENT_KINDS: &'static [&'static str] = &[
        LeadRegistered::KIND,
        LeadContacted::KIND,
        FollowupSet::KIND,
        ContactDetailsChanged::KIND,
        OrderSubmitted::KIND,
        PaymentConfirmed::KIND,
    ];

    fn from_stored<S: EventStore>(
        stored: &StoredEvent<S::Id, S::Metadata>,
        store: &S,
    ) -> Result<Self, EventDecodeError<S::Error>> {
        match stored.kind.as_str() {
            LeadRegistered::KIND => Ok(Self::Registered(
                store.decode_event(stored).map_err(EventDecodeError::Store)?,
            )),
            LeadContacted::KIND => Ok(Self::Contacted(
                store.decode_event(stored).map_err(EventDecodeError::Store)?,
            )),
            FollowupSet::KIND => Ok(Self::FollowupSet(
                store.decode_event(stored).map_err(EventDecodeError::Store)?,
            )),
            ContactDetailsChanged::KIND => Ok(Self::ContactDetailsChanged(
                store.decode_event(stored).map_err(EventDecodeError::Store)?,
            )),
            OrderSubmitted::KIND => Ok(Self::OrderSubmitted(
                store.decode_event(stored).map_err(EventDecodeError::Store)?,
            )),
            PaymentConfirmed::KIND => Ok(Self::PaymentConfirmed(
                store.decode_event(stored).map_err(EventDecodeError::Store)?,
            )),
            other => Err(EventDecodeError::UnsupportedKind {
                kind: other.to_string(),
                expected: Self::EVENT_KINDS,
            }),
        }
    }
}

/// Domain errors produced by lead commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LeadError {
    /// The lead stream already contains a registration.
    #[error("lead is already registered")]
    AlreadyRegistered,
    /// The command requires a registered lead.
    #[error("lead has not been registered yet")]
    NotRegistered,
    /// Payment can only be confirmed for a submitted order.
    #[error("lead has no pending order")]
    NoPendingOrder,
}

/// Event-sourced lead state.
#[derive(Debug, Default)]
pub struct Lead {
    registered: bool,
    status: LeadStatus,
    name: Option<Name>,
    phone_number: Option<PhoneNumber>,
    follow_up_on: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// Current pipeline stage.
    #[must_use]
    pub const fn status(&self) -> LeadStatus {
        self.status
    }

    /// Current name, if registered.
    #[must_use]
    pub const fn name(&self) -> Option<&Name> {
        self.name.as_ref()
    }

    /// Current phone number, if registered.
    #[must_use]
    pub const fn phone_number(&self) -> Option<&PhoneNumber> {
        self.phone_number.as_ref()
    }

    /// Pending follow-up appointment, if one is scheduled.
    #[must_use]
    pub const fn follow_up_on(&self) -> Option<DateTime<Utc>> {
        self.follow_up_on
    }

    /// Whether the lead has left the pipeline (won or abandoned).
    const fn is_settled(&self) -> bool {
        matches!(self.status, LeadStatus::Converted | LeadStatus::Closed)
    }
}

impl Aggregate for Lead {
    type Error = LeadError;
    type Event = LeadEvent;
    type Id = LeadId;

    const KIND: &'static str = "lead";

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LeadEvent::Registered(e) => {
                self.registered = true;
                self.status = LeadStatus::NewLead;
                self.name = Some(e.name.clone());
                self.phone_number = Some(e.phone_number.clone());
                self.updated_at = Some(e.at);
            }
            LeadEvent::Contacted(e) => {
                self.follow_up_on = None;
                self.updated_at = Some(e.at);
            }
            LeadEvent::FollowupSet(e) => {
                self.status = LeadStatus::FollowupSet;
                self.follow_up_on = Some(e.at);
                self.updated_at = Some(e.at);
            }
            LeadEvent::ContactDetailsChanged(e) => {
                self.name = Some(e.name.clone());
                self.phone_number = Some(e.phone_number.clone());
                self.updated_at = Some(e.at);
            }
            LeadEvent::OrderSubmitted(e) => {
                self.status = LeadStatus::PendingPayment;
                self.updated_at = Some(e.at);
            }
            LeadEvent::PaymentConfirmed(e) => {
                self.status = LeadStatus::Converted;
                self.updated_at = Some(e.at);
            }
        }
    }
}

/// Register a new lead.
#[derive(Debug, Clone)]
pub struct RegisterLead {
    /// Initial name.
    pub name: Name,
    /// Initial phone number.
    pub phone_number: PhoneNumber,
    /// Registration timestamp.
    pub at: DateTime<Utc>,
}

impl Handle<RegisterLead> for Lead {
    fn handle(&self, command: &RegisterLead) -> Result<Option<Self::Event>, Self::Error> {
        if self.registered {
            return Err(LeadError::AlreadyRegistered);
        }
        Ok(Some(
            LeadRegistered {
                name: command.name.clone(),
                phone_number: command.phone_number.clone(),
                at: command.at,
            }
            .into(),
        ))
    }
}

/// Record that the lead was contacted.
#[derive(Debug, Clone, Copy)]
pub struct RecordContact {
    /// Contact timestamp.
    pub at: DateTime<Utc>,
}

impl Handle<RecordContact> for Lead {
    fn handle(&self, command: &RecordContact) -> Result<Option<Self::Event>, Self::Error> {
        if !self.registered {
            return Err(LeadError::NotRegistered);
        }
        if self.is_settled() {
            return Ok(None);
        }
        Ok(Some(LeadContacted { at: command.at }.into()))
    }
}

/// Schedule a follow-up appointment.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleFollowup {
    /// When the follow-up is due.
    pub at: DateTime<Utc>,
}

impl Handle<ScheduleFollowup> for Lead {
    fn handle(&self, command: &ScheduleFollowup) -> Result<Option<Self::Event>, Self::Error> {
        if !self.registered {
            return Err(LeadError::NotRegistered);
        }
        if self.is_settled() {
            return Ok(None);
        }
        Ok(Some(FollowupSet { at: command.at }.into()))
    }
}

/// Update the lead's contact details.
#[derive(Debug, Clone)]
pub struct ChangeContactDetails {
    /// The new name.
    pub name: Name,
    /// The new phone number.
    pub phone_number: PhoneNumber,
    /// When the details were changed.
    pub at: DateTime<Utc>,
}

impl Handle<ChangeContactDetails> for Lead {
    fn handle(&self, command: &ChangeContactDetails) -> Result<Option<Self::Event>, Self::Error> {
        if !self.registered {
            return Err(LeadError::NotRegistered);
        }
        // Unchanged details record nothing.
        if self.name.as_ref() == Some(&command.name)
            && self.phone_number.as_ref() == Some(&command.phone_number)
        {
            return Ok(None);
        }
        Ok(Some(
            ContactDetailsChanged {
                name: command.name.clone(),
                phone_number: command.phone_number.clone(),
                at: command.at,
            }
            .into(),
        ))
    }
}

/// Submit an order for the lead.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOrder {
    /// Submission timestamp.
    pub at: DateTime<Utc>,
}

impl Handle<SubmitOrder> for Lead {
    fn handle(&self, command: &SubmitOrder) -> Result<Option<Self::Event>, Self::Error> {
        if !self.registered {
            return Err(LeadError::NotRegistered);
        }
        if self.is_settled() || self.status == LeadStatus::PendingPayment {
            return Ok(None);
        }
        Ok(Some(OrderSubmitted { at: command.at }.into()))
    }
}

/// Confirm payment for a submitted order.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPayment {
    /// Confirmation timestamp.
    pub at: DateTime<Utc>,
}

impl Handle<ConfirmPayment> for Lead {
    fn handle(&self, command: &ConfirmPayment) -> Result<Option<Self::Event>, Self::Error> {
        if !self.registered {
            return Err(LeadError::NotRegistered);
        }
        if self.status == LeadStatus::Converted {
            return Ok(None);
        }
        if self.status != LeadStatus::PendingPayment {
            return Err(LeadError::NoPendingOrder);
        }
        Ok(Some(PaymentConfirmed { at: command.at }.into()))
    }
}

/// Per-lead summary row in the [`LeadPipelineReport`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeadSummary {
    /// Current name.
    pub name: Option<Name>,
    /// Current phone number.
    pub phone_number: Option<PhoneNumber>,
    /// Current pipeline stage.
    pub status: LeadStatus,
    /// Pending follow-up appointment, if any.
    pub follow_up_on: Option<DateTime<Utc>>,
    /// Number of follow-ups ever scheduled.
    pub followups: u32,
    /// Timestamp of the registration event.
    pub created_on: Option<DateTime<Utc>>,
    /// Timestamp of the most recent event.
    pub updated_on: Option<DateTime<Utc>>,
    /// Zero-based count of events applied after registration.
    pub version: u64,
}

impl LeadSummary {
    fn fold(&mut self, event: &LeadEvent) {
        match event {
            LeadEvent::Registered(e) => {
                self.name = Some(e.name.clone());
                self.phone_number = Some(e.phone_number.clone());
                self.status = LeadStatus::NewLead;
                self.created_on = Some(e.at);
                self.updated_on = Some(e.at);
                self.followups = 0;
                self.version = 0;
            }
            LeadEvent::Contacted(e) => {
                self.follow_up_on = None;
                self.updated_on = Some(e.at);
                self.version += 1;
            }
            LeadEvent::FollowupSet(e) => {
                self.status = LeadStatus::FollowupSet;
                self.follow_up_on = Some(e.at);
                self.followups += 1;
                self.updated_on = Some(e.at);
                self.version += 1;
            }
            LeadEvent::ContactDetailsChanged(e) => {
                self.name = Some(e.name.clone());
                self.phone_number = Some(e.phone_number.clone());
                self.updated_on = Some(e.at);
                self.version += 1;
            }
            LeadEvent::OrderSubmitted(e) => {
                self.status = LeadStatus::PendingPayment;
                self.updated_on = Some(e.at);
                self.version += 1;
            }
            LeadEvent::PaymentConfirmed(e) => {
                self.status = LeadStatus::Converted;
                self.updated_on = Some(e.at);
                self.version += 1;
            }
        }
    }
}

/// Read model summarising the pipeline stage of every lead.
#[derive(Debug, Default)]
pub struct LeadPipelineReport {
    leads: HashMap<LeadId, LeadSummary>,
}

impl LeadPipelineReport {
    /// Summary for a single lead, if any of its events were replayed.
    #[must_use]
    pub fn summary(&self, lead_id: &str) -> Option<&LeadSummary> {
        self.leads.get(lead_id)
    }

    /// Number of leads in the report.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leads.len()
    }

    /// Whether the report contains no leads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    /// Iterate over all lead summaries.
    pub fn iter(&self) -> impl Iterator<Item = (&LeadId, &LeadSummary)> {
        self.leads.iter()
    }
}

impl Projection for LeadPipelineReport {
    type Id = LeadId;
    type Metadata = ();
}

impl ApplyProjection<LeadEvent> for LeadPipelineReport {
    fn apply_projection(&mut self, aggregate_id: &LeadId, event: &LeadEvent, _metadata: &()) {
        self.leads.entry(aggregate_id.clone()).or_default().fold(event);
    }
}

impl ApplyProjection<LeadRegistered> for LeadPipelineReport {
    fn apply_projection(&mut self, aggregate_id: &LeadId, event: &LeadRegistered, _metadata: &()) {
        self.leads
            .entry(aggregate_id.clone())
            .or_default()
            .fold(&LeadEvent::Registered(event.clone()));
    }
}

/// Contact details a single lead has used over time, oldest first.
#[derive(Debug, Default)]
struct ContactHistory {
    names: Vec<Name>,
    phone_numbers: Vec<PhoneNumber>,
}

impl ContactHistory {
    fn record(&mut self, name: &Name, phone_number: &PhoneNumber) {
        if !self.names.contains(name) {
            self.names.push(name.clone());
        }
        if !self.phone_numbers.contains(phone_number) {
            self.phone_numbers.push(phone_number.clone());
        }
    }
}

/// Read model indexing every contact detail a lead has ever used.
///
/// Supports looking up leads by old names or phone numbers, e.g. when a
/// caller's number matches a detail that has since been changed.
#[derive(Debug, Default)]
pub struct LeadDirectory {
    entries: HashMap<LeadId, ContactHistory>,
}

impl LeadDirectory {
    /// The name a lead currently goes by.
    #[must_use]
    pub fn current_name(&self, lead_id: &str) -> Option<&Name> {
        self.entries.get(lead_id)?.names.last()
    }

    /// The phone number a lead is currently reachable on.
    #[must_use]
    pub fn current_phone_number(&self, lead_id: &str) -> Option<&PhoneNumber> {
        self.entries.get(lead_id)?.phone_numbers.last()
    }

    /// Whether a lead has ever used the given name.
    #[must_use]
    pub fn has_used_name(&self, lead_id: &str, name: &Name) -> bool {
        self.entries
            .get(lead_id)
            .is_some_and(|history| history.names.contains(name))
    }

    /// Whether a lead has ever used the given phone number.
    #[must_use]
    pub fn has_used_phone_number(&self, lead_id: &str, phone_number: &PhoneNumber) -> bool {
        self.entries
            .get(lead_id)
            .is_some_and(|history| history.phone_numbers.contains(phone_number))
    }

    /// All leads that have ever used the given phone number.
    #[must_use]
    pub fn leads_by_phone_number(&self, phone_number: &PhoneNumber) -> Vec<&str> {
        let mut matches: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, history)| history.phone_numbers.contains(phone_number))
            .map(|(id, _)| id.as_str())
            .collect();
        matches.sort_unstable();
        matches
    }
}

impl Projection for LeadDirectory {
    type Id = LeadId;
    type Metadata = ();
}

impl ApplyProjection<LeadEvent> for LeadDirectory {
    fn apply_projection(&mut self, aggregate_id: &LeadId, event: &LeadEvent, _metadata: &()) {
        match event {
            LeadEvent::Registered(e) => {
                self.entries
                    .entry(aggregate_id.clone())
                    .or_default()
                    .record(&e.name, &e.phone_number);
            }
            LeadEvent::ContactDetailsChanged(e) => {
                self.entries
                    .entry(aggregate_id.clone())
                    .or_default()
                    .record(&e.name, &e.phone_number);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test::TestFramework;

    type LeadTest = TestFramework<Lead>;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 5, 20, 9, 52, second).unwrap()
    }

    fn registered() -> LeadEvent {
        LeadRegistered {
            name: Name::new("Hiromi Kobayashi"),
            phone_number: PhoneNumber::new("555-8101"),
            at: at(0),
        }
        .into()
    }

    #[test]
    fn registering_a_new_lead_produces_event() {
        LeadTest::given(&[])
            .when(&RegisterLead {
                name: Name::new("Hiromi Kobayashi"),
                phone_number: PhoneNumber::new("555-8101"),
                at: at(0),
            })
            .then_expect_event(&registered());
    }

    #[test]
    fn registering_twice_is_rejected() {
        LeadTest::given(&[registered()])
            .when(&RegisterLead {
                name: Name::new("Someone Else"),
                phone_number: PhoneNumber::new("555-0000"),
                at: at(1),
            })
            .then_expect_error_eq(&LeadError::AlreadyRegistered);
    }

    #[test]
    fn contacting_an_unregistered_lead_is_rejected() {
        LeadTest::given(&[])
            .when(&RecordContact { at: at(1) })
            .then_expect_error_eq(&LeadError::NotRegistered);
    }

    #[test]
    fn contacting_clears_the_follow_up() {
        let mut lead = Lead::default();
        lead.apply(&registered());
        lead.apply(&FollowupSet { at: at(1) }.into());
        assert_eq!(lead.follow_up_on(), Some(at(1)));

        lead.apply(&LeadContacted { at: at(2) }.into());
        assert_eq!(lead.follow_up_on(), None);
    }

    #[test]
    fn changing_to_identical_details_is_a_no_op() {
        LeadTest::given(&[registered()])
            .when(&ChangeContactDetails {
                name: Name::new("Hiromi Kobayashi"),
                phone_number: PhoneNumber::new("555-8101"),
                at: at(1),
            })
            .then_expect_no_event();
    }

    #[test]
    fn changing_details_produces_event() {
        LeadTest::given(&[registered()])
            .when(&ChangeContactDetails {
                name: Name::new("Hiromi Sato"),
                phone_number: PhoneNumber::new("555-8101"),
                at: at(1),
            })
            .then_expect_event(
                &ContactDetailsChanged {
                    name: Name::new("Hiromi Sato"),
                    phone_number: PhoneNumber::new("555-8101"),
                    at: at(1),
                }
                .into(),
            );
    }

    #[test]
    fn submitting_an_order_twice_is_a_no_op() {
        LeadTest::given(&[registered(), OrderSubmitted { at: at(1) }.into()])
            .when(&SubmitOrder { at: at(2) })
            .then_expect_no_event();
    }

    #[test]
    fn confirming_payment_without_an_order_is_rejected() {
        LeadTest::given(&[registered()])
            .when(&ConfirmPayment { at: at(1) })
            .then_expect_error_eq(&LeadError::NoPendingOrder);
    }

    #[test]
    fn confirming_payment_converts_the_lead() {
        LeadTest::given(&[registered(), OrderSubmitted { at: at(1) }.into()])
            .when(&ConfirmPayment { at: at(2) })
            .then_expect_event(&PaymentConfirmed { at: at(2) }.into());
    }

    #[test]
    fn contacting_a_converted_lead_is_a_no_op() {
        LeadTest::given(&[
            registered(),
            OrderSubmitted { at: at(1) }.into(),
            PaymentConfirmed { at: at(2) }.into(),
        ])
        .when(&RecordContact { at: at(3) })
        .then_expect_no_event();
    }

    #[test]
    fn pipeline_report_tracks_version_and_followups() {
        let id = "lead-12".to_string();
        let mut report = LeadPipelineReport::default();
        let history: Vec<LeadEvent> = vec![
            registered(),
            LeadContacted { at: at(1) }.into(),
            FollowupSet { at: at(2) }.into(),
            ContactDetailsChanged {
                name: Name::new("Hiromi Sato"),
                phone_number: PhoneNumber::new("555-8101"),
                at: at(3),
            }
            .into(),
            LeadContacted { at: at(4) }.into(),
            OrderSubmitted { at: at(5) }.into(),
            PaymentConfirmed { at: at(6) }.into(),
        ];
        for event in &history {
            report.apply_projection(&id, event, &());
        }

        let summary = report.summary(&id).unwrap();
        assert_eq!(summary.status, LeadStatus::Converted);
        assert_eq!(summary.followups, 1);
        assert_eq!(summary.follow_up_on, None);
        assert_eq!(summary.name, Some(Name::new("Hiromi Sato")));
        assert_eq!(summary.created_on, Some(at(0)));
        assert_eq!(summary.updated_on, Some(at(6)));
        assert_eq!(summary.version, 6);
    }

    #[test]
    fn directory_remembers_historical_details() {
        let id = "lead-12".to_string();
        let mut directory = LeadDirectory::default();
        directory.apply_projection(&id, &registered(), &());
        directory.apply_projection(
            &id,
            &ContactDetailsChanged {
                name: Name::new("Hiromi Sato"),
                phone_number: PhoneNumber::new("555-9900"),
                at: at(1),
            }
            .into(),
            &(),
        );

        assert_eq!(directory.current_name(&id), Some(&Name::new("Hiromi Sato")));
        assert_eq!(
            directory.current_phone_number(&id),
            Some(&PhoneNumber::new("555-9900"))
        );
        assert!(directory.has_used_name(&id, &Name::new("Hiromi Kobayashi")));
        assert!(directory.has_used_phone_number(&id, &PhoneNumber::new("555-8101")));
        assert!(!directory.has_used_name(&id, &Name::new("Nobody")));
        assert_eq!(
            directory.leads_by_phone_number(&PhoneNumber::new("555-8101")),
            vec!["lead-12"]
        );
    }
}
