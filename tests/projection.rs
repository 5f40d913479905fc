//! Read model tests over interleaved multi-aggregate histories.

use chrono::{DateTime, TimeZone, Utc};
use refold::{
    lead::{
        ContactDetailsChanged, FollowupSet, Lead, LeadContacted, LeadDirectory, LeadEvent,
        LeadPipelineReport, LeadRegistered, LeadStatus, Name, OrderSubmitted, PaymentConfirmed,
        PhoneNumber,
    },
    repository::Repository,
    store::memory,
    test::RepositoryTestExt,
};

fn at(second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 5, 20, 9, 52, second).unwrap()
}

fn registered(name: &str, phone: &str, at_: DateTime<Utc>) -> LeadEvent {
    LeadRegistered {
        name: Name::new(name),
        phone_number: PhoneNumber::new(phone),
        at: at_,
    }
    .into()
}

/// Seed two leads whose histories interleave in the store's global log.
async fn seeded_repo() -> Repository<memory::Store<String, ()>> {
    let mut repo = Repository::new(memory::Store::new());
    let kobayashi = "lead-12".to_string();
    let tanaka = "lead-34".to_string();

    repo.seed_events::<Lead>(&kobayashi, vec![registered("Hiromi Kobayashi", "555-8101", at(0))])
        .await
        .unwrap();
    repo.seed_events::<Lead>(&tanaka, vec![registered("Ken Tanaka", "555-2200", at(1))])
        .await
        .unwrap();
    repo.seed_events::<Lead>(
        &kobayashi,
        vec![
            FollowupSet { at: at(2) }.into(),
            LeadContacted { at: at(3) }.into(),
        ],
    )
    .await
    .unwrap();
    repo.seed_events::<Lead>(
        &tanaka,
        vec![ContactDetailsChanged {
            name: Name::new("Ken Tanaka"),
            phone_number: PhoneNumber::new("555-9900"),
            at: at(4),
        }
        .into()],
    )
    .await
    .unwrap();
    repo.seed_events::<Lead>(
        &kobayashi,
        vec![
            OrderSubmitted { at: at(5) }.into(),
            PaymentConfirmed { at: at(6) }.into(),
        ],
    )
    .await
    .unwrap();

    repo
}

#[tokio::test]
async fn pipeline_report_covers_every_lead() {
    let repo = seeded_repo().await;

    let report: LeadPipelineReport = repo
        .build_projection()
        .events::<LeadEvent>()
        .load()
        .await
        .unwrap();

    assert_eq!(report.len(), 2);

    let kobayashi = report.summary("lead-12").unwrap();
    assert_eq!(kobayashi.status, LeadStatus::Converted);
    assert_eq!(kobayashi.followups, 1);
    assert_eq!(kobayashi.follow_up_on, None);
    assert_eq!(kobayashi.version, 4);
    assert_eq!(kobayashi.updated_on, Some(at(6)));

    let tanaka = report.summary("lead-34").unwrap();
    assert_eq!(tanaka.status, LeadStatus::NewLead);
    assert_eq!(tanaka.phone_number, Some(PhoneNumber::new("555-9900")));
    assert_eq!(tanaka.version, 1);
}

#[tokio::test]
async fn single_instance_projection_ignores_other_streams() {
    let repo = seeded_repo().await;

    let report: LeadPipelineReport = repo
        .build_projection()
        .events_for::<Lead>(&"lead-34".to_string())
        .load()
        .await
        .unwrap();

    assert_eq!(report.len(), 1);
    assert!(report.summary("lead-12").is_none());
    assert!(report.summary("lead-34").is_some());
}

#[tokio::test]
async fn directory_finds_leads_by_historical_details() {
    let repo = seeded_repo().await;

    let directory: LeadDirectory = repo
        .build_projection()
        .events::<LeadEvent>()
        .load()
        .await
        .unwrap();

    // Tanaka's number changed; both the old and new one resolve.
    assert_eq!(
        directory.leads_by_phone_number(&PhoneNumber::new("555-2200")),
        vec!["lead-34"]
    );
    assert_eq!(
        directory.leads_by_phone_number(&PhoneNumber::new("555-9900")),
        vec!["lead-34"]
    );
    assert_eq!(
        directory.current_phone_number("lead-34"),
        Some(&PhoneNumber::new("555-9900"))
    );
    assert!(directory.has_used_phone_number("lead-34", &PhoneNumber::new("555-2200")));
    assert_eq!(
        directory.current_name("lead-12"),
        Some(&Name::new("Hiromi Kobayashi"))
    );
}

#[tokio::test]
async fn rebuilding_a_projection_twice_is_deterministic() {
    let repo = seeded_repo().await;

    let first: LeadPipelineReport = repo
        .build_projection()
        .events::<LeadEvent>()
        .load()
        .await
        .unwrap();
    let second: LeadPipelineReport = repo
        .build_projection()
        .events::<LeadEvent>()
        .load()
        .await
        .unwrap();

    assert_eq!(first.len(), second.len());
    for (id, summary) in first.iter() {
        assert_eq!(second.summary(id), Some(summary));
    }
}

#[tokio::test]
async fn single_event_kind_projection_sees_only_that_kind() {
    let repo = seeded_repo().await;

    let report: LeadPipelineReport = repo
        .build_projection()
        .event::<LeadRegistered>()
        .load()
        .await
        .unwrap();

    // Only registrations were replayed, so both leads sit at version zero.
    assert_eq!(report.len(), 2);
    assert_eq!(report.summary("lead-12").unwrap().version, 0);
    assert_eq!(report.summary("lead-12").unwrap().status, LeadStatus::NewLead);
}
