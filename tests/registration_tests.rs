//! Registration flow tests over the in-memory store

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use accueil_server::{
    config::AppConfig,
    context::{Caller, RequestContext},
    error::AppError,
    lifecycle::EventStatus,
    models::{event::CreateEvent, event::EventQuery, RegistrationStatus, VisitorInfo},
    store::{memory::MemoryStore, Filter, Record, RecordStore, Table},
    AppState,
};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn ctx_at(as_of: DateTime<Utc>) -> RequestContext {
    RequestContext::new(Caller::Staff("front-desk".into()), as_of, Duration::from_secs(5))
}

/// The morning of the jazz night
fn morning() -> RequestContext {
    ctx_at(at(2025, 6, 15, 9, 0))
}

fn setup(store: MemoryStore) -> AppState {
    AppState::new(AppConfig::default(), Arc::new(store))
}

fn jazz_night() -> CreateEvent {
    CreateEvent {
        title: "Jazz night".into(),
        category: "concert".into(),
        event_date: "2025-06-15".into(),
        start_time: "20:00".into(),
        duration_hours: 3.0,
        venue: "Main hall".into(),
        capacity: 2,
        price_cents: Some(1500),
        description: None,
    }
}

fn ada() -> VisitorInfo {
    VisitorInfo {
        name: Some("Ada".into()),
        surname: Some("Lovelace".into()),
        email: Some("ada@example.org".into()),
        phone: Some("06 12 34 56 78".into()),
    }
}

/// A visitor who leaves no phone number
fn grace(email: &str) -> VisitorInfo {
    VisitorInfo {
        name: Some("Grace".into()),
        surname: Some("Hopper".into()),
        email: Some(email.into()),
        phone: None,
    }
}

fn returning(phone: &str) -> VisitorInfo {
    VisitorInfo { phone: Some(phone.into()), ..Default::default() }
}

async fn create_event(state: &AppState) -> Uuid {
    state.services.events.create(&morning(), jazz_night()).await.unwrap().event.id
}

async fn stored_count(state: &AppState, event_id: Uuid) -> i32 {
    state.services.events.get(&morning(), event_id).await.unwrap().event.registration_count
}

#[tokio::test]
async fn test_register_twice_counts_once() {
    let store = MemoryStore::new();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;

    let first = state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();
    assert!(first.created);
    assert_eq!(first.registration_count, 1);
    assert_eq!(first.registration.status, RegistrationStatus::Confirmed);
    assert_eq!(first.registration.confirmation_code.len(), 8);

    let second = state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.registration.id, first.registration.id);
    assert_eq!(second.registration_count, 1);

    assert_eq!(store.len(Table::Visitors), 1);
    assert_eq!(store.len(Table::Registrations), 1);
    assert_eq!(stored_count(&state, event_id).await, 1);
}

#[tokio::test]
async fn test_express_path_reuses_visitor() {
    let store = MemoryStore::new();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;
    let other_id = state
        .services
        .events
        .create(&morning(), CreateEvent { title: "Printmaking".into(), category: "workshop".into(), ..jazz_night() })
        .await
        .unwrap()
        .event
        .id;

    let first = state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();
    let visitor = state.services.visitors.lookup_by_phone("+0612345678").await;
    assert!(matches!(visitor, Err(AppError::NotFound(_))));
    let visitor = state.services.visitors.lookup_by_phone("06.12.34.56.78").await.unwrap();
    assert_eq!(visitor.id, first.registration.visitor_id);
    assert_eq!(visitor.name, "Ada");

    // Phone only, formatted differently
    let express = state
        .services
        .registrations
        .register(&morning(), other_id, returning("0612345678"))
        .await
        .unwrap();
    assert!(express.created);
    assert_eq!(express.registration.visitor_id, first.registration.visitor_id);
    assert_eq!(store.len(Table::Visitors), 1);
}

#[tokio::test]
async fn test_new_visitor_requires_name_and_email() {
    let state = setup(MemoryStore::new());
    let event_id = create_event(&state).await;

    let err = state
        .services
        .registrations
        .register(&morning(), event_id, returning("0700000000"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidVisitorData(_)));
    assert!(!err.is_retryable());

    let bad_email = VisitorInfo { email: Some("not-an-email".into()), ..ada() };
    let err = state.services.registrations.register(&morning(), event_id, bad_email).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidVisitorData(_)));
}

#[tokio::test]
async fn test_phoneless_retry_counts_once() {
    let store = MemoryStore::new();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;

    let first = state
        .services
        .registrations
        .register(&morning(), event_id, grace("grace@example.org"))
        .await
        .unwrap();
    assert!(first.created);

    // Retry with the email in another case
    let retry = state
        .services
        .registrations
        .register(&morning(), event_id, grace("Grace@Example.ORG"))
        .await
        .unwrap();
    assert!(!retry.created);
    assert_eq!(retry.registration.id, first.registration.id);
    assert_eq!(retry.registration_count, 1);

    assert_eq!(store.len(Table::Visitors), 1);
    assert_eq!(store.len(Table::Registrations), 1);
    assert_eq!(stored_count(&state, event_id).await, 1);
    let visitor = store
        .select_one(Table::Visitors, &Filter::by_id(first.registration.visitor_id))
        .await
        .unwrap();
    assert_eq!(visitor["email"], json!("grace@example.org"));
}

#[tokio::test]
async fn test_phoneless_visitor_is_distinct_from_phone_owner() {
    let store = MemoryStore::new();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;

    let with_phone = state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();
    let without = state
        .services
        .registrations
        .register(&morning(), event_id, VisitorInfo { phone: None, ..ada() })
        .await
        .unwrap();
    assert!(without.created);
    assert_ne!(without.registration.visitor_id, with_phone.registration.visitor_id);
    assert_eq!(store.len(Table::Visitors), 2);
    assert_eq!(stored_count(&state, event_id).await, 2);
}

#[tokio::test]
async fn test_oversized_duration_is_rejected_before_storing() {
    let store = MemoryStore::new();
    let state = setup(store.clone());

    let err = state
        .services
        .events
        .create(&ctx_at(at(2025, 6, 15, 21, 0)), CreateEvent { duration_hours: 1e10, ..jazz_night() })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidSchedule(_)));
    assert!(!err.is_retryable());
    assert_eq!(store.len(Table::Events), 0);
}

#[tokio::test]
async fn test_check_in_round_trip() {
    let state = setup(MemoryStore::new());
    let event_id = create_event(&state).await;
    let outcome = state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();
    let code = outcome.registration.confirmation_code;

    let door = ctx_at(at(2025, 6, 15, 19, 55));
    let checked = state
        .services
        .registrations
        .check_in(&door, &code.to_lowercase())
        .await
        .unwrap();
    assert_eq!(checked.status, RegistrationStatus::CheckedIn);
    assert!(checked.checked_in_at.is_some());

    let again = state.services.registrations.check_in(&door, &code).await.unwrap_err();
    assert!(matches!(again, AppError::AlreadyCheckedIn(_)));

    let cancel = state.services.registrations.cancel(&door, &code).await.unwrap_err();
    assert!(matches!(cancel, AppError::AlreadyCheckedIn(_)));

    // Checking in does not move the counter
    assert_eq!(stored_count(&state, event_id).await, 1);
}

#[tokio::test]
async fn test_cancel_restores_counter() {
    let state = setup(MemoryStore::new());
    let event_id = create_event(&state).await;
    let outcome = state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();
    let code = outcome.registration.confirmation_code;

    let cancelled = state.services.registrations.cancel(&morning(), &code).await.unwrap();
    assert_eq!(cancelled.registration.status, RegistrationStatus::Cancelled);
    assert_eq!(cancelled.registration_count, 0);
    assert_eq!(stored_count(&state, event_id).await, 0);

    let again = state.services.registrations.cancel(&morning(), &code).await.unwrap_err();
    assert!(matches!(again, AppError::AlreadyCancelled(_)));
    let check_in = state.services.registrations.check_in(&morning(), &code).await.unwrap_err();
    assert!(matches!(check_in, AppError::AlreadyCancelled(_)));

    // A cancelled visitor may register again with a new code
    let back = state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();
    assert!(back.created);
    assert_ne!(back.registration.confirmation_code, code);
    assert_eq!(back.registration_count, 1);
}

#[tokio::test]
async fn test_unknown_code() {
    let state = setup(MemoryStore::new());
    let err = tokio_test::assert_err!(state.services.registrations.check_in(&morning(), "NOPE2345").await);
    assert!(matches!(err, AppError::NotFound(_)));
    tokio_test::assert_err!(state.services.registrations.cancel(&morning(), "NOPE2345").await);
}

#[tokio::test]
async fn test_registration_window_follows_schedule() {
    let state = setup(MemoryStore::new());
    let event_id = create_event(&state).await;

    // Still open during the event
    let during = ctx_at(at(2025, 6, 15, 21, 0));
    let view = state.services.events.get(&during, event_id).await.unwrap();
    assert_eq!(view.status, EventStatus::Active);
    assert!(view.publicly_listed);
    state.services.registrations.register(&during, event_id, ada()).await.unwrap();

    let after = ctx_at(at(2025, 6, 16, 0, 1));
    let view = state.services.events.get(&after, event_id).await.unwrap();
    assert_eq!(view.status, EventStatus::Completed);
    assert!(!view.publicly_listed);

    let err = state
        .services
        .registrations
        .register(&after, event_id, returning("0612345678"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::EventNotAcceptingRegistrations { status: EventStatus::Completed, .. }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_public_listing_hides_completed_events() {
    let state = setup(MemoryStore::new());
    let tonight = create_event(&state).await;
    let earlier = state
        .services
        .events
        .create(&morning(), CreateEvent { event_date: "2025-06-01".into(), ..jazz_night() })
        .await
        .unwrap()
        .event
        .id;

    let public = state.services.events.list(&morning(), &EventQuery::default()).await.unwrap();
    let ids: Vec<_> = public.iter().map(|v| v.event.id).collect();
    assert_eq!(ids, vec![tonight]);

    let all = state
        .services
        .events
        .list(&morning(), &EventQuery { include_completed: Some(true), ..Default::default() })
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|v| v.event.id).collect();
    assert_eq!(ids, vec![earlier, tonight]);
}

#[tokio::test]
async fn test_overbooking_is_flagged() {
    let state = setup(MemoryStore::new());
    let event_id = create_event(&state).await;

    for (i, phone) in ["0611111111", "0622222222", "0633333333"].iter().enumerate() {
        let info = VisitorInfo {
            name: Some(format!("Visitor {}", i)),
            email: Some(format!("v{}@example.org", i)),
            phone: Some(phone.to_string()),
            ..Default::default()
        };
        let outcome = state.services.registrations.register(&morning(), event_id, info).await.unwrap();
        assert_eq!(outcome.over_capacity, i >= 2);
    }
    assert!(state.services.events.get(&morning(), event_id).await.unwrap().over_capacity);
}

#[tokio::test]
async fn test_concurrent_registrations_for_same_new_visitor() {
    let store = MemoryStore::interleaved();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;

    let (ctx_a, ctx_b) = (morning(), morning());
    let (a, b) = tokio::join!(
        state.services.registrations.register(&ctx_a, event_id, ada()),
        state.services.registrations.register(&ctx_b, event_id, ada()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.registration.id, b.registration.id);
    assert_eq!(u8::from(a.created) + u8::from(b.created), 1);
    assert_eq!(store.len(Table::Visitors), 1);
    assert_eq!(store.len(Table::Registrations), 1);
    assert_eq!(stored_count(&state, event_id).await, 1);
}

#[tokio::test]
async fn test_concurrent_registrations_for_same_phoneless_visitor() {
    let store = MemoryStore::interleaved();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;

    let ctx = morning();
    let (a, b) = tokio::join!(
        state.services.registrations.register(&ctx, event_id, grace("grace@example.org")),
        state.services.registrations.register(&ctx, event_id, grace("GRACE@example.org")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.registration.id, b.registration.id);
    assert_eq!(u8::from(a.created) + u8::from(b.created), 1);
    assert_eq!(store.len(Table::Visitors), 1);
    assert_eq!(stored_count(&state, event_id).await, 1);
}

#[tokio::test]
async fn test_concurrent_registrations_of_different_visitors() {
    let store = MemoryStore::interleaved();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;

    let ctx = morning();
    let (a, b) = tokio::join!(
        state.services.registrations.register(&ctx, event_id, ada()),
        state.services.registrations.register(&ctx, event_id, grace("grace@example.org")),
    );
    assert!(a.unwrap().created);
    assert!(b.unwrap().created);
    assert_eq!(stored_count(&state, event_id).await, 2);
}

#[tokio::test]
async fn test_concurrent_check_in_and_cancel() {
    let store = MemoryStore::interleaved();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;
    let code = state
        .services
        .registrations
        .register(&morning(), event_id, ada())
        .await
        .unwrap()
        .registration
        .confirmation_code;

    let ctx = morning();
    let (checked, cancelled) = tokio::join!(
        state.services.registrations.check_in(&ctx, &code),
        state.services.registrations.cancel(&ctx, &code),
    );

    // Exactly one transition wins
    match (checked, cancelled) {
        (Ok(r), Err(AppError::AlreadyCheckedIn(_))) => {
            assert_eq!(r.status, RegistrationStatus::CheckedIn);
            assert_eq!(stored_count(&state, event_id).await, 1);
        }
        (Err(AppError::AlreadyCancelled(_)), Ok(outcome)) => {
            assert_eq!(outcome.registration.status, RegistrationStatus::Cancelled);
            assert_eq!(stored_count(&state, event_id).await, 0);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_counter_drift_audit_and_repair() {
    let store = MemoryStore::new();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;
    state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();

    // Simulate the double increments left behind by an older client
    let mut patch = Record::new();
    patch.insert("registration_count".into(), json!(3));
    store.update(Table::Events, event_id, patch, None).await.unwrap();

    let audit = state.services.events.audit_counter(event_id).await.unwrap();
    assert_eq!((audit.stored, audit.actual, audit.drift), (3, 1, 2));

    let repaired = state.services.events.repair_counter(&morning(), event_id).await.unwrap();
    assert_eq!((repaired.stored, repaired.actual, repaired.drift), (1, 1, 0));

    // Any later write also converges on the true count
    let mut patch = Record::new();
    patch.insert("registration_count".into(), json!(0));
    store.update(Table::Events, event_id, patch, None).await.unwrap();
    let outcome = state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();
    assert!(!outcome.created);
    assert_eq!(outcome.registration_count, 1);
}

#[tokio::test]
async fn test_event_update_and_delete() {
    let store = MemoryStore::new();
    let state = setup(store.clone());
    let event_id = create_event(&state).await;

    let updated = state
        .services
        .events
        .update(
            &morning(),
            event_id,
            accueil_server::models::event::UpdateEvent {
                start_time: Some("08:00".into()),
                capacity: Some(120),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, EventStatus::Active);
    assert_eq!(updated.event.capacity, 120);
    assert_eq!(updated.event.registration_count, 0);
    assert!(updated.event.updated_at.is_some());

    let invalid = state
        .services
        .events
        .update(
            &morning(),
            event_id,
            accueil_server::models::event::UpdateEvent { duration_hours: Some(0.0), ..Default::default() },
        )
        .await
        .unwrap_err();
    assert!(matches!(invalid, AppError::InvalidSchedule(_)));

    state.services.registrations.register(&morning(), event_id, ada()).await.unwrap();
    let err = state.services.events.delete(&morning(), event_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let empty = state
        .services
        .events
        .create(&morning(), CreateEvent { title: "Open studio".into(), ..jazz_night() })
        .await
        .unwrap()
        .event
        .id;
    tokio_test::assert_ok!(state.services.events.delete(&morning(), empty).await);
    assert!(store.select_one(Table::Events, &Filter::by_id(empty)).await.is_err());
}
