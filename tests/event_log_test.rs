// Tests for the SQLite event log: ordering, filtering and append-only storage.

use serde_json::json;
use stockfellow_events::events::{GROUP_CREATED, JOIN_REQUEST_REJECTED, MEMBER_ADDED};
use stockfellow_events::projections::rejection_count;
use stockfellow_events::{EventLog, IdFields};

use test_helpers::*;

#[tokio::test]
async fn test_append_assigns_increasing_sequence_and_timestamps() {
    let stores = TestStores::new().await;

    let first = stores.events.append_event(GROUP_CREATED, json!({"groupId": "g1"})).await.unwrap();
    let second = stores
        .events
        .append_event(MEMBER_ADDED, json!({"groupId": "g1", "userId": "u1"}))
        .await
        .unwrap();

    assert!(second.sequence > first.sequence);
    assert!(second.timestamp >= first.timestamp);
    assert_eq!(stores.events.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_get_events_filters_by_aggregate_and_orders() {
    let stores = TestStores::new().await;
    create_test_group(&stores.events, "g1", 3, &["a"]).await;
    create_test_group(&stores.events, "g2", 3, &["b"]).await;
    add_test_member(&stores.events, "g1", "u1").await;
    register_test_user(&stores.events, "u1", "Thandi").await;

    let events = stores.events.get_events(&IdFields::group(), "g1").await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec![GROUP_CREATED, MEMBER_ADDED]);
    assert!(events.windows(2).all(|w| (w[0].timestamp, w[0].sequence) < (w[1].timestamp, w[1].sequence)));

    // MemberAdded carries userId too, so the user filter sees it.
    let user_events = stores.events.get_events(&IdFields::user(), "u1").await.unwrap();
    assert_eq!(user_events.len(), 2);

    assert!(stores.events.get_events(&IdFields::group(), "missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_payload_is_returned_unchanged() {
    let stores = TestStores::new().await;
    let payload = json!({"groupId": "g1", "nested": {"list": [1, 2, 3]}, "note": "ünïcode"});
    stores.events.append_event("CustomThing", payload.clone()).await.unwrap();

    let events = stores.events.get_events(&IdFields::group(), "g1").await.unwrap();
    assert_eq!(events[0].data, payload);
    assert_eq!(events[0].event_type, "CustomThing");
}

#[tokio::test]
async fn test_stored_events_cannot_be_changed() {
    let stores = TestStores::new().await;
    create_test_group(&stores.events, "g1", 3, &["a"]).await;

    let update = sqlx::query("UPDATE events SET event_type = 'Tampered'")
        .execute(&stores.pool)
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM events").execute(&stores.pool).await;
    assert!(delete.is_err());

    assert_eq!(stores.events.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_events_by_type_and_rejection_count() {
    let stores = TestStores::new().await;
    create_test_group(&stores.events, "g1", 3, &["a"]).await;
    for user in ["u1", "u1", "u2"] {
        stores
            .events
            .append_event(JOIN_REQUEST_REJECTED, json!({"groupId": "g1", "userId": user}))
            .await
            .unwrap();
    }

    let rejected = stores
        .events
        .get_events_by_type(&IdFields::group(), "g1", JOIN_REQUEST_REJECTED)
        .await
        .unwrap();
    assert_eq!(rejected.len(), 3);

    assert_eq!(rejection_count(&stores.events, "g1", "u1").await.unwrap(), 2);
    assert_eq!(rejection_count(&stores.events, "g1", "u3").await.unwrap(), 0);
}
