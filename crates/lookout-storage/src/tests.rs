use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::TempDir;

use lookout_common::config::DatabaseConfig;
use lookout_common::types::{Alert, AlertLevel};

use crate::StateStore;

async fn setup() -> (TempDir, StateStore) {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("state.db").to_str().unwrap().to_string(),
        ..Default::default()
    };
    let store = StateStore::connect(&config).await.unwrap();
    (dir, store)
}

fn make_alert(rule: &str, level: AlertLevel, message: &str) -> Alert {
    let now = Utc::now();
    Alert {
        id: Alert::make_id(rule, now),
        rule_name: rule.to_string(),
        level,
        message: message.to_string(),
        timestamp: now,
        data: json!({"sample_hit": {"log": "boom"}, "total_hits": 7}),
        count: 7,
        matches: 1,
    }
}

#[tokio::test]
async fn lease_is_exclusive_between_holders() {
    let (_dir, store) = setup().await;

    assert!(store.try_acquire_lease("app-errors", "replica-a", 30).await.unwrap());
    // a second replica racing the same tick is turned away
    assert!(!store.try_acquire_lease("app-errors", "replica-b", 30).await.unwrap());
    // the holder itself may re-enter
    assert!(store.try_acquire_lease("app-errors", "replica-a", 30).await.unwrap());

    store.release_lease("app-errors", "replica-a").await.unwrap();
    assert!(store.try_acquire_lease("app-errors", "replica-b", 30).await.unwrap());
}

#[tokio::test]
async fn lease_release_by_non_holder_is_ignored() {
    let (_dir, store) = setup().await;

    assert!(store.try_acquire_lease("app-errors", "replica-a", 30).await.unwrap());
    store.release_lease("app-errors", "replica-b").await.unwrap();
    assert!(!store.try_acquire_lease("app-errors", "replica-b", 30).await.unwrap());
}

#[tokio::test]
async fn expired_lease_is_reclaimable() {
    let (_dir, store) = setup().await;

    assert!(store.try_acquire_lease("app-errors", "replica-a", 1).await.unwrap());
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    assert!(store.try_acquire_lease("app-errors", "replica-b", 30).await.unwrap());
}

#[tokio::test]
async fn leases_are_independent_per_rule() {
    let (_dir, store) = setup().await;

    assert!(store.try_acquire_lease("rule-one", "replica-a", 30).await.unwrap());
    assert!(store.try_acquire_lease("rule-two", "replica-b", 30).await.unwrap());
}

#[tokio::test]
async fn dedup_suppresses_within_ttl() {
    let (_dir, store) = setup().await;

    assert!(store
        .check_and_touch("app-errors", "High", "panic in api-1", 120)
        .await
        .unwrap());
    // identical key from any replica within the TTL loses
    assert!(!store
        .check_and_touch("app-errors", "High", "panic in api-1", 120)
        .await
        .unwrap());
    // a different message or level is a different key
    assert!(store
        .check_and_touch("app-errors", "High", "panic in api-2", 120)
        .await
        .unwrap());
    assert!(store
        .check_and_touch("app-errors", "Critical", "panic in api-1", 120)
        .await
        .unwrap());
}

#[tokio::test]
async fn dedup_reopens_after_ttl_expiry() {
    let (_dir, store) = setup().await;

    assert!(store
        .check_and_touch("app-errors", "High", "panic", 1)
        .await
        .unwrap());
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    assert!(store
        .check_and_touch("app-errors", "High", "panic", 1)
        .await
        .unwrap());
}

#[tokio::test]
async fn history_roundtrip_preserves_alert_fields() {
    let (_dir, store) = setup().await;

    let alert = make_alert("app-errors", AlertLevel::High, "7 matches in 5m");
    let before = Utc::now();
    store.save_alert(&alert).await.unwrap();

    let rows = store.get_alerts_by_rule("app-errors", 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.alert_id, alert.id);
    assert_eq!(row.rule_name, "app-errors");
    assert_eq!(row.level, "High");
    assert_eq!(row.message, "7 matches in 5m");
    assert_eq!(row.count, 7);
    assert_eq!(row.matches, 1);
    assert!((row.timestamp - before).num_seconds().abs() <= 2);

    let detail = store.get_alert_by_id(&alert.id).await.unwrap().unwrap();
    assert_eq!(detail.rule_name, "app-errors");
    let data = detail.data.unwrap();
    assert_eq!(data["total_hits"], 7);

    assert!(store.get_alert_by_id("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn history_filters_by_level_and_pages() {
    let (_dir, store) = setup().await;

    for i in 0..5 {
        let level = if i % 2 == 0 { AlertLevel::High } else { AlertLevel::Low };
        let alert = make_alert("app-errors", level, &format!("message {i}"));
        store.save_alert(&alert).await.unwrap();
    }

    let high = store.get_alerts_by_level("High", 10).await.unwrap();
    assert_eq!(high.len(), 3);

    let (page, total) = store.get_alerts_paged(None, 1, 2).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);

    let (rest, _) = store.get_alerts_paged(None, 3, 2).await.unwrap();
    assert_eq!(rest.len(), 1);

    let (windowed, total) = store.get_alerts_paged(Some(1), 1, 10).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(windowed.len(), 5);
}

#[tokio::test]
async fn stats_aggregate_levels_and_recency() {
    let (_dir, store) = setup().await;

    for level in [AlertLevel::High, AlertLevel::High, AlertLevel::Critical] {
        store
            .save_alert(&make_alert("app-errors", level, &format!("m-{level}")))
            .await
            .unwrap();
    }

    let stats = store.get_alert_stats(24).await.unwrap();
    assert_eq!(stats.total_alerts, 3);
    assert_eq!(stats.level_stats.get("High"), Some(&2));
    assert_eq!(stats.level_stats.get("Critical"), Some(&1));
    assert_eq!(stats.recent_alerts.len(), 3);
    assert!(!stats.hourly_stats.is_empty());
}

#[tokio::test]
async fn sessions_expire_and_delete() {
    let (_dir, store) = setup().await;

    let future = Utc::now() + Duration::hours(1);
    store.save_session("s-1", "admin", "admin", future).await.unwrap();
    assert_eq!(
        store.get_session("s-1").await.unwrap(),
        Some(("admin".to_string(), "admin".to_string()))
    );

    // upsert replaces in place
    store.save_session("s-1", "admin", "viewer", future).await.unwrap();
    assert_eq!(
        store.get_session("s-1").await.unwrap().unwrap().1,
        "viewer"
    );

    let past = Utc::now() - Duration::hours(1);
    store.save_session("s-2", "bob", "viewer", past).await.unwrap();
    assert!(store.get_session("s-2").await.unwrap().is_none());
    assert_eq!(store.clean_expired_sessions().await.unwrap(), 1);

    store.delete_session("s-1").await.unwrap();
    assert!(store.get_session("s-1").await.unwrap().is_none());
}
