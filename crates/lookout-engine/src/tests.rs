use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use lookout_common::config::{DatabaseConfig, SuppressionConfig};
use lookout_common::types::{Alert, AlertLevel, Rule, RuleType, SearchHit, SearchResponse};
use lookout_notify::{Notifier, NotifierSet};
use lookout_search::{SearchBackend, SearchError};
use lookout_storage::StateStore;

use crate::engine::{EngineOptions, RuleEngine};
use crate::levels::LevelMatcher;
use crate::render::render;
use crate::trigger::should_trigger;

// ---- fakes ----

struct FakeSearch {
    response: Mutex<SearchResponse>,
    fail: AtomicBool,
    indexed: Mutex<Vec<(String, String)>>,
}

impl FakeSearch {
    fn new(response: SearchResponse) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response),
            fail: AtomicBool::new(false),
            indexed: Mutex::new(Vec::new()),
        })
    }

    fn indexed_ids(&self) -> Vec<String> {
        self.indexed.lock().unwrap().iter().map(|(_, id)| id.clone()).collect()
    }
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search(&self, _index: &str, _body: &Value) -> lookout_search::Result<SearchResponse> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SearchError::Unavailable("store down".into()));
        }
        Ok(self.response.lock().unwrap().clone())
    }

    async fn count(&self, _index: &str, _body: &Value) -> lookout_search::Result<i64> {
        Ok(self.response.lock().unwrap().total())
    }

    async fn index(&self, index: &str, id: &str, _doc: &Value) -> lookout_search::Result<()> {
        self.indexed
            .lock()
            .unwrap()
            .push((index.to_string(), id.to_string()));
        Ok(())
    }

    async fn index_auto_id(&self, _index: &str, _doc: &Value) -> lookout_search::Result<()> {
        Ok(())
    }

    async fn health_probe(&self) -> lookout_search::Result<()> {
        Ok(())
    }
}

struct CountingNotifier {
    name: &'static str,
    fail: bool,
    sent: AtomicU32,
}

impl CountingNotifier {
    fn new(name: &'static str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail,
            sent: AtomicU32::new(0),
        })
    }

    fn sent(&self) -> u32 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, _alert: &Alert) -> lookout_notify::Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(lookout_notify::NotifyError::Other("backend down".into()))
        } else {
            Ok(())
        }
    }
}

// ---- builders ----

fn make_rule(name: &str, rule_type: RuleType, index: &str, threshold: i64) -> Rule {
    Rule {
        name: name.to_string(),
        rule_type,
        index: index.to_string(),
        query: None,
        threshold,
        timeframe: 300,
        query_key: vec![],
        level: None,
        channels: vec![],
        enabled: true,
        custom_text: None,
        custom_args: vec![],
    }
}

fn make_response(total: i64, sources: Vec<Value>) -> SearchResponse {
    let mut response = SearchResponse::default();
    response.hits.total.value = total;
    response.hits.total.relation = "eq".to_string();
    response.hits.max_score = Some(1.0);
    response.hits.hits = sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| SearchHit {
            index: "test".to_string(),
            id: format!("doc-{i}"),
            score: Some(1.0),
            source,
        })
        .collect();
    response
}

fn logging_source() -> Value {
    json!({
        "log": "panic: nil map",
        "@timestamp": "2025-01-01T12:00:00Z",
        "kubernetes": {
            "pod_name": "api-1",
            "namespace_name": "prod",
            "container_name": "api",
            "container_image": "registry/api:1.2"
        }
    })
}

fn options(instance: &str, suppression: SuppressionConfig) -> EngineOptions {
    EngineOptions {
        run_interval: Duration::from_secs(60),
        evaluation_timeout: Duration::from_secs(30),
        max_running_rules: 10,
        writeback_index: "lookout-alert-status".to_string(),
        instance_id: instance.to_string(),
        lease_ttl_secs: 30,
        dedupe_ttl_secs: 120,
        suppression,
    }
}

async fn shared_store() -> (TempDir, Arc<StateStore>) {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("state.db").to_str().unwrap().to_string(),
        ..Default::default()
    };
    (dir, Arc::new(StateStore::connect(&config).await.unwrap()))
}

fn build_engine(
    instance: &str,
    suppression: SuppressionConfig,
    search: Arc<FakeSearch>,
    store: Arc<StateStore>,
    notifiers: Vec<Arc<dyn Notifier>>,
    rules: Vec<Rule>,
) -> Arc<RuleEngine> {
    let mut engine = RuleEngine::new(
        options(instance, suppression),
        LevelMatcher::default(),
        search,
        store,
        Arc::new(NotifierSet::with_notifiers(notifiers)),
    );
    engine.load_rules(rules);
    Arc::new(engine)
}

// ---- trigger predicates ----

#[test]
fn frequency_fires_at_or_above_threshold() {
    let rule = make_rule("r", RuleType::Frequency, "idx", 5);
    for (n, expected) in [(0, false), (4, false), (5, true), (7, true)] {
        assert_eq!(should_trigger(&rule, &make_response(n, vec![])), expected);
    }
}

#[test]
fn any_fires_on_any_hit() {
    let rule = make_rule("r", RuleType::Any, "idx", 0);
    assert!(!should_trigger(&rule, &make_response(0, vec![])));
    assert!(should_trigger(&rule, &make_response(1, vec![])));
}

#[test]
fn flatline_fires_below_threshold() {
    let rule = make_rule("r", RuleType::Flatline, "idx", 10);
    assert!(should_trigger(&rule, &make_response(3, vec![])));
    assert!(should_trigger(&rule, &make_response(9, vec![])));
    assert!(!should_trigger(&rule, &make_response(10, vec![])));
    assert!(!should_trigger(&rule, &make_response(50, vec![])));
}

#[test]
fn spike_change_and_unknown_predicates() {
    let spike = make_rule("r", RuleType::Spike, "idx", 5);
    assert!(should_trigger(&spike, &make_response(5, vec![])));
    assert!(!should_trigger(&spike, &make_response(4, vec![])));

    let change = make_rule("r", RuleType::Change, "idx", 99);
    assert!(should_trigger(&change, &make_response(1, vec![])));
    assert!(!should_trigger(&change, &make_response(0, vec![])));

    let unknown = make_rule("r", RuleType::Unknown, "idx", 5);
    assert!(should_trigger(&unknown, &make_response(5, vec![])));
    assert!(!should_trigger(&unknown, &make_response(4, vec![])));
}

// ---- level resolution ----

#[test]
fn explicit_rule_level_wins() {
    let mut rule = make_rule("harmless name", RuleType::Any, "idx", 0);
    rule.level = Some(AlertLevel::Critical);
    assert_eq!(LevelMatcher::default().resolve(&rule), AlertLevel::Critical);
}

#[test]
fn level_patterns_apply_in_order() {
    let matcher = LevelMatcher::default();
    let cases = [
        ("System Component Error Burst", AlertLevel::Critical),
        ("security audit failures", AlertLevel::Critical),
        ("fatal writes detected", AlertLevel::Critical),
        ("panic in handler", AlertLevel::Critical),
        ("app-errors", AlertLevel::High),
        ("system component warning flood", AlertLevel::High),
        ("disk warning", AlertLevel::Medium),
        ("slow requests", AlertLevel::Low),
    ];
    for (name, expected) in cases {
        let rule = make_rule(name, RuleType::Any, "idx", 0);
        assert_eq!(matcher.resolve(&rule), expected, "rule name: {name}");
    }
}

#[test]
fn level_resolution_is_total_for_configured_patterns() {
    let matcher = LevelMatcher::new(vec![lookout_common::config::LevelPattern {
        contains: vec!["outage".to_string()],
        level: AlertLevel::Critical,
    }]);
    let hit = make_rule("regional outage", RuleType::Any, "idx", 0);
    let miss = make_rule("anything else", RuleType::Any, "idx", 0);
    assert_eq!(matcher.resolve(&hit), AlertLevel::Critical);
    assert_eq!(matcher.resolve(&miss), AlertLevel::Low);
}

// ---- renderer ----

#[test]
fn render_is_deterministic_and_ignores_unread_fields() {
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

    let a = render(&rule, &make_response(7, vec![logging_source()]), now);
    let b = render(&rule, &make_response(7, vec![logging_source()]), now);
    assert_eq!(a, b);

    // a field no template reads must not perturb the output
    let mut noisy = logging_source();
    noisy["irrelevant_field"] = json!("noise");
    let c = render(&rule, &make_response(7, vec![noisy]), now);
    assert_eq!(a, c);
}

#[test]
fn logging_template_includes_pod_and_truncated_log() {
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    let now = Utc::now();

    let mut source = logging_source();
    source["log"] = json!("x".repeat(600));
    let message = render(&rule, &make_response(7, vec![source]), now);

    assert!(message.contains("Application Log Alert"));
    assert!(message.contains("api-1"));
    assert!(message.contains("prod"));
    assert!(message.contains(&format!("{}...", "x".repeat(500))));
    assert!(!message.contains(&"x".repeat(501)));
    assert!(message.contains("7 matching log lines"));
}

#[test]
fn system_component_variant_relabels_fields() {
    let rule = make_rule(
        "system component errors",
        RuleType::Frequency,
        "app-logging-*",
        1,
    );
    let message = render(&rule, &make_response(2, vec![logging_source()]), Utc::now());
    assert!(message.contains("System Component Log Alert"));
    assert!(message.contains("**Node:** api-1"));
    assert!(message.contains("**Component:** api"));
}

#[test]
fn events_template_extracts_involved_object() {
    let rule = make_rule("pod events", RuleType::Any, "kube-events-*", 0);
    let source = json!({
        "reason": "BackOff",
        "message": "Back-off restarting failed container",
        "type": "Warning",
        "involvedObject": {"kind": "Pod", "name": "api-1", "namespace": "prod"},
        "firstTimestamp": "2025-01-01T11:00:00Z",
        "lastTimestamp": "2025-01-01T12:00:00Z",
        "count": 14
    });
    let message = render(&rule, &make_response(3, vec![source]), Utc::now());
    assert!(message.contains("Kubernetes Event Alert"));
    assert!(message.contains("**Reason:** BackOff"));
    assert!(message.contains("**Object kind:** Pod"));
    assert!(message.contains("**Occurrences:** 14"));
}

#[test]
fn auditing_template_extracts_user_and_response() {
    let rule = make_rule("security audit", RuleType::Any, "auditing-*", 0);
    let source = json!({
        "Level": "Metadata",
        "Message": "secrets accessed",
        "Verb": "get",
        "@timestamp": "2025-01-01T12:00:00Z",
        "ObjectRef": {"Resource": "secrets", "Name": "db-creds", "Namespace": "prod"},
        "User": {"Username": "dev@corp", "UID": "u-42"},
        "ResponseStatus": {"code": 200}
    });
    let message = render(&rule, &make_response(1, vec![source]), Utc::now());
    assert!(message.contains("Security Audit Alert"));
    assert!(message.contains("**User:** dev@corp (UID: u-42)"));
    assert!(message.contains("**Response code:** 200"));
}

#[test]
fn default_template_used_for_unrecognized_index() {
    let rule = make_rule("flat traffic", RuleType::Flatline, "metrics-ingest", 10);
    let message = render(&rule, &make_response(3, vec![]), Utc::now());
    assert!(message.contains("Search Store Alert"));
    assert!(message.contains("**Index pattern:** metrics-ingest"));
    assert!(message.contains("**Matched records:** 3"));
}

#[test]
fn empty_hits_fall_back_to_summary_line() {
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 1);
    let message = render(&rule, &make_response(4, vec![]), Utc::now());
    assert_eq!(message, "Rule app-errors tripped with 4 matching log records");
}

#[test]
fn custom_text_interpolates_and_prepends() {
    let mut rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    rule.custom_text = Some("Host ${kubernetes.pod_name} failed".to_string());
    rule.custom_args = vec!["@timestamp".to_string(), "log".to_string()];

    let mut source = logging_source();
    source["kubernetes"]["pod_name"] = json!("db-0");
    let message = render(&rule, &make_response(2, vec![source]), Utc::now());

    assert!(message.starts_with("Host db-0 failed"));
    let data_fields = message.find("Data fields:").unwrap();
    let body = message.find("Application Log Alert").unwrap();
    assert!(data_fields < body);
    assert!(message.contains("- @timestamp: "));
    assert!(message.contains("- log: panic: nil map"));
}

#[test]
fn unknown_placeholder_renders_empty() {
    let mut rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    rule.custom_text = Some("value=[${missing.path}]".to_string());
    let message = render(&rule, &make_response(1, vec![logging_source()]), Utc::now());
    assert!(message.starts_with("value=[]"));
}

// ---- evaluation protocol ----

#[tokio::test]
async fn frequency_trip_emits_once_and_persists() {
    let (_dir, store) = shared_store().await;
    let search = FakeSearch::new(make_response(7, vec![logging_source()]));
    let notifier = CountingNotifier::new("dingtalk", false);
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    let engine = build_engine(
        "replica-a",
        SuppressionConfig::default(),
        search.clone(),
        store.clone(),
        vec![notifier.clone()],
        vec![rule.clone()],
    );

    engine.evaluate_rule(&rule).await;

    assert_eq!(notifier.sent(), 1);
    let rows = store.get_alerts_by_rule("app-errors", 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    // name contains "error", so the level derives to High
    assert_eq!(rows[0].level, "High");
    assert_eq!(rows[0].count, 7);
    assert_eq!(rows[0].matches, 1);
    assert!(rows[0].message.contains("api-1"));
    // the alert was written back into the search store under its id
    assert_eq!(search.indexed_ids(), vec![rows[0].alert_id.clone()]);
    // the dedup key is set: the same message cannot be claimed again
    assert!(!store
        .check_and_touch("app-errors", "High", &rows[0].message, 120)
        .await
        .unwrap());
}

#[tokio::test]
async fn immediate_re_tick_is_deduplicated() {
    let (_dir, store) = shared_store().await;
    let search = FakeSearch::new(make_response(7, vec![logging_source()]));
    let notifier = CountingNotifier::new("dingtalk", false);
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    let engine = build_engine(
        "replica-a",
        SuppressionConfig::default(),
        search,
        store.clone(),
        vec![notifier.clone()],
        vec![rule.clone()],
    );

    engine.evaluate_rule(&rule).await;
    engine.evaluate_rule(&rule).await;

    assert_eq!(notifier.sent(), 1);
    let rows = store.get_alerts_by_rule("app-errors", 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    // lease was acquired and released cleanly both times
    assert!(store
        .try_acquire_lease("app-errors", "replica-b", 30)
        .await
        .unwrap());
}

#[tokio::test]
async fn racing_replicas_emit_exactly_one_alert() {
    let (_dir, store) = shared_store().await;
    let search = FakeSearch::new(make_response(10, vec![logging_source()]));
    let notifier_a = CountingNotifier::new("dingtalk", false);
    let notifier_b = CountingNotifier::new("dingtalk", false);
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);

    let engine_a = build_engine(
        "replica-a",
        SuppressionConfig::default(),
        search.clone(),
        store.clone(),
        vec![notifier_a.clone()],
        vec![rule.clone()],
    );
    let engine_b = build_engine(
        "replica-b",
        SuppressionConfig::default(),
        search,
        store.clone(),
        vec![notifier_b.clone()],
        vec![rule.clone()],
    );

    tokio::join!(engine_a.evaluate_rule(&rule), engine_b.evaluate_rule(&rule));

    let rows = store.get_alerts_by_rule("app-errors", 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(notifier_a.sent() + notifier_b.sent(), 1);
}

#[tokio::test]
async fn flatline_fires_with_default_template() {
    let (_dir, store) = shared_store().await;
    let search = FakeSearch::new(make_response(3, vec![]));
    let notifier = CountingNotifier::new("dingtalk", false);
    let mut rule = make_rule("flat traffic", RuleType::Flatline, "metrics-ingest", 10);
    rule.timeframe = 60;
    let engine = build_engine(
        "replica-a",
        SuppressionConfig::default(),
        search,
        store.clone(),
        vec![notifier.clone()],
        vec![rule.clone()],
    );

    engine.evaluate_rule(&rule).await;

    assert_eq!(notifier.sent(), 1);
    let rows = store.get_alerts_by_rule("flat traffic", 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].level, "Low");
    assert!(rows[0].message.contains("Search Store Alert"));
}

#[tokio::test]
async fn notifier_failure_does_not_block_history() {
    let (_dir, store) = shared_store().await;
    let search = FakeSearch::new(make_response(7, vec![logging_source()]));
    let healthy_one = CountingNotifier::new("dingtalk", false);
    let failing = CountingNotifier::new("wechat", true);
    let healthy_two = CountingNotifier::new("feishu", false);
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    let engine = build_engine(
        "replica-a",
        SuppressionConfig::default(),
        search,
        store.clone(),
        vec![healthy_one.clone(), failing.clone(), healthy_two.clone()],
        vec![rule.clone()],
    );

    engine.evaluate_rule(&rule).await;

    assert_eq!(healthy_one.sent(), 1);
    assert_eq!(failing.sent(), 1);
    assert_eq!(healthy_two.sent(), 1);
    let rows = store.get_alerts_by_rule("app-errors", 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!store
        .check_and_touch("app-errors", "High", &rows[0].message, 120)
        .await
        .unwrap());
}

#[tokio::test]
async fn rule_channel_list_restricts_delivery() {
    let (_dir, store) = shared_store().await;
    let search = FakeSearch::new(make_response(7, vec![logging_source()]));
    let dingtalk = CountingNotifier::new("dingtalk", false);
    let feishu = CountingNotifier::new("feishu", false);
    let mut rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    rule.channels = vec!["feishu".to_string()];
    let engine = build_engine(
        "replica-a",
        SuppressionConfig::default(),
        search,
        store,
        vec![dingtalk.clone(), feishu.clone()],
        vec![rule.clone()],
    );

    engine.evaluate_rule(&rule).await;

    assert_eq!(dingtalk.sent(), 0);
    assert_eq!(feishu.sent(), 1);
}

#[tokio::test]
async fn search_failure_skips_tick_and_releases_lease() {
    let (_dir, store) = shared_store().await;
    let search = FakeSearch::new(make_response(7, vec![logging_source()]));
    search.fail.store(true, Ordering::SeqCst);
    let notifier = CountingNotifier::new("dingtalk", false);
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    let engine = build_engine(
        "replica-a",
        SuppressionConfig::default(),
        search,
        store.clone(),
        vec![notifier.clone()],
        vec![rule.clone()],
    );

    engine.evaluate_rule(&rule).await;

    assert_eq!(notifier.sent(), 0);
    assert!(store
        .get_alerts_by_rule("app-errors", 10)
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .try_acquire_lease("app-errors", "replica-b", 30)
        .await
        .unwrap());
}

// ---- suppression ----

#[tokio::test]
async fn suppression_blocks_repeat_evaluations() {
    let (_dir, store) = shared_store().await;
    let search = FakeSearch::new(make_response(7, vec![logging_source()]));
    let notifier = CountingNotifier::new("dingtalk", false);
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    let suppression = SuppressionConfig {
        enabled: true,
        realert_minutes: 10,
        ..Default::default()
    };
    let engine = build_engine(
        "replica-a",
        suppression,
        search,
        store.clone(),
        vec![notifier.clone()],
        vec![rule.clone()],
    );

    engine.evaluate_rule(&rule).await;
    // second pass is stopped by the in-memory flag before the search runs
    engine.evaluate_rule(&rule).await;

    assert_eq!(notifier.sent(), 1);
    let status = engine.status_snapshot("app-errors").await.unwrap();
    assert!(status.suppressed);
    assert_eq!(status.alert_count, 1);
    assert!(status.suppress_until.unwrap() > Utc::now());
}

#[tokio::test]
async fn linear_backoff_grows_the_window_monotonically() {
    let (_dir, store) = shared_store().await;
    // vary the payload so dedup never interferes with the second emission
    let search = FakeSearch::new(make_response(7, vec![logging_source()]));
    let notifier = CountingNotifier::new("dingtalk", false);
    let rule = make_rule("app-errors", RuleType::Frequency, "app-logging-*", 5);
    let suppression = SuppressionConfig {
        enabled: true,
        realert_minutes: 5,
        exponential_realert: lookout_common::config::ExponentialRealertConfig {
            enabled: true,
            hours: 1,
        },
    };
    let engine = build_engine(
        "replica-a",
        suppression,
        search.clone(),
        store,
        vec![notifier.clone()],
        vec![rule.clone()],
    );

    engine.evaluate_rule(&rule).await;
    let first_until = engine
        .status_snapshot("app-errors")
        .await
        .unwrap()
        .suppress_until
        .unwrap();

    // clear the advisory flag the way a fresh process would, then fire again
    // with a different document so the message hash differs
    {
        let mut source = logging_source();
        source["log"] = json!("different payload");
        *search.response.lock().unwrap() = make_response(8, vec![source]);
    }
    engine.clear_status_for_test("app-errors").await;
    engine.evaluate_rule(&rule).await;

    let status = engine.status_snapshot("app-errors").await.unwrap();
    assert_eq!(status.alert_count, 2);
    // second window is hours * 2, so the horizon strictly grows
    assert!(status.suppress_until.unwrap() > first_until);
}

// ---- lifecycle ----

#[tokio::test]
async fn stop_halts_the_driver() {
    let (_dir, store) = shared_store().await;
    let search = FakeSearch::new(make_response(0, vec![]));
    let notifier = CountingNotifier::new("dingtalk", false);
    let engine = build_engine(
        "replica-a",
        SuppressionConfig::default(),
        search,
        store,
        vec![notifier],
        vec![],
    );

    let handle = engine.start();
    engine.stop();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("driver did not stop")
        .unwrap();
}
