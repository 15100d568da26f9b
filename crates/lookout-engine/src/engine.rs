use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use lookout_common::config::{Config, SuppressionConfig};
use lookout_common::types::{Alert, AlertStatus, Rule, SearchResponse};
use lookout_notify::NotifierSet;
use lookout_search::query::trigger_query;
use lookout_search::SearchBackend;
use lookout_storage::StateStore;

use crate::levels::LevelMatcher;
use crate::render::render;
use crate::trigger::should_trigger;

/// Engine knobs, extracted from the configuration tree at startup.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub run_interval: Duration,
    pub evaluation_timeout: Duration,
    pub max_running_rules: usize,
    pub writeback_index: String,
    pub instance_id: String,
    pub lease_ttl_secs: u64,
    pub dedupe_ttl_secs: u64,
    pub suppression: SuppressionConfig,
}

impl EngineOptions {
    pub fn from_config(config: &Config, instance_id: String) -> Self {
        Self {
            run_interval: Duration::from_secs(config.engine.run_interval_secs),
            evaluation_timeout: Duration::from_secs(30),
            max_running_rules: config.engine.max_running_rules.max(1),
            writeback_index: config.engine.writeback_index.clone(),
            instance_id,
            lease_ttl_secs: config.coordination.lease_ttl_secs,
            dedupe_ttl_secs: config.coordination.dedupe_ttl_secs,
            suppression: config.suppression.clone(),
        }
    }
}

/// The orchestrator: periodic driver plus the per-rule evaluation protocol.
pub struct RuleEngine {
    options: EngineOptions,
    search: Arc<dyn SearchBackend>,
    store: Arc<StateStore>,
    notifiers: Arc<NotifierSet>,
    levels: LevelMatcher,
    rules: Vec<Rule>,
    statuses: RwLock<HashMap<String, AlertStatus>>,
    limiter: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

impl RuleEngine {
    pub fn new(
        options: EngineOptions,
        levels: LevelMatcher,
        search: Arc<dyn SearchBackend>,
        store: Arc<StateStore>,
        notifiers: Arc<NotifierSet>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let limiter = Arc::new(Semaphore::new(options.max_running_rules));
        Self {
            options,
            search,
            store,
            notifiers,
            levels,
            rules: Vec::new(),
            statuses: RwLock::new(HashMap::new()),
            limiter,
            shutdown,
        }
    }

    /// Installs the rule set the driver will evaluate. The list is read-only
    /// once the engine runs; a reload swaps it between ticks.
    pub fn load_rules(&mut self, rules: Vec<Rule>) {
        tracing::info!(count = rules.len(), "rules loaded");
        self.rules = rules;
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Starts the periodic driver. Returns the driver task handle.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run().await;
        })
    }

    /// Flags the driver to exit. In-flight evaluations complete under their
    /// own deadline; no new ones begin.
    pub fn stop(&self) {
        tracing::info!("rule engine stopping");
        let _ = self.shutdown.send(true);
    }

    async fn run(self: Arc<Self>) {
        tracing::info!(
            interval_secs = self.options.run_interval.as_secs(),
            instance = %self.options.instance_id,
            "rule engine started"
        );

        let mut rx = self.shutdown.subscribe();
        // a stop issued before the driver task got scheduled
        if *rx.borrow() {
            return;
        }
        let mut tick = interval(self.options.run_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // consume the immediate first tick so the first pass lands one
        // interval after startup
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => self.run_rules(),
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("rule engine stopped");
    }

    /// One tick: spawn an independent evaluation task per rule. Tasks never
    /// block each other; the semaphore only caps how many run at once.
    fn run_rules(self: &Arc<Self>) {
        tracing::debug!(rules = self.rules.len(), "starting evaluation pass");

        for rule in &self.rules {
            let engine = Arc::clone(self);
            let rule = rule.clone();
            tokio::spawn(async move {
                let Ok(_permit) = engine.limiter.clone().acquire_owned().await else {
                    return;
                };
                let deadline = engine.options.evaluation_timeout;
                if tokio::time::timeout(deadline, engine.evaluate_rule(&rule))
                    .await
                    .is_err()
                {
                    tracing::warn!(rule = %rule.name, "evaluation exceeded its deadline");
                }
            });
        }
    }

    /// The full per-rule protocol. Once the lease is held, every exit path
    /// runs through the release below.
    pub(crate) async fn evaluate_rule(&self, rule: &Rule) {
        tracing::debug!(rule = %rule.name, "evaluating rule");

        let holder = &self.options.instance_id;
        match self
            .store
            .try_acquire_lease(&rule.name, holder, self.options.lease_ttl_secs)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(rule = %rule.name, "lease not acquired, another replica owns this tick");
                return;
            }
            Err(e) => {
                tracing::warn!(rule = %rule.name, error = %e, "lease acquisition failed");
                return;
            }
        }

        self.evaluate_under_lease(rule).await;

        if let Err(e) = self.store.release_lease(&rule.name, holder).await {
            tracing::warn!(rule = %rule.name, error = %e, "lease release failed");
        }
    }

    async fn evaluate_under_lease(&self, rule: &Rule) {
        if self.is_suppressed(&rule.name).await {
            return;
        }

        let body = trigger_query(rule, Utc::now());
        let response = match self.search.search(&rule.index, &body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(rule = %rule.name, error = %e, "search failed, skipping this tick");
                return;
            }
        };

        if !should_trigger(rule, &response) {
            return;
        }

        self.trigger_alert(rule, &response).await;
    }

    async fn trigger_alert(&self, rule: &Rule, response: &SearchResponse) {
        tracing::info!(
            rule = %rule.name,
            matches = response.total(),
            "rule tripped"
        );

        let now = Utc::now();
        let level = self.levels.resolve(rule);
        let message = render(rule, response, now);

        // Cross-replica at-most-once gate. A failed check counts as a hit:
        // without a confirmed acquisition the send must not happen.
        match self
            .store
            .check_and_touch(
                &rule.name,
                &level.to_string(),
                &message,
                self.options.dedupe_ttl_secs,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(rule = %rule.name, "dedup hit, skipping send and history");
                return;
            }
            Err(e) => {
                tracing::warn!(rule = %rule.name, error = %e, "dedup check failed, skipping send");
                return;
            }
        }

        let alert = Alert {
            id: Alert::make_id(&rule.name, now),
            rule_name: rule.name.clone(),
            level,
            message,
            timestamp: now,
            data: extract_alert_data(response),
            count: response.total(),
            matches: response.hits.hits.len() as i64,
        };

        // Delivery failures are per-channel and already logged; they do not
        // undo the dedup claim or the history write.
        self.notifiers.send_alert(&alert, &rule.channels).await;

        if let Err(e) = self.store.save_alert(&alert).await {
            tracing::error!(rule = %rule.name, error = %e, "history write failed");
        }

        self.record_alert(&alert).await;
        self.update_status(&rule.name, now).await;
    }

    /// Best-effort writeback of the alert document into the search store.
    async fn record_alert(&self, alert: &Alert) {
        let doc = match serde_json::to_value(alert) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(alert_id = %alert.id, error = %e, "alert serialization failed");
                return;
            }
        };
        if let Err(e) = self
            .search
            .index(&self.options.writeback_index, &alert.id, &doc)
            .await
        {
            tracing::error!(alert_id = %alert.id, error = %e, "alert writeback failed");
        }
    }

    /// In-process suppression check; clears the flag once the window has
    /// elapsed. Advisory only; the durable guarantee is the dedup key.
    async fn is_suppressed(&self, rule_name: &str) -> bool {
        let now = Utc::now();
        {
            let statuses = self.statuses.read().await;
            match statuses.get(rule_name) {
                None => return false,
                Some(status) if !status.suppressed => return false,
                Some(status) => {
                    if let Some(until) = status.suppress_until {
                        if now < until {
                            tracing::debug!(rule = %rule_name, until = %until, "rule suppressed");
                            return true;
                        }
                    }
                }
            }
        }

        let mut statuses = self.statuses.write().await;
        if let Some(status) = statuses.get_mut(rule_name) {
            if status.suppressed && status.suppress_until.is_some_and(|until| now >= until) {
                status.suppressed = false;
                tracing::info!(rule = %rule_name, "suppression window elapsed");
            }
        }
        false
    }

    /// Post-emission bookkeeping: bump the counter and arm the next window.
    async fn update_status(&self, rule_name: &str, now: DateTime<Utc>) {
        let mut statuses = self.statuses.write().await;
        let status = statuses.entry(rule_name.to_string()).or_default();
        status.last_alert = Some(now);
        status.alert_count += 1;

        let suppression = &self.options.suppression;
        if !suppression.enabled {
            return;
        }

        let window = if suppression.exponential_realert.enabled {
            // linear-in-count schedule: hours * alert_count
            ChronoDuration::hours(
                (suppression.exponential_realert.hours * u64::from(status.alert_count)) as i64,
            )
        } else {
            ChronoDuration::minutes(suppression.realert_minutes as i64)
        };

        let until = now + window;
        // the horizon never moves backwards within a process lifetime
        if status.suppress_until.map_or(true, |current| until > current) {
            status.suppress_until = Some(until);
        }
        status.suppressed = true;
        tracing::debug!(
            rule = %rule_name,
            until = %status.suppress_until.unwrap_or(until),
            "suppression armed"
        );
    }

    #[cfg(test)]
    pub(crate) async fn status_snapshot(&self, rule_name: &str) -> Option<AlertStatus> {
        self.statuses.read().await.get(rule_name).cloned()
    }

    #[cfg(test)]
    pub(crate) async fn clear_status_for_test(&self, rule_name: &str) {
        if let Some(status) = self.statuses.write().await.get_mut(rule_name) {
            status.suppressed = false;
            status.suppress_until = None;
        }
    }
}

/// Data snapshot persisted with the alert: the example document plus the
/// response's headline numbers.
fn extract_alert_data(response: &SearchResponse) -> serde_json::Value {
    let mut data = serde_json::Map::new();
    if let Some(sample) = response.sample_source() {
        data.insert("sample_hit".to_string(), sample.clone());
    }
    data.insert("total_hits".to_string(), json!(response.total()));
    if let Some(score) = response.hits.max_score {
        data.insert("max_score".to_string(), json!(score));
    }
    serde_json::Value::Object(data)
}
