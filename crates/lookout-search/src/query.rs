//! Trigger-query construction.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

use lookout_common::types::Rule;

/// Hits returned alongside the total; the renderer only needs one example
/// document, the rest is headroom for aggregation keys.
const TRIGGER_QUERY_SIZE: i64 = 100;

/// Builds the boolean query for one rule evaluation.
///
/// The window is `[now - timeframe, now]` on `@timestamp`, RFC-3339 encoded.
/// The rule's opaque query fragment, when present, is appended to the `must`
/// clause untouched. Results come back newest first so the renderer's example
/// hit is the most recent match.
pub fn trigger_query(rule: &Rule, now: DateTime<Utc>) -> Value {
    let start = now - Duration::seconds(rule.timeframe);

    let mut must = vec![json!({
        "range": {
            "@timestamp": {
                "gte": start.to_rfc3339_opts(SecondsFormat::Secs, true),
                "lte": now.to_rfc3339_opts(SecondsFormat::Secs, true),
            }
        }
    })];

    if let Some(fragment) = &rule.query {
        if !fragment.is_null() {
            must.push(fragment.clone());
        }
    }

    json!({
        "query": { "bool": { "must": must } },
        "size": TRIGGER_QUERY_SIZE,
        "sort": [ { "@timestamp": { "order": "desc" } } ],
    })
}
