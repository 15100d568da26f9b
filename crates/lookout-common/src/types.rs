use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity attached to an alert, either set on the rule or derived from the
/// rule name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "Info"),
            AlertLevel::Low => write!(f, "Low"),
            AlertLevel::Medium => write!(f, "Medium"),
            AlertLevel::High => write!(f, "High"),
            AlertLevel::Critical => write!(f, "Critical"),
        }
    }
}

impl std::str::FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(AlertLevel::Info),
            "low" => Ok(AlertLevel::Low),
            "medium" => Ok(AlertLevel::Medium),
            "high" => Ok(AlertLevel::High),
            "critical" => Ok(AlertLevel::Critical),
            _ => Err(format!("unknown alert level: {s}")),
        }
    }
}

/// How a rule's hit count is turned into a fire/no-fire decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Frequency,
    Any,
    Spike,
    Flatline,
    Change,
    /// Unrecognized type strings fall back to the frequency predicate.
    #[serde(other)]
    Unknown,
}

impl Default for RuleType {
    fn default() -> Self {
        RuleType::Frequency
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleType::Frequency => write!(f, "frequency"),
            RuleType::Any => write!(f, "any"),
            RuleType::Spike => write!(f, "spike"),
            RuleType::Flatline => write!(f, "flatline"),
            RuleType::Change => write!(f, "change"),
            RuleType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A declarative alerting rule as the loader hands it to the engine.
///
/// `name` is the coordination identity across replicas; the loader guarantees
/// uniqueness. `query` is an opaque search-store query fragment merged into
/// the trigger query's `must` clause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(rename = "type", default)]
    pub rule_type: RuleType,
    pub index: String,
    #[serde(default)]
    pub query: Option<Value>,
    #[serde(default)]
    pub threshold: i64,
    /// Evaluation window in seconds; 0 means "take the configured default".
    #[serde(default)]
    pub timeframe: i64,
    #[serde(default)]
    pub query_key: Vec<String>,
    #[serde(default)]
    pub level: Option<AlertLevel>,
    /// Channel names to fan out to; empty means every enabled channel.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub custom_text: Option<String>,
    #[serde(default)]
    pub custom_args: Vec<String>,
}

/// A fired alert, immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_name: String,
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    pub count: i64,
    pub matches: i64,
}

impl Alert {
    /// Derives the alert identity from the rule name and the trigger epoch.
    pub fn make_id(rule_name: &str, at: DateTime<Utc>) -> String {
        format!("{}-{}", rule_name, at.timestamp())
    }
}

/// Per-replica suppression bookkeeping. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct AlertStatus {
    pub last_alert: Option<DateTime<Utc>>,
    pub alert_count: u32,
    pub suppressed: bool,
    pub suppress_until: Option<DateTime<Utc>>,
}

// ---- Search store wire shapes ----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: i64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(rename = "_shards", default)]
    pub shards: ShardStats,
    #[serde(default)]
    pub hits: Hits,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardStats {
    #[serde(default)]
    pub total: i32,
    #[serde(default)]
    pub successful: i32,
    #[serde(default)]
    pub skipped: i32,
    #[serde(default)]
    pub failed: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: TotalHits,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TotalHits {
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub relation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

impl SearchResponse {
    /// The authoritative hit count for trigger predicates.
    pub fn total(&self) -> i64 {
        self.hits.total.value
    }

    /// First returned hit's `_source`, used as the example document by the
    /// renderer and the alert data snapshot.
    pub fn sample_source(&self) -> Option<&Value> {
        self.hits.hits.first().map(|h| &h.source)
    }
}
