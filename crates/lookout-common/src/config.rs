use serde::Deserialize;

use crate::types::AlertLevel;

/// Configuration error raised during startup validation. Always fatal.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigInvalid(pub String);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub suppression: SuppressionConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Startup sanity checks. Anything caught here refuses to start rather
    /// than limping along with a half-usable engine.
    pub fn validate(&self) -> Result<(), ConfigInvalid> {
        if self.search.host.is_empty() {
            return Err(ConfigInvalid("search.host must not be empty".into()));
        }
        if self.search.timeout_secs == 0 {
            return Err(ConfigInvalid("search.timeout_secs must be > 0".into()));
        }
        if self.engine.run_interval_secs == 0 {
            return Err(ConfigInvalid("engine.run_interval_secs must be > 0".into()));
        }
        if self.engine.writeback_index.is_empty() {
            return Err(ConfigInvalid("engine.writeback_index must not be empty".into()));
        }
        if self.coordination.lease_ttl_secs == 0 || self.coordination.dedupe_ttl_secs == 0 {
            return Err(ConfigInvalid(
                "coordination TTLs must be > 0".into(),
            ));
        }
        match self.database.kind {
            StoreKind::EmbeddedFile => {
                if self.database.path.is_empty() {
                    return Err(ConfigInvalid("database.path must not be empty".into()));
                }
            }
            StoreKind::Networked => {
                if self.database.host.is_empty() || self.database.dbname.is_empty() {
                    return Err(ConfigInvalid(
                        "networked database requires host and dbname".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_host")]
    pub host: String,
    #[serde(default = "default_search_port")]
    pub port: u16,
    #[serde(default = "default_search_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub verify_certs: bool,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            host: default_search_host(),
            port: default_search_port(),
            protocol: default_search_protocol(),
            username: String::new(),
            password: String::new(),
            verify_certs: true,
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_run_interval_secs")]
    pub run_interval_secs: u64,
    /// Reserved: accepted and logged, not applied to the trigger window.
    #[serde(default = "default_buffer_time_secs")]
    pub buffer_time_secs: u64,
    #[serde(default = "default_max_running_rules")]
    pub max_running_rules: usize,
    #[serde(default = "default_writeback_index")]
    pub writeback_index: String,
    #[serde(default = "default_alert_time_limit_secs")]
    pub alert_time_limit_secs: u64,
    /// Ordered name-pattern overrides for level resolution. Empty means the
    /// built-in pattern table.
    #[serde(default)]
    pub level_rules: Vec<LevelPattern>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_interval_secs: default_run_interval_secs(),
            buffer_time_secs: default_buffer_time_secs(),
            max_running_rules: default_max_running_rules(),
            writeback_index: default_writeback_index(),
            alert_time_limit_secs: default_alert_time_limit_secs(),
            level_rules: Vec::new(),
        }
    }
}

/// One entry of the level-resolution table: the rule name must contain every
/// listed token (case-insensitively) for the level to apply.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelPattern {
    pub contains: Vec<String>,
    pub level: AlertLevel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuppressionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_realert_minutes")]
    pub realert_minutes: u64,
    #[serde(default)]
    pub exponential_realert: ExponentialRealertConfig,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            realert_minutes: default_realert_minutes(),
            exponential_realert: ExponentialRealertConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExponentialRealertConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub hours: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub dingtalk: DingTalkConfig,
    #[serde(default)]
    pub wechat: WeChatConfig,
    #[serde(default)]
    pub feishu: FeishuConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from_email: String,
    #[serde(default)]
    pub to_emails: Vec<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_email: String::new(),
            to_emails: Vec::new(),
            use_tls: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DingTalkConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub at_mobiles: Vec<String>,
    #[serde(default)]
    pub at_all: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeChatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub mentioned_list: Vec<String>,
    #[serde(default)]
    pub mentioned_mobile_list: Vec<String>,
    #[serde(default)]
    pub at_all: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeishuConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub at_user_ids: Vec<String>,
    #[serde(default)]
    pub at_all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    EmbeddedFile,
    Networked,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type", default = "default_store_kind")]
    pub kind: StoreKind,
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_database_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub dbname: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            path: default_database_path(),
            host: String::new(),
            port: default_database_port(),
            username: String::new(),
            password: String::new(),
            dbname: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// Connection URL for the state store; the scheme picks the dialect.
    pub fn url(&self) -> String {
        match self.kind {
            StoreKind::EmbeddedFile => format!("sqlite://{}?mode=rwc", self.path),
            StoreKind::Networked => format!(
                "mysql://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.dbname
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    #[serde(default = "default_dedupe_ttl_secs")]
    pub dedupe_ttl_secs: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl_secs(),
            dedupe_ttl_secs: default_dedupe_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_rules_folder")]
    pub folder: String,
    #[serde(default = "default_rule_timeframe_secs")]
    pub default_timeframe_secs: i64,
    #[serde(default = "default_rule_threshold")]
    pub default_threshold: i64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            folder: default_rules_folder(),
            default_timeframe_secs: default_rule_timeframe_secs(),
            default_threshold: default_rule_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_search_host() -> String {
    "localhost".to_string()
}

fn default_search_port() -> u16 {
    9200
}

fn default_search_protocol() -> String {
    "https".to_string()
}

fn default_search_timeout_secs() -> u64 {
    30
}

fn default_run_interval_secs() -> u64 {
    60
}

fn default_buffer_time_secs() -> u64 {
    300
}

fn default_max_running_rules() -> usize {
    10
}

fn default_writeback_index() -> String {
    "lookout-alert-status".to_string()
}

fn default_alert_time_limit_secs() -> u64 {
    172_800
}

fn default_realert_minutes() -> u64 {
    5
}

fn default_smtp_port() -> u16 {
    465
}

fn default_store_kind() -> StoreKind {
    StoreKind::EmbeddedFile
}

fn default_database_path() -> String {
    "data/lookout.db".to_string()
}

fn default_database_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    10
}

fn default_lease_ttl_secs() -> u64 {
    30
}

fn default_dedupe_ttl_secs() -> u64 {
    120
}

fn default_rules_folder() -> String {
    "config/rules".to_string()
}

fn default_rule_timeframe_secs() -> i64 {
    300
}

fn default_rule_threshold() -> i64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}
