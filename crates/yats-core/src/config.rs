use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_KEYSPACE: &str = "yats";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;

/// Top-level config (yats.toml + YATS_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct YatsConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Scheduling and dispatch knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Key prefix isolating this instance from others on the same backend.
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    /// Dispatch poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Whether the embedding process should start the dispatch engine as soon
    /// as it is constructed. The engine itself never self-starts; see
    /// `DispatchEngine::start` in `yats-scheduler`.
    #[serde(default = "bool_true")]
    pub auto_start: bool,
    /// When true, a due task whose type has no registered handler is failed
    /// with an error record instead of being silently skipped.
    #[serde(default)]
    pub require_handler: bool,
    /// How many due tasks one poll cycle may dispatch. The default of 1 keeps
    /// the original one-task-per-cycle throughput limit.
    #[serde(default = "default_dispatch_batch")]
    pub dispatch_batch: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            keyspace: default_keyspace(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            auto_start: true,
            require_handler: false,
            dispatch_batch: default_dispatch_batch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_keyspace() -> String {
    DEFAULT_KEYSPACE.to_string()
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_dispatch_batch() -> usize {
    1
}
fn bool_true() -> bool {
    true
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.yats/yats.db")
}

impl YatsConfig {
    /// Load config from a TOML file with YATS_* env var overrides.
    ///
    /// Env keys use `__` as the section separator so snake_case fields stay
    /// addressable, e.g. `YATS_SCHEDULER__POLL_INTERVAL_MS=1000`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: YatsConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("YATS_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.yats/yats.toml")
}
