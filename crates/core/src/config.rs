use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OrdoError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str) -> Option<T> {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok())
}

fn profiled_env_bool(profile: &str, key: &str) -> Option<bool> {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ORDO_PROFILE`. When set (e.g. `BENCH`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ORDO_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let mut config = Self {
            profile: profile.to_uppercase(),
            ..Self::default()
        };
        config.apply_env_overrides();
        config
    }

    /// Parse config from a TOML string. Environment values take precedence.
    pub fn from_toml(toml_str: &str) -> Result<Self, OrdoError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.profile = config.profile.to_uppercase();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OrdoError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Overlay `ORDO_*` environment variables (profiled) onto this config.
    pub fn apply_env_overrides(&mut self) {
        let p = self.profile.as_str();
        if let Some(n) = profiled_env_parse::<usize>(p, "ORDO_WORKER_THREADS") {
            self.scheduler.worker_threads = n;
        }
        if let Some(b) = profiled_env_bool(p, "ORDO_AUTO_START") {
            self.scheduler.auto_start = b;
        }
        if let Some(v) = profiled_env_opt(p, "ORDO_THREAD_NAME_PREFIX") {
            self.scheduler.thread_name_prefix = v;
        }
        if let Some(n) = profiled_env_parse::<usize>(p, "ORDO_STACK_SIZE") {
            self.scheduler.stack_size = Some(n);
        }
        if let Some(v) = profiled_env_opt(p, "ORDO_LOG") {
            self.logging.filter = v;
        }
    }

    pub fn validate(&self) -> Result<(), OrdoError> {
        if self.scheduler.thread_name_prefix.trim().is_empty() {
            return Err(OrdoError::Config(
                "scheduler.thread_name_prefix must not be empty".into(),
            ));
        }
        if let Some(size) = self.scheduler.stack_size {
            if size < MIN_STACK_SIZE {
                return Err(OrdoError::Config(format!(
                    "scheduler.stack_size {size} is below the minimum of {MIN_STACK_SIZE} bytes"
                )));
            }
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   workers={} (resolved {}), auto_start={}, thread_prefix={}",
            self.scheduler.worker_threads,
            self.scheduler.resolved_worker_threads(),
            self.scheduler.auto_start,
            self.scheduler.thread_name_prefix
        );
        tracing::info!("  logging:     filter={}", self.logging.filter);
    }
}

// ── Scheduler ─────────────────────────────────────────────────

const MIN_STACK_SIZE: usize = 16 * 1024;

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default)]
    pub worker_threads: usize,
    /// Whether `submit` starts a pool that was never started.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
    /// Worker threads are named `{prefix}-{index}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Worker stack size in bytes (platform default when unset).
    #[serde(default)]
    pub stack_size: Option<usize>,
}

fn default_auto_start() -> bool { true }
fn default_thread_name_prefix() -> String { "ordo-worker".to_string() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            auto_start: default_auto_start(),
            thread_name_prefix: default_thread_name_prefix(),
            stack_size: None,
        }
    }
}

impl SchedulerConfig {
    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }
}

// ── Logging ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}
