use std::env;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

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

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub oms: OmsConfig,
    pub postgres: PostgresConfig,
    pub metrics: MetricsConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ORDERWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ORDERWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            oms: OmsConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            metrics: MetricsConfig::from_env_profiled(p),
            schedule: ScheduleConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  oms:       url={}, api_key={}, window={}m, limit={}",
            self.oms.base_url,
            if self.oms.api_key.is_some() { "set" } else { "(missing)" },
            self.oms.window_minutes,
            self.oms.row_limit
        );
        tracing::info!("  postgres:  host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!("  metrics:   url={}, job={}", self.metrics.pushgateway_url, self.metrics.job);
        tracing::info!(
            "  schedule:  cron='{}', retries={}, retry_delay={}s",
            self.schedule.cron,
            self.schedule.retries,
            self.schedule.retry_delay_secs
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "oms": {
                "base_url": self.oms.base_url,
                "recent_path": self.oms.recent_path,
                "configured": self.oms.is_configured(),
                "window_minutes": self.oms.window_minutes,
                "row_limit": self.oms.row_limit,
            },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "metrics": {
                "pushgateway_url": self.metrics.pushgateway_url,
                "job": self.metrics.job,
                "prefix": self.metrics.prefix,
            },
            "schedule": {
                "cron": self.schedule.cron,
                "retries": self.schedule.retries,
                "retry_delay_secs": self.schedule.retry_delay_secs,
            },
        })
    }
}

// ── Order management API ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmsConfig {
    pub base_url: String,
    pub recent_path: String,
    /// Sent as `x-api-key`. Deliberately has no default.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Trailing window requested from the recent-changes endpoint.
    pub window_minutes: u32,
    pub row_limit: u32,
}

impl OmsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(p, "OMS_URL", "http://localhost:3001"),
            recent_path: profiled_env_or(p, "OMS_RECENT_PATH", "/api/v1/monitor/recent"),
            api_key: profiled_env_opt(p, "OMS_API_KEY"),
            timeout_secs: profiled_env_u64(p, "OMS_TIMEOUT_SECS", 60),
            window_minutes: profiled_env_u32(p, "FETCH_WINDOW_MINUTES", 5),
            row_limit: profiled_env_u32(p, "FETCH_ROW_LIMIT", 1000),
        }
    }

    pub fn recent_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.recent_path.trim_start_matches('/')
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// The API key, or a config error naming the variable to set.
    pub fn require_api_key(&self) -> Result<&str, CoreError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CoreError::Config("OMS_API_KEY is not set".to_string()))
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full DSN; takes precedence over the individual fields when set.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "PG_URL"),
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "orderwatch"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 5),
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.username.is_some()
    }
}

// ── Metrics sink (Pushgateway) ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub pushgateway_url: String,
    pub job: String,
    /// Gauge name prefix, e.g. `o2o_orders` → `o2o_orders_total`.
    pub prefix: String,
    pub timeout_secs: u64,
}

impl MetricsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            pushgateway_url: profiled_env_or(p, "PUSHGATEWAY_URL", "http://localhost:9091"),
            job: profiled_env_or(p, "METRICS_JOB", "o2o_oms_monitoring"),
            prefix: profiled_env_or(p, "METRICS_PREFIX", "o2o_orders"),
            timeout_secs: profiled_env_u64(p, "PUSHGATEWAY_TIMEOUT_SECS", 5),
        }
    }

    pub fn push_url(&self) -> String {
        format!(
            "{}/metrics/job/{}",
            self.pushgateway_url.trim_end_matches('/'),
            self.job
        )
    }
}

// ── Scheduling ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// 5- or 6-field cron expression.
    pub cron: String,
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl ScheduleConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            cron: profiled_env_or(p, "PIPELINE_CRON", "*/1 * * * *"),
            retries: profiled_env_u32(p, "PIPELINE_RETRIES", 1),
            retry_delay_secs: profiled_env_u64(p, "PIPELINE_RETRY_DELAY_SECS", 60),
        }
    }
}
