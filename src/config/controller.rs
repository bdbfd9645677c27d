//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Workload settings that are not part of the Instance spec but shape every pod
///
/// Passed to the desired-state builder so that it stays a pure function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadDefaults {
    /// Container image repository; the Instance version is the tag
    pub image_repository: String,
    /// Container image pull policy
    pub image_pull_policy: String,
}

impl Default for WorkloadDefaults {
    fn default() -> Self {
        use crate::constants::{DEFAULT_IMAGE_PULL_POLICY, DEFAULT_IMAGE_REPOSITORY};
        Self {
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_string(),
            image_pull_policy: DEFAULT_IMAGE_PULL_POLICY.to_string(),
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// HTTP port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// How long to wait for the HTTP server to bind at startup (seconds)
    pub server_startup_timeout_secs: u64,
    /// Poll interval while waiting for the HTTP server (milliseconds)
    pub server_poll_interval_ms: u64,
    /// Restrict watches to a single namespace; `None` watches the whole cluster
    pub watch_namespace: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
    /// First retry delay after a failed reconciliation (seconds)
    pub backoff_min_secs: u64,
    /// Retry delay cap (seconds)
    pub backoff_max_secs: u64,
    /// Requeue interval for converged Instances (seconds)
    pub resync_interval_secs: u64,
    /// Delay before restarting the watch after the stream ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// Field manager used for status patches and writes
    pub field_manager: String,
    /// Pod-shaping defaults
    pub workload: WorkloadDefaults,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            watch_namespace: None,
            log_format: LogFormat::Text,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            field_manager: MANAGED_BY.to_string(),
            workload: WorkloadDefaults::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        let defaults = WorkloadDefaults::default();
        Self {
            metrics_port: parse_or(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            server_startup_timeout_secs: parse_or(
                &lookup,
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            server_poll_interval_ms: parse_or(
                &lookup,
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Text),
            backoff_min_secs: parse_or(&lookup, "BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: parse_or(&lookup, "BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            resync_interval_secs: parse_or(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            watch_restart_delay_secs: parse_or(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            field_manager: lookup("FIELD_MANAGER").unwrap_or_else(|| MANAGED_BY.to_string()),
            workload: WorkloadDefaults {
                image_repository: lookup("INSTANCE_IMAGE_REPOSITORY")
                    .unwrap_or(defaults.image_repository),
                image_pull_policy: lookup("INSTANCE_IMAGE_PULL_POLICY")
                    .unwrap_or(defaults.image_pull_policy),
            },
        }
    }

    /// Get resync interval duration
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Parse a value from the lookup or fall back to the default
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
