//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! Values under "Dependent contract" are part of the naming and label
//! contract with the cluster and must not change between releases. The rest
//! are defaults that can be overridden via configuration.

// Dependent contract

/// Application port used for probes, the container port and the service port
pub const APP_PORT: i32 = 8123;

/// Name of the container / service port
pub const APP_PORT_NAME: &str = "http";

/// Suffix appended to the Instance name to derive the volume claim name
pub const CLAIM_NAME_SUFFIX: &str = "-config";

/// Value of the `app.kubernetes.io/managed-by` label
pub const MANAGED_BY: &str = "home-assistant-operator";

pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";

/// Storage request used when the Instance does not declare a size
pub const DEFAULT_STORAGE_SIZE: &str = "1Gi";

/// Grace period for the not-ready / unreachable tolerations
pub const NODE_TOLERATION_SECONDS: i64 = 300;

pub const CONFIG_VOLUME: &str = "config";
pub const CONFIG_MOUNT_PATH: &str = "/config";
pub const DBUS_VOLUME: &str = "dbus";
pub const DBUS_HOST_PATH: &str = "/run/dbus";

// Defaults

/// Default container image repository
pub const DEFAULT_IMAGE_REPOSITORY: &str = "homeassistant/home-assistant";

/// Image tag used when the Instance leaves `version` empty
pub const DEFAULT_IMAGE_TAG: &str = "stable";

/// Default image pull policy
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// First retry delay after a failed reconciliation (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Retry delay cap after repeated failures (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Periodic resync interval for converged Instances (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default delay before restarting the watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;
