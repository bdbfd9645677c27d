//! # Home Assistant Operator
//!
//! Kubernetes operator that runs Home Assistant instances declared through the
//! `Instance` custom resource (`home-assistant.lmatfy.io/v1alpha1`).
//!
//! For every Instance the operator keeps a volume claim, a pod, a service and
//! optionally an ingress in line with the declared spec, reports the outcome on
//! the Instance status, and removes the dependents once the Instance is gone.
//!
//! ## Usage
//!
//! ```bash
//! # Watch every namespace, metrics on :5000
//! home-assistant-operator
//!
//! # Watch a single namespace with JSON logs
//! home-assistant-operator --watch-namespace home --log-format json
//! ```
//!
//! Every flag can also be set through the environment variable shown in
//! `--help`; flags take precedence.

use anyhow::Result;
use clap::Parser;

use home_assistant_operator::config::{ControllerConfig, LogFormat};
use home_assistant_operator::runtime::{initialization, watch_loop};

#[derive(Parser, Debug)]
#[command(name = "home-assistant-operator")]
#[command(about = "Runs Home Assistant instances declared by Instance resources", long_about = None)]
#[command(version)]
struct Args {
    /// Port for /metrics, /healthz and /readyz
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Only watch Instances in this namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Container image repository for Home Assistant pods
    #[arg(long, env = "INSTANCE_IMAGE_REPOSITORY")]
    image_repository: Option<String>,

    /// Requeue interval for converged Instances, in seconds
    #[arg(long, env = "RESYNC_INTERVAL_SECS")]
    resync_interval_secs: Option<u64>,
}

impl Args {
    /// Layer command-line values over the environment-derived configuration
    fn apply(self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(namespace) = self.watch_namespace.filter(|ns| !ns.trim().is_empty()) {
            config.watch_namespace = Some(namespace);
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(repository) = self.image_repository {
            config.workload.image_repository = repository;
        }
        if let Some(secs) = self.resync_interval_secs {
            config.resync_interval_secs = secs;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.apply(ControllerConfig::from_env());

    let init = initialization::initialize(&config).await?;

    watch_loop::run_watch_loop(init.client, init.reconciler, init.server_state, config).await
}
