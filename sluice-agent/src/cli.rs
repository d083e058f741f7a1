//! Defines the command-line arguments & parsing helpers for the agent

use std::time::Duration;

use clap::{Parser, ValueEnum};
use sluice_core::config::{
    DEFAULT_ALPHA, DEFAULT_DELTA_MAX, DEFAULT_EPSILON, DEFAULT_INITIAL_ESTIMATE_MS,
    DEFAULT_SAMPLES_PER_CYCLE, DEFAULT_WEIGHT_MAX, DEFAULT_WEIGHT_MIN,
};
use sluice_core::{Backend, ControllerConfig, HostgroupId};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::errors::AgentError;
use crate::routing_store::proxysql::AdminEndpoint;

/// Which routing store the controller drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// The ProxySQL admin interface
    Proxysql,
    /// An in-process table; weights are only logged (dry run)
    Memory,
}

/// The CLI for the weight controller agent
#[derive(Debug, Parser)]
#[clap(
    name = "sluice-agent",
    version,
    about = "Latency-driven ProxySQL read-replica weight controller"
)]
pub struct Cli {
    // --- Backends --- //
    /// The read replicas to manage, as a comma-separated list of `host[:port]`
    #[clap(long, env = "SLUICE_BACKENDS", value_delimiter = ',', num_args = 1.., required = true)]
    pub backends: Vec<Backend>,
    /// The hostgroup the replicas serve in
    #[clap(long, env = "SLUICE_HOSTGROUP", default_value = "20")]
    pub hostgroup: u32,

    // --- Control loop --- //
    /// Seconds between control cycles
    #[clap(long, env = "SLUICE_PERIOD_SECS", default_value = "5.0")]
    pub period_secs: f64,
    /// Latency probes per backend per cycle
    #[clap(long, env = "SLUICE_SAMPLES", default_value_t = DEFAULT_SAMPLES_PER_CYCLE)]
    pub samples: usize,
    /// EMA smoothing factor in (0, 1]
    #[clap(long, env = "SLUICE_ALPHA", default_value_t = DEFAULT_ALPHA)]
    pub alpha: f64,
    /// Added to each latency estimate (ms) before inverting it into a score
    #[clap(long, env = "SLUICE_EPSILON", default_value_t = DEFAULT_EPSILON)]
    pub epsilon: f64,
    /// The lowest weight ever written
    #[clap(long, env = "SLUICE_WEIGHT_MIN", default_value_t = DEFAULT_WEIGHT_MIN)]
    pub weight_min: u32,
    /// The highest weight ever written
    #[clap(long, env = "SLUICE_WEIGHT_MAX", default_value_t = DEFAULT_WEIGHT_MAX)]
    pub weight_max: u32,
    /// The largest weight change applied to a backend in one cycle
    #[clap(long, env = "SLUICE_DELTA_MAX", default_value_t = DEFAULT_DELTA_MAX)]
    pub delta_max: u32,
    /// The bound on a single latency probe, in milliseconds
    #[clap(long, env = "SLUICE_PROBE_TIMEOUT_MS", default_value = "1000")]
    pub probe_timeout_ms: u64,
    /// The latency assumed for a backend before it is first measured, in milliseconds
    #[clap(long, env = "SLUICE_INITIAL_ESTIMATE_MS", default_value_t = DEFAULT_INITIAL_ESTIMATE_MS)]
    pub initial_estimate_ms: f64,
    /// Write the starting weights to the store before the first cycle
    #[clap(long, env = "SLUICE_SEED_WEIGHTS")]
    pub seed_weights: bool,

    // --- Routing store --- //
    /// The routing store to drive
    #[clap(long, env = "SLUICE_STORE", value_enum, default_value = "proxysql")]
    pub store: StoreKind,
    /// The ProxySQL admin host
    #[clap(long, env = "PROXYSQL_ADMIN_HOST", default_value = "127.0.0.1")]
    pub admin_host: String,
    /// The ProxySQL admin port
    #[clap(long, env = "PROXYSQL_ADMIN_PORT", default_value = "6032")]
    pub admin_port: u16,
    /// The ProxySQL admin user
    #[clap(long, env = "PROXYSQL_ADMIN_USER", default_value = "admin")]
    pub admin_user: String,
    /// The ProxySQL admin password
    #[clap(long, env = "PROXYSQL_ADMIN_PASSWORD", default_value = "admin", hide_env_values = true)]
    pub admin_password: String,
    /// The `mysql` client used to talk to the admin interface
    #[clap(long, env = "SLUICE_MYSQL_BIN", default_value = "mysql")]
    pub mysql_bin: String,
    /// The bound on a single admin command, in milliseconds
    #[clap(long, env = "SLUICE_ADMIN_TIMEOUT_MS", default_value = "5000")]
    pub admin_timeout_ms: u64,

    // --- Telemetry --- //
    /// Emit logs as JSON
    #[clap(long, env = "SLUICE_LOG_JSON")]
    pub log_json: bool,
}

impl Cli {
    /// Build the controller configuration from the CLI arguments
    pub fn controller_config(&self) -> Result<ControllerConfig, AgentError> {
        let period =
            Duration::try_from_secs_f64(self.period_secs).map_err(|_| AgentError::InvalidDuration {
                flag: "--period-secs",
                value: self.period_secs.to_string(),
            })?;

        let config = ControllerConfig {
            workers: self.backends.clone(),
            hostgroup: HostgroupId(self.hostgroup),
            period,
            samples_per_cycle: self.samples,
            alpha: self.alpha,
            epsilon: self.epsilon,
            weight_min: self.weight_min,
            weight_max: self.weight_max,
            delta_max: self.delta_max,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            initial_estimate_ms: self.initial_estimate_ms,
        };
        config.validate()?;

        Ok(config)
    }

    /// The ProxySQL admin endpoint from the CLI arguments
    pub fn admin_endpoint(&self) -> AdminEndpoint {
        AdminEndpoint {
            host: self.admin_host.clone(),
            port: self.admin_port,
            user: self.admin_user.clone(),
            password: self.admin_password.clone(),
        }
    }

    /// The bound on a single admin command
    pub fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.admin_timeout_ms)
    }

    /// Configure logging from the CLI arguments.
    ///
    /// The level defaults to `info` and can be overridden with `RUST_LOG`.
    pub fn configure_telemetry(&self) -> Result<(), AgentError> {
        let filter =
            EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();
        let json = self.log_json.then(|| {
            fmt::layer().with_file(true).with_line_number(true).json().flatten_event(true)
        });
        let plain = (!self.log_json).then(|| fmt::layer().with_file(true).with_line_number(true));

        tracing_subscriber::registry()
            .with(filter)
            .with(json)
            .with(plain)
            .try_init()
            .map_err(|e| AgentError::Telemetry(e.to_string()))
    }
}
