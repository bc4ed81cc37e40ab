use anyhow::{bail, Result};
use auth_grants::{ReaperFailurePolicy, DEFAULT_OPERATION_TIMEOUT, DEFAULT_REAPER_INTERVAL};
use clap::Parser;
use std::{net::SocketAddr, time::Duration};

/// Grant checker HTTP server
#[derive(Parser, Debug, Clone)]
#[command(name = "authz-server")]
#[command(about = "Wildcard grant store and permission checker over HTTP")]
pub struct Args {
    /// PostgreSQL connection string
    #[arg(long, env = "PG_URI")]
    pub database_url: String,

    /// Server bind address
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Deadline for a single check, create or revoke, in milliseconds
    #[arg(long, env = "CHECK_TIMEOUT_MS", default_value_t = 2000)]
    pub check_timeout_ms: u64,

    /// Time between expiry sweeps, in milliseconds
    #[arg(long, env = "REAPER_INTERVAL_MS", default_value_t = 1000)]
    pub reaper_interval_ms: u64,

    /// What to do when an expiry sweep fails: `continue` or `halt`
    #[arg(long, env = "REAPER_POLICY", default_value = "continue")]
    pub reaper_policy: ReaperFailurePolicy,

    /// Maximum pooled database connections
    #[arg(long, env = "PG_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Deployment environment; `production` switches logs to JSON
    #[arg(long, env = "AUTHZ_ENV", default_value = "development")]
    pub environment: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub max_connections: u32,
    /// Per-operation deadline handed to the grant engine
    pub operation_timeout: Duration,
    pub reaper_interval: Duration,
    pub reaper_policy: ReaperFailurePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 20,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            reaper_policy: ReaperFailurePolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            listen: args.listen,
            max_connections: args.max_connections,
            operation_timeout: Duration::from_millis(args.check_timeout_ms),
            reaper_interval: Duration::from_millis(args.reaper_interval_ms),
            reaper_policy: args.reaper_policy,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.operation_timeout.is_zero() {
            bail!("check timeout must be greater than zero");
        }
        if self.reaper_interval.is_zero() {
            bail!("reaper interval must be greater than zero");
        }
        if self.max_connections == 0 {
            bail!("max connections must be greater than zero");
        }
        Ok(())
    }
}

impl Args {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
