//! Deputy configuration

use std::time::Duration;

use surrogate_core::{SurrogateError, SurrogateResult};
use surrogate_state::{ReconcilePolicy, DEFAULT_RECONCILE_ATTEMPTS, DEFAULT_RECONCILE_DELAY};

/// Broadcast event carrying delegation traffic
pub const DEFAULT_EVENT_NAME: &str = "module.allow-player-create-tile";

/// How long a requester waits for the delegate's response
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Request ids remembered by the executor for duplicate suppression
pub const DEFAULT_SERVED_CACHE_CAPACITY: usize = 256;

pub const ENV_EVENT: &str = "SURROGATE_EVENT";
pub const ENV_RPC_TIMEOUT: &str = "SURROGATE_RPC_TIMEOUT";
pub const ENV_RECONCILE_ATTEMPTS: &str = "SURROGATE_RECONCILE_ATTEMPTS";
pub const ENV_RECONCILE_DELAY: &str = "SURROGATE_RECONCILE_DELAY";

/// Deputy configuration
#[derive(Clone, Debug, PartialEq)]
pub struct DeputyConfig {
    /// Broadcast event name
    pub event_name: String,
    /// Requester-side timeout per delegated request
    pub rpc_timeout: Duration,
    /// Reconciler lookups before returning a partial result
    pub reconcile_attempts: u32,
    /// Pause between reconciler lookups
    pub reconcile_delay: Duration,
    /// Capacity of the executor's served-request cache
    pub served_cache_capacity: usize,
}

impl Default for DeputyConfig {
    fn default() -> Self {
        DeputyConfig {
            event_name: DEFAULT_EVENT_NAME.to_string(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            reconcile_attempts: DEFAULT_RECONCILE_ATTEMPTS,
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
            served_cache_capacity: DEFAULT_SERVED_CACHE_CAPACITY,
        }
    }
}

impl DeputyConfig {
    /// Defaults overlaid with `SURROGATE_*` environment variables
    pub fn from_env() -> SurrogateResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup<F>(lookup: F) -> SurrogateResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = DeputyConfig::default();

        if let Some(event) = lookup(ENV_EVENT) {
            let event = event.trim();
            if event.is_empty() {
                return Err(SurrogateError::Config(format!("{} is empty", ENV_EVENT)));
            }
            config.event_name = event.to_string();
        }
        if let Some(raw) = lookup(ENV_RPC_TIMEOUT) {
            config.rpc_timeout = parse_duration(ENV_RPC_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RECONCILE_DELAY) {
            config.reconcile_delay = parse_duration(ENV_RECONCILE_DELAY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RECONCILE_ATTEMPTS) {
            config.reconcile_attempts = raw.trim().parse().map_err(|e| {
                SurrogateError::Config(format!("{}={:?}: {}", ENV_RECONCILE_ATTEMPTS, raw, e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SurrogateResult<()> {
        if self.rpc_timeout.is_zero() {
            return Err(SurrogateError::Config("rpc_timeout must be non-zero".into()));
        }
        if self.reconcile_attempts == 0 {
            return Err(SurrogateError::Config(
                "reconcile_attempts must be at least 1".into(),
            ));
        }
        if self.served_cache_capacity == 0 {
            return Err(SurrogateError::Config(
                "served_cache_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            attempts: self.reconcile_attempts,
            delay: self.reconcile_delay,
        }
    }
}

fn parse_duration(key: &str, raw: &str) -> SurrogateResult<Duration> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| SurrogateError::Config(format!("{}={:?}: {}", key, raw, e)))
}
