//! Orchestrator configuration
//!
//! All timeouts, retry bounds and external command paths are configurable to
//! allow tuning for different clusters (and to point the tests at fakes).

use std::path::PathBuf;
use std::time::Duration;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL (e.g. "sqlite://gantry.sqlite").
    pub database_url: String,

    /// Control-plane bind address.
    pub bind_addr: String,

    /// Owner recorded on registrations made through this instance.
    pub owner: String,

    /// Path to the bootstrap worker binary.
    pub worker_bin: PathBuf,

    /// Resource manager commands.
    pub sbatch_bin: PathBuf,
    pub srun_bin: PathBuf,
    pub scancel_bin: PathBuf,
    pub squeue_bin: PathBuf,

    /// How long to wait for a worker handshake banner.
    pub handshake_timeout: Duration,

    /// Queue-status polling for batch submissions.
    pub status_poll_retries: u32,
    pub status_poll_delay: Duration,

    /// Worker RPC connection retries.
    pub rpc_connect_retries: u32,
    pub rpc_connect_delay: Duration,

    /// Concurrent local executions admitted per task identity.
    pub local_pool_capacity: usize,

    /// Timer wheel polling resolution.
    pub scheduler_resolution: Duration,
}

impl Config {
    /// Creates configuration from environment variables with defaults.
    ///
    /// Recognized variables: DATABASE_URL, ORCHESTRATOR_BIND_ADDR,
    /// GANTRY_OWNER, GANTRY_WORKER_BIN, SBATCH_BIN, SRUN_BIN, SCANCEL_BIN,
    /// SQUEUE_BIN, HANDSHAKE_TIMEOUT_SECS, STATUS_POLL_RETRIES,
    /// STATUS_POLL_DELAY_SECS, RPC_CONNECT_RETRIES, RPC_CONNECT_DELAY_SECS,
    /// LOCAL_POOL_CAPACITY, SCHEDULER_RESOLUTION_MS.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(addr) = std::env::var("ORCHESTRATOR_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(owner) = std::env::var("GANTRY_OWNER") {
            config.owner = owner;
        }
        if let Ok(bin) = std::env::var("GANTRY_WORKER_BIN") {
            config.worker_bin = PathBuf::from(bin);
        }
        if let Ok(bin) = std::env::var("SBATCH_BIN") {
            config.sbatch_bin = PathBuf::from(bin);
        }
        if let Ok(bin) = std::env::var("SRUN_BIN") {
            config.srun_bin = PathBuf::from(bin);
        }
        if let Ok(bin) = std::env::var("SCANCEL_BIN") {
            config.scancel_bin = PathBuf::from(bin);
        }
        if let Ok(bin) = std::env::var("SQUEUE_BIN") {
            config.squeue_bin = PathBuf::from(bin);
        }
        if let Some(secs) = env_u64("HANDSHAKE_TIMEOUT_SECS") {
            config.handshake_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("STATUS_POLL_RETRIES") {
            config.status_poll_retries = n as u32;
        }
        if let Some(secs) = env_u64("STATUS_POLL_DELAY_SECS") {
            config.status_poll_delay = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("RPC_CONNECT_RETRIES") {
            config.rpc_connect_retries = n as u32;
        }
        if let Some(secs) = env_u64("RPC_CONNECT_DELAY_SECS") {
            config.rpc_connect_delay = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("LOCAL_POOL_CAPACITY") {
            config.local_pool_capacity = n as usize;
        }
        if let Some(ms) = env_u64("SCHEDULER_RESOLUTION_MS") {
            config.scheduler_resolution = Duration::from_millis(ms);
        }

        config
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }
        if self.local_pool_capacity == 0 {
            anyhow::bail!("local_pool_capacity must be greater than 0");
        }
        if self.scheduler_resolution.is_zero() {
            anyhow::bail!("scheduler_resolution must be greater than 0");
        }
        if self.status_poll_retries == 0 || self.rpc_connect_retries == 0 {
            anyhow::bail!("retry bounds must be greater than 0");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        // The worker normally sits next to the orchestrator binary.
        let worker_bin = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.join("gantry-worker")))
            .unwrap_or_else(|| PathBuf::from("gantry-worker"));

        Self {
            database_url: "sqlite://gantry.sqlite".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            owner: std::env::var("USER").unwrap_or_else(|_| "gantry".to_string()),
            worker_bin,
            sbatch_bin: PathBuf::from("/usr/bin/sbatch"),
            srun_bin: PathBuf::from("/usr/bin/srun"),
            scancel_bin: PathBuf::from("/usr/bin/scancel"),
            squeue_bin: PathBuf::from("/usr/bin/squeue"),
            handshake_timeout: Duration::from_secs(180),
            status_poll_retries: 180,
            status_poll_delay: Duration::from_secs(1),
            rpc_connect_retries: 5,
            rpc_connect_delay: Duration::from_secs(1),
            local_pool_capacity: 4,
            scheduler_resolution: Duration::from_secs(1),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler_resolution, Duration::from_secs(1));
        assert_eq!(config.rpc_connect_retries, 5);
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = Config::default();
        config.local_pool_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_retry_bounds() {
        let mut config = Config::default();
        config.status_poll_retries = 0;
        assert!(config.validate().is_err());
    }
}
