//! Audit configuration
//!
//! Defaults, overridden by a `key = value` config file, overridden in turn by
//! environment variables and command-line flags (applied by the binary).

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default monerod JSON-RPC port
pub const DEFAULT_RPC_PORT: u16 = 18081;

/// Atomic units per displayed coin (1 XMR = 10^12 piconero)
pub const ATOMIC_UNITS: u64 = 1_000_000_000_000;

/// 0.001 XMR
pub const DEFAULT_TOLERANCE: u64 = 1_000_000_000;

/// Full audit configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// JSON-RPC endpoint (e.g., "http://127.0.0.1:18081/json_rpc")
    pub rpc_url: String,
    /// Per-request RPC timeout
    pub rpc_timeout: Duration,
    /// Daemon binary used for `print_block`
    pub daemon_path: PathBuf,
    /// Arguments placed before `print_block <height>`
    pub daemon_args: Vec<String>,
    /// Per-attempt timeout of the daemon invocation
    pub reward_timeout: Duration,
    /// Maximum number of daemon invocations per height
    pub reward_attempts: u32,
    /// Fixed pause between daemon invocations
    pub reward_retry_delay: Duration,
    /// Scale from displayed reward to atomic units
    pub atomic_units: u64,
    /// Absolute mismatch threshold, in atomic units
    pub tolerance: u64,
    /// Heights per batch
    pub batch_size: u64,
    /// Pause after each batch
    pub batch_pause: Duration,
    /// Concurrent heights in flight (1 = sequential)
    pub workers: usize,
    /// Directory receiving the report and the operational log
    pub output_dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            rpc_url: rpc_url_for_server(&format!("127.0.0.1:{}", DEFAULT_RPC_PORT)),
            rpc_timeout: Duration::from_secs(10),
            daemon_path: PathBuf::from("monerod"),
            daemon_args: Vec::new(),
            reward_timeout: Duration::from_secs(20),
            reward_attempts: 99,
            reward_retry_delay: Duration::from_secs(1),
            atomic_units: ATOMIC_UNITS,
            tolerance: DEFAULT_TOLERANCE,
            batch_size: 50,
            batch_pause: Duration::from_millis(100),
            workers: 1,
            output_dir: PathBuf::from("out"),
        }
    }
}

/// Build the JSON-RPC URL for `host` or `host:port`
pub fn rpc_url_for_server(server: &str) -> String {
    let server = server.trim();
    if server.contains(':') {
        format!("http://{}/json_rpc", server)
    } else {
        format!("http://{}:{}/json_rpc", server, DEFAULT_RPC_PORT)
    }
}

/// Parse a worker count: a positive number or `max` (one per CPU)
pub fn parse_workers(value: &str) -> Result<usize> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("max") {
        return Ok(num_cpus::get());
    }
    let n: usize = value
        .parse()
        .with_context(|| format!("Invalid thread count: {}", value))?;
    Ok(n.max(1))
}

/// Parse `key = value` lines, ignoring blanks and `#` comments
pub fn parse_config_file(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

impl AuditConfig {
    /// Load defaults plus whatever the config file sets.
    ///
    /// A missing file is not an error; the defaults are used.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        match std::fs::read_to_string(path) {
            Ok(content) => config.apply(&parse_config_file(&content))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "⚠️  Config file {} not found, using defaults",
                    path.display()
                );
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))
            }
        }
        Ok(config)
    }

    /// Apply parsed config-file entries. `server` takes precedence over `rpc_url`.
    pub fn apply(&mut self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(server) = entries.get("server") {
            self.rpc_url = rpc_url_for_server(server);
        } else if let Some(url) = entries.get("rpc_url") {
            self.rpc_url = url.clone();
        }
        if let Some(daemon) = entries.get("daemon") {
            self.daemon_path = PathBuf::from(daemon);
        }
        if let Some(args) = entries.get("daemon_args") {
            self.daemon_args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(threads) = entries.get("threads") {
            self.workers = parse_workers(threads)?;
        }
        if let Some(dir) = entries.get("output_dir") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(tolerance) = entries.get("tolerance") {
            self.tolerance = tolerance
                .parse()
                .with_context(|| format!("Invalid tolerance: {}", tolerance))?;
        }
        if let Some(batch) = entries.get("batch_size") {
            let batch: u64 = batch
                .parse()
                .with_context(|| format!("Invalid batch_size: {}", batch))?;
            self.batch_size = batch.max(1);
        }
        if let Some(retries) = entries.get("retries") {
            let retries: u32 = retries
                .parse()
                .with_context(|| format!("Invalid retries: {}", retries))?;
            self.reward_attempts = retries.max(1);
        }
        if let Some(timeout) = entries.get("timeout") {
            let secs: u64 = timeout
                .parse()
                .with_context(|| format!("Invalid timeout: {}", timeout))?;
            self.reward_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Resolve the daemon binary through `PATH` when it is a bare name
    pub fn resolved_daemon(&self) -> PathBuf {
        if self.daemon_path.components().count() > 1 {
            return self.daemon_path.clone();
        }
        which::which(&self.daemon_path).unwrap_or_else(|_| self.daemon_path.clone())
    }
}
