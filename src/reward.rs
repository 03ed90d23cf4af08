//! Ground-truth block reward
//!
//! The authoritative reward for a height is read from the daemon's
//! human-readable `print_block` dump, not recomputed here. The daemon is
//! flaky under load, so timeouts and process faults are retried with a fixed
//! delay up to a bounded number of attempts. Output that arrives without a
//! usable `reward:` line is final for that height.

use crate::audit_log::AuditLog;
use crate::error::RewardError;
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Marker of the reward line in `print_block` output
pub const REWARD_MARKER: &str = "reward:";

/// Source of the protocol-correct reward at a height
#[async_trait]
pub trait RewardSource: Send + Sync {
    async fn fetch_reward(&self, height: u64) -> Result<u64, RewardError>;
}

/// Bounded retry with a fixed inter-attempt delay
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Run `attempt` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `attempt` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        log: &AuditLog,
        height: u64,
        mut attempt: F,
    ) -> Result<T, RewardError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RewardError>>,
    {
        let max = self.max_attempts.max(1);
        for n in 1..=max {
            match attempt(n).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    log.warn(format!(
                        "Attempt {}/{} for block {} failed: {}",
                        n, max, height, e
                    ));
                    if n < max {
                        tokio::time::sleep(self.delay).await;
                    }
                }
                Err(e) => {
                    log.error(format!("Block {}: {} (not retried)", height, e));
                    return Err(e);
                }
            }
        }
        log.error(format!(
            "Reward fetch exhausted for block {} after {} attempts",
            height, max
        ));
        Err(RewardError::Exhausted { attempts: max })
    }
}

/// Reads rewards by invoking `<daemon> [args..] print_block <height>`
pub struct DaemonRewardFetcher {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    policy: RetryPolicy,
    atomic_units: u64,
    log: AuditLog,
}

impl DaemonRewardFetcher {
    pub fn new(
        program: PathBuf,
        args: Vec<String>,
        timeout: Duration,
        policy: RetryPolicy,
        atomic_units: u64,
        log: AuditLog,
    ) -> Self {
        Self {
            program,
            args,
            timeout,
            policy,
            atomic_units,
            log,
        }
    }

    /// One daemon invocation under the per-attempt timeout
    async fn invoke(&self, height: u64, attempt: u32) -> Result<u64, RewardError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("print_block")
            .arg(height.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        self.log.debug(format!(
            "Attempt {}/{} for block {}: {} {} print_block {}",
            attempt,
            self.policy.max_attempts.max(1),
            height,
            self.program.display(),
            self.args.join(" "),
            height
        ));

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| RewardError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(RewardError::ExitStatus(output.status));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        self.log
            .debug(format!("Daemon output for block {}: {}", height, stdout.trim_end()));

        parse_reward_output(&stdout, self.atomic_units)
    }
}

#[async_trait]
impl RewardSource for DaemonRewardFetcher {
    async fn fetch_reward(&self, height: u64) -> Result<u64, RewardError> {
        let reward = self
            .policy
            .run(&self.log, height, |attempt| self.invoke(height, attempt))
            .await?;
        self.log
            .debug(format!("Reward for block {}: {}", height, reward));
        Ok(reward)
    }
}

/// Find the first `reward:` line and convert its value to atomic units
pub fn parse_reward_output(output: &str, atomic_units: u64) -> Result<u64, RewardError> {
    let line = output
        .lines()
        .find(|line| line.contains(REWARD_MARKER))
        .ok_or(RewardError::MarkerMissing)?;
    let value = line.split(':').nth(1).unwrap_or_default().trim();
    to_atomic_units(value, atomic_units)
}

/// Convert a display-unit decimal such as `0.600000000000` into atomic units.
///
/// Power-of-ten scales are converted exactly, with excess fraction digits
/// truncated. Any other scale goes through floating point.
pub fn to_atomic_units(value: &str, atomic_units: u64) -> Result<u64, RewardError> {
    let unparseable = || RewardError::Unparseable(value.to_string());

    let Some(decimals) = power_of_ten(atomic_units) else {
        let display: f64 = value.parse().map_err(|_| unparseable())?;
        if !display.is_finite() || display < 0.0 {
            return Err(unparseable());
        }
        return Ok((display * atomic_units as f64) as u64);
    };

    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(unparseable());
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| unparseable())?
    };
    let mut fraction: String = fraction.chars().take(decimals as usize).collect();
    while fraction.len() < decimals as usize {
        fraction.push('0');
    }
    let fraction: u64 = if fraction.is_empty() {
        0
    } else {
        fraction.parse().map_err(|_| unparseable())?
    };

    whole
        .checked_mul(atomic_units)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(unparseable)
}

fn power_of_ten(mut n: u64) -> Option<u32> {
    if n == 0 {
        return None;
    }
    let mut exp = 0;
    while n % 10 == 0 {
        n /= 10;
        exp += 1;
    }
    (n == 1).then_some(exp)
}
