//! Typed failure reasons
//!
//! The audit folds most failures into "skip this height", but the reason is
//! kept typed up to the point where it is written to the operational log.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single JSON-RPC exchange with the node
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("RPC error: {0}")]
    Remote(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("response missing field `{0}`")]
    MissingField(&'static str),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Failure of one attempt (or of all attempts) to read the reward from the daemon
#[derive(Debug, Error)]
pub enum RewardError {
    #[error("daemon did not answer within {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn daemon: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("daemon exited with {0}")]
    ExitStatus(std::process::ExitStatus),
    #[error("no `reward:` line in daemon output")]
    MarkerMissing,
    #[error("unparseable reward value `{0}`")]
    Unparseable(String),
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl RewardError {
    /// Whether another invocation could plausibly succeed.
    ///
    /// Output that was received but did not carry a usable reward is final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RewardError::Timeout(_) | RewardError::Spawn(_) | RewardError::ExitStatus(_)
        )
    }
}

/// Height-level and run-level audit failures
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("block {0} could not be fetched")]
    BlockUnavailable(u64),
    #[error("reward for block {height} unavailable: {source}")]
    RewardUnavailable {
        height: u64,
        #[source]
        source: RewardError,
    },
    #[error("current chain height could not be determined")]
    ChainHeightUnavailable,
}
