//! coinbase-audit - per-block issuance auditor
//!
//! For every block, the daemon's reported reward is reconciled against the
//! coinbase outputs and against everything the block's transactions output,
//! as served by a running node's JSON-RPC interface. Results stream into an
//! append-only CSV report; every call and decision is traced in an
//! operational log.

/// Operational log
pub mod audit_log;
/// Range and single-block audits
pub mod auditor;
pub mod config;
pub mod error;
pub mod model;
pub mod reconciler;
/// Report sink
pub mod report;
pub mod reward;
/// Node JSON-RPC client
pub mod rpc_client;
/// Report re-check
pub mod verify;

use anyhow::Result;
use std::sync::Arc;

pub use audit_log::AuditLog;
pub use auditor::{AuditSummary, AuditorOptions, RangeAuditor};
pub use config::AuditConfig;
pub use error::{AuditError, RewardError, RpcError};
pub use model::{AuditResult, AuditStatus, BlockInfo};
pub use reconciler::Reconciler;
pub use report::{CsvReport, ReportSink};

/// Wire the RPC client, the daemon reward fetcher and the reconciler from `config`
pub fn auditor_from_config(config: &AuditConfig, log: AuditLog) -> Result<RangeAuditor> {
    let rpc = rpc_client::MoneroRpcClient::new(
        rpc_client::RpcConfig {
            url: config.rpc_url.clone(),
            timeout: config.rpc_timeout,
        },
        log.clone(),
    )?;
    let rewards = reward::DaemonRewardFetcher::new(
        config.resolved_daemon(),
        config.daemon_args.clone(),
        config.reward_timeout,
        reward::RetryPolicy {
            max_attempts: config.reward_attempts,
            delay: config.reward_retry_delay,
        },
        config.atomic_units,
        log.clone(),
    );
    let reconciler = Reconciler::new(Arc::new(rpc), Arc::new(rewards), config.tolerance, log);
    Ok(RangeAuditor::new(
        reconciler,
        AuditorOptions {
            batch_size: config.batch_size,
            batch_pause: config.batch_pause,
            workers: config.workers,
        },
    ))
}
