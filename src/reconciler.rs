//! Per-block reconciliation
//!
//! Three independently sourced numbers are compared for each block: the
//! daemon's reward figure, the coinbase output sum, and the coinbase plus
//! every other transaction's outputs. All arithmetic is exact integer
//! arithmetic in atomic units; mismatches up to `tolerance` are ignored.

use crate::audit_log::AuditLog;
use crate::error::AuditError;
use crate::model::{AuditResult, AuditStatus, BlockInfo};
use crate::reward::RewardSource;
use crate::rpc_client::NodeRpc;
use std::sync::Arc;

const OVERFLOW_COINBASE: &str = "Coinbase output sum overflows u64";
const OVERFLOW_TOTAL: &str = "TotalMined overflows u64";

/// Classifies a block given all of its inputs. Pure and deterministic.
///
/// `transaction_outputs` is `None` when the non-coinbase outputs do not fit
/// in a `u64`. A sum that overflows is reported as an issue, its comparison
/// is skipped, and the row carries `u64::MAX` for it.
pub fn evaluate(
    block: &BlockInfo,
    reward: u64,
    transaction_outputs: Option<u64>,
    missing_txs: usize,
    tolerance: u64,
) -> AuditResult {
    let miner_tx = &block.block.miner_tx;
    let coinbase = miner_tx.output_sum();
    let total = coinbase.zip(transaction_outputs).and_then(|(c, t)| c.checked_add(t));

    let mut issues = Vec::new();
    match coinbase {
        Some(coinbase) if reward.abs_diff(coinbase) > tolerance => {
            issues.push(format!("Reward != Coinbase ({} vs {})", reward, coinbase));
        }
        Some(_) => {}
        None => issues.push(OVERFLOW_COINBASE.to_string()),
    }
    match total {
        Some(total) if reward.abs_diff(total) > tolerance => {
            issues.push(format!("Reward != TotalMined ({} vs {})", reward, total));
        }
        Some(_) => {}
        None => issues.push(OVERFLOW_TOTAL.to_string()),
    }
    if !miner_tx.is_well_formed(block.height) {
        issues.push("Invalid coinbase".to_string());
    }

    let status = if issues.is_empty() {
        AuditStatus::Ok
    } else {
        AuditStatus::Discrepancy
    };

    AuditResult {
        height: block.height,
        hash: block.hash.clone(),
        reward,
        coinbase_outputs: coinbase.unwrap_or(u64::MAX),
        total_mined: total.unwrap_or(u64::MAX),
        issues,
        status,
        missing_txs,
    }
}

/// Fetches the remaining inputs of a block and classifies it
#[derive(Clone)]
pub struct Reconciler {
    rpc: Arc<dyn NodeRpc>,
    rewards: Arc<dyn RewardSource>,
    tolerance: u64,
    log: AuditLog,
}

impl Reconciler {
    pub fn new(
        rpc: Arc<dyn NodeRpc>,
        rewards: Arc<dyn RewardSource>,
        tolerance: u64,
        log: AuditLog,
    ) -> Self {
        Self {
            rpc,
            rewards,
            tolerance,
            log,
        }
    }

    pub fn rpc(&self) -> &Arc<dyn NodeRpc> {
        &self.rpc
    }

    pub fn log(&self) -> &AuditLog {
        &self.log
    }

    /// Reconcile one block.
    ///
    /// Fails only when the reward figure is unavailable; transactions whose
    /// detail cannot be fetched count as zero and are reported in
    /// `missing_txs`.
    pub async fn reconcile(&self, block: &BlockInfo) -> Result<AuditResult, AuditError> {
        let height = block.height;
        self.log.debug(format!("Audit started for block {}", height));

        let reward = match self.rewards.fetch_reward(height).await {
            Ok(reward) => reward,
            Err(source) => {
                self.log
                    .error(format!("Reward not obtained for block {}: {}", height, source));
                return Err(AuditError::RewardUnavailable { height, source });
            }
        };

        match block.block.miner_tx.output_sum() {
            Some(sum) => self
                .log
                .debug(format!("Coinbase outputs block {}: {}", height, sum)),
            None => self
                .log
                .error(format!("Coinbase outputs of block {} overflow u64", height)),
        }

        let mut transaction_outputs = Some(0u64);
        let mut missing_txs = 0usize;
        for hash in &block.block.tx_hashes {
            match self.rpc.fetch_transaction(hash).await {
                Some(tx) => {
                    let before = transaction_outputs;
                    transaction_outputs = before
                        .zip(tx.sum())
                        .and_then(|(acc, sum)| acc.checked_add(sum));
                    if before.is_some() && transaction_outputs.is_none() {
                        self.log.error(format!(
                            "Transaction outputs of block {} overflow u64 at {}",
                            height, hash
                        ));
                    }
                }
                None => {
                    missing_txs += 1;
                    self.log.warn(format!(
                        "Partial data: transaction {} of block {} unavailable, counted as zero",
                        hash, height
                    ));
                }
            }
        }
        self.log.debug(format!(
            "Transaction outputs block {}: {} ({} of {} missing)",
            height,
            transaction_outputs.map_or_else(|| "overflow".to_string(), |sum| sum.to_string()),
            missing_txs,
            block.block.tx_hashes.len()
        ));

        let result = evaluate(block, reward, transaction_outputs, missing_txs, self.tolerance);
        self.log.debug(format!(
            "Result block {}: total_mined={}, status={}, issues={}",
            height,
            result.total_mined,
            result.status,
            result.issues_string()
        ));
        Ok(result)
    }
}
