//! Test doubles for the node and the daemon

use async_trait::async_trait;
use coinbase_audit::audit_log::AuditLog;
use coinbase_audit::error::RewardError;
use coinbase_audit::model::{
    BlockInfo, CoinbaseTransaction, GenerationInput, RawBlock, TransactionOutputs, TxInput,
    TxOutput,
};
use coinbase_audit::reward::RewardSource;
use coinbase_audit::rpc_client::NodeRpc;
use coinbase_audit::{AuditorOptions, RangeAuditor, Reconciler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOLERANCE: u64 = 1_000_000_000;
pub const REWARD: u64 = 600_000_000_000;

/// Build a block whose coinbase declares `height` and pays `outputs`
pub fn block(height: u64, outputs: &[u64], tx_hashes: &[&str]) -> BlockInfo {
    BlockInfo {
        height,
        hash: format!("{:064x}", height),
        block: RawBlock {
            miner_tx: CoinbaseTransaction {
                vin: vec![TxInput {
                    gen: Some(GenerationInput { height }),
                }],
                vout: outputs.iter().map(|&amount| TxOutput { amount }).collect(),
            },
            tx_hashes: tx_hashes.iter().map(|h| h.to_string()).collect(),
        },
    }
}

/// In-memory node
#[derive(Default)]
pub struct FakeNode {
    pub tip: Option<u64>,
    pub blocks: HashMap<u64, BlockInfo>,
    pub txs: HashMap<String, Vec<u64>>,
    pub block_requests: Mutex<Vec<u64>>,
}

impl FakeNode {
    /// A chain of `0..=tip` blocks that all pay exactly [`REWARD`]
    pub fn healthy_chain(tip: u64) -> Self {
        let blocks = (0..=tip).map(|h| (h, block(h, &[REWARD], &[]))).collect();
        Self {
            tip: Some(tip),
            blocks,
            ..Default::default()
        }
    }

    pub fn with_block(mut self, info: BlockInfo) -> Self {
        self.blocks.insert(info.height, info);
        self
    }

    pub fn without_block(mut self, height: u64) -> Self {
        self.blocks.remove(&height);
        self
    }

    pub fn with_tx(mut self, hash: &str, amounts: &[u64]) -> Self {
        self.txs.insert(hash.to_string(), amounts.to_vec());
        self
    }

    pub fn requested_heights(&self) -> Vec<u64> {
        let mut heights = self.block_requests.lock().unwrap().clone();
        heights.sort_unstable();
        heights
    }
}

#[async_trait]
impl NodeRpc for FakeNode {
    async fn current_height(&self) -> Option<u64> {
        self.tip
    }

    async fn fetch_block(&self, height: u64) -> Option<BlockInfo> {
        self.block_requests.lock().unwrap().push(height);
        // Yield so concurrent workers interleave.
        tokio::task::yield_now().await;
        self.blocks.get(&height).cloned()
    }

    async fn fetch_transaction(&self, hash: &str) -> Option<TransactionOutputs> {
        self.txs.get(hash).map(|amounts| TransactionOutputs {
            hash: hash.to_string(),
            amounts: amounts.clone(),
        })
    }
}

/// Daemon double: fixed reward everywhere, with per-height overrides and failures
pub struct FakeDaemon {
    pub default_reward: u64,
    pub overrides: HashMap<u64, u64>,
    pub failing: Vec<u64>,
    /// Raised once `abort_at` has been asked for its reward
    pub abort_at: Option<(u64, Arc<AtomicBool>)>,
    pub delay: Duration,
}

impl Default for FakeDaemon {
    fn default() -> Self {
        Self {
            default_reward: REWARD,
            overrides: HashMap::new(),
            failing: Vec::new(),
            abort_at: None,
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl RewardSource for FakeDaemon {
    async fn fetch_reward(&self, height: u64) -> Result<u64, RewardError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some((at, flag)) = &self.abort_at {
            if *at == height {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if self.failing.contains(&height) {
            return Err(RewardError::Exhausted { attempts: 3 });
        }
        Ok(*self.overrides.get(&height).unwrap_or(&self.default_reward))
    }
}

pub fn options(workers: usize) -> AuditorOptions {
    AuditorOptions {
        batch_size: 8,
        batch_pause: Duration::from_millis(1),
        workers,
    }
}

pub fn auditor(
    node: Arc<FakeNode>,
    daemon: Arc<dyn RewardSource>,
    workers: usize,
    log: AuditLog,
) -> RangeAuditor {
    let reconciler = Reconciler::new(node, daemon, TOLERANCE, log);
    RangeAuditor::new(reconciler, options(workers))
}
