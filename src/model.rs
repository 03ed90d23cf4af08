//! Block, transaction and audit-result types

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Sentinel written in place of an empty issue list
pub const NO_ISSUES: &str = "None";

/// Decoded block payload (the `json` member of `get_block`)
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawBlock {
    pub miner_tx: CoinbaseTransaction,
    #[serde(default)]
    pub tx_hashes: Vec<String>,
}

/// The block's coinbase (miner) transaction
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CoinbaseTransaction {
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
}

/// Transaction input; only the generation variant matters here
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TxInput {
    #[serde(default)]
    pub gen: Option<GenerationInput>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct GenerationInput {
    pub height: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct TxOutput {
    #[serde(default)]
    pub amount: u64,
}

impl CoinbaseTransaction {
    /// Sum of the declared output amounts; `None` if it does not fit in a `u64`
    pub fn output_sum(&self) -> Option<u64> {
        self.vout
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.amount))
    }

    /// Exactly one generation input declaring `height`
    pub fn is_well_formed(&self, height: u64) -> bool {
        match self.vin.as_slice() {
            [only] => only.gen.map(|g| g.height) == Some(height),
            _ => false,
        }
    }
}

/// A block resolved by height
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u64,
    pub hash: String,
    pub block: RawBlock,
}

/// Decoded transaction body (the `as_json` member of `get_transactions`)
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub vout: Vec<TxOutput>,
}

/// Output amounts of one non-coinbase transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutputs {
    pub hash: String,
    pub amounts: Vec<u64>,
}

impl TransactionOutputs {
    pub fn sum(&self) -> Option<u64> {
        self.amounts
            .iter()
            .try_fold(0u64, |acc, amount| acc.checked_add(*amount))
    }
}

/// Outcome classification of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Ok,
    Discrepancy,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Ok => write!(f, "OK"),
            AuditStatus::Discrepancy => write!(f, "Discrepancy"),
        }
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "OK" => Ok(AuditStatus::Ok),
            "Discrepancy" => Ok(AuditStatus::Discrepancy),
            other => Err(format!("unknown status `{}`", other)),
        }
    }
}

/// Result of reconciling one block. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditResult {
    pub height: u64,
    pub hash: String,
    pub reward: u64,
    pub coinbase_outputs: u64,
    pub total_mined: u64,
    pub issues: Vec<String>,
    pub status: AuditStatus,
    /// Referenced transactions whose detail could not be fetched (counted as zero)
    pub missing_txs: usize,
}

impl AuditResult {
    /// Issues joined with `; `, or [`NO_ISSUES`]
    pub fn issues_string(&self) -> String {
        if self.issues.is_empty() {
            NO_ISSUES.to_string()
        } else {
            self.issues.join("; ")
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AuditStatus::Ok
    }
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🧱 Block {} - Hash: {}", self.height, self.hash)?;
        writeln!(f, "💰 Reward: {} atomic units", self.reward)?;
        writeln!(f, "📤 Coinbase outputs: {}", self.coinbase_outputs)?;
        writeln!(f, "📦 Total mined: {}", self.total_mined)?;
        if self.missing_txs > 0 {
            writeln!(
                f,
                "⚠️  Partial data: {} transaction(s) could not be fetched",
                self.missing_txs
            )?;
        }
        writeln!(f, "Status: {}", self.status)?;
        if self.issues.is_empty() {
            write!(f, "✅ No issues detected.")
        } else {
            write!(f, "❗ Issues:")?;
            for issue in &self.issues {
                write!(f, "\n  - {}", issue)?;
            }
            Ok(())
        }
    }
}
