//! Audit report sink
//!
//! Append-only table, one row per reconciled block, each row flushed as
//! soon as it is written so an interrupted run leaves a valid prefix.

use crate::model::{AuditResult, AuditStatus};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Column names, in order
pub const HEADER: [&str; 8] = [
    "height",
    "hash",
    "reward",
    "coinbase_outputs",
    "total_mined",
    "issues",
    "status",
    "missing_txs",
];

/// Destination of audit results
pub trait ReportSink: Send {
    fn append(&mut self, result: &AuditResult) -> Result<()>;
}

/// CSV report file
pub struct CsvReport {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvReport {
    /// Create (truncating) the report and write the header
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create report: {}", path.display()))?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for CsvReport {
    fn append(&mut self, result: &AuditResult) -> Result<()> {
        self.writer
            .write_record(row(result))
            .with_context(|| format!("Failed to write row for block {}", result.height))?;
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush report: {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory sink, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryReport {
    pub rows: Vec<AuditResult>,
}

impl ReportSink for MemoryReport {
    fn append(&mut self, result: &AuditResult) -> Result<()> {
        self.rows.push(result.clone());
        Ok(())
    }
}

fn row(result: &AuditResult) -> [String; 8] {
    [
        result.height.to_string(),
        result.hash.clone(),
        result.reward.to_string(),
        result.coinbase_outputs.to_string(),
        result.total_mined.to_string(),
        result.issues_string(),
        result.status.to_string(),
        result.missing_txs.to_string(),
    ]
}

/// One row of a previously written report
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReportRow {
    pub height: u64,
    pub hash: String,
    pub reward: u64,
    pub coinbase_outputs: u64,
    pub total_mined: u64,
    pub issues: String,
    pub status: String,
    #[serde(default)]
    pub missing_txs: usize,
}

impl ReportRow {
    pub fn status(&self) -> Result<AuditStatus> {
        self.status
            .parse()
            .map_err(|e: String| anyhow::anyhow!("block {}: {}", self.height, e))
    }
}

/// Read every row of a report. Rows that fail to parse are reported as errors.
pub fn read_report(path: &Path) -> Result<Vec<ReportRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open report: {}", path.display()))?;
    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<ReportRow>().enumerate() {
        let row = record.with_context(|| format!("Malformed report row {}", idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}
