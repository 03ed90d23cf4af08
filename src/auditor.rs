//! Range and single-block audits
//!
//! Heights are audited in fixed-size batches with a short pause between
//! batches. Each result is appended to the report as soon as it exists.
//! A height whose block or reward cannot be obtained is logged and skipped;
//! nothing but a sink failure stops the loop early.
//!
//! With more than one worker, heights are reconciled concurrently on the
//! tokio runtime while this task stays the only writer of the report.

use crate::audit_log::AuditLog;
use crate::error::AuditError;
use crate::model::AuditResult;
use crate::reconciler::Reconciler;
use crate::report::ReportSink;
use anyhow::Result;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};

/// Batching and concurrency knobs
#[derive(Debug, Clone, Copy)]
pub struct AuditorOptions {
    pub batch_size: u64,
    pub batch_pause: Duration,
    pub workers: usize,
}

impl Default for AuditorOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_pause: Duration::from_millis(100),
            workers: 1,
        }
    }
}

/// Heights processed so far, successful or not
#[derive(Debug)]
pub struct Progress {
    total: u64,
    processed: AtomicU64,
    started: Instant,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            processed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Count one more height; returns the new count
    pub fn advance(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn report(&self) {
        let done = self.processed();
        let pct = if self.total == 0 {
            100.0
        } else {
            done as f64 / self.total as f64 * 100.0
        };
        let rate = done as f64 / self.started.elapsed().as_secs_f64().max(0.001);
        println!(
            "   📊 Progress: {}/{} ({:.1}%), {:.1} blocks/sec",
            done, self.total, pct, rate
        );
    }
}

/// Totals of a range audit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub processed: u64,
    pub written: u64,
    pub discrepancies: u64,
    pub skipped: u64,
    pub aborted: bool,
}

impl AuditSummary {
    fn record(&mut self, outcome: &Option<AuditResult>) {
        self.processed += 1;
        match outcome {
            Some(result) => {
                self.written += 1;
                if !result.is_ok() {
                    self.discrepancies += 1;
                }
            }
            None => self.skipped += 1,
        }
    }
}

/// Fetch and reconcile one height, converting every failure into a logged skip
async fn audit_height(reconciler: &Reconciler, height: u64) -> Option<AuditResult> {
    let log = reconciler.log();
    let Some(block) = reconciler.rpc().fetch_block(height).await else {
        log.error(format!("Skip block {}: block not obtained", height));
        log.block_end();
        return None;
    };
    match reconciler.reconcile(&block).await {
        Ok(result) => Some(result),
        Err(e) => {
            log.error(format!("Skip block {}: {}", height, e));
            log.block_end();
            None
        }
    }
}

/// Watch for interrupts while a range audit runs.
///
/// The first interrupt raises `abort`, so the audit stops once the heights
/// in flight are written. Returns `true` on a second interrupt, after which
/// the caller should exit without waiting. Returns `false` if the signal
/// source fails.
pub async fn watch_interrupts<F, Fut>(
    mut interrupt: F,
    abort: Arc<AtomicBool>,
    log: AuditLog,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    log.warn("Interrupt received, stopping after in-flight blocks");
    eprintln!("\n⚠️  Interrupt received, finishing in-flight blocks (Ctrl-C again to exit now)...");
    abort.store(true, Ordering::SeqCst);

    if interrupt().await.is_err() {
        return false;
    }
    log.warn("Second interrupt received, exiting without waiting for in-flight blocks");
    true
}

/// Drives the reconciler over heights
pub struct RangeAuditor {
    reconciler: Reconciler,
    options: AuditorOptions,
    abort: Arc<AtomicBool>,
}

impl RangeAuditor {
    pub fn new(reconciler: Reconciler, options: AuditorOptions) -> Self {
        Self {
            reconciler,
            options,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an existing abort flag instead of the auditor's own
    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Flag that stops the range audit before the next height is started
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Resolve the heights to audit.
    ///
    /// Without an end the chain tip is required; with one, it is clamped to
    /// the tip when the tip is known.
    pub async fn resolve_range(
        &self,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<(u64, u64), AuditError> {
        let start = start.unwrap_or(0);
        let tip = self.reconciler.rpc().current_height().await;
        let end = match (end, tip) {
            (Some(end), Some(tip)) => end.min(tip),
            (Some(end), None) => end,
            (None, Some(tip)) => tip,
            (None, None) => {
                self.reconciler
                    .log()
                    .error("Failed to obtain current chain height");
                return Err(AuditError::ChainHeightUnavailable);
            }
        };
        Ok((start, end))
    }

    /// Audit exactly one height, without touching any report
    pub async fn audit_one(&self, height: u64) -> Result<AuditResult, AuditError> {
        let log = self.reconciler.log();
        log.info(format!("Auditing single block {}", height));
        let Some(block) = self.reconciler.rpc().fetch_block(height).await else {
            log.error(format!("Block {} could not be fetched", height));
            log.block_end();
            return Err(AuditError::BlockUnavailable(height));
        };
        let outcome = self.reconciler.reconcile(&block).await;
        match &outcome {
            Ok(result) => log.info(format!("Block {}: status={}", height, result.status)),
            Err(e) => log.error(format!("Audit failed for block {}: {}", height, e)),
        }
        log.block_end();
        outcome
    }

    /// Audit `start..=end`, appending each result to `sink` as it completes
    pub async fn audit_range<S: ReportSink + ?Sized>(
        &self,
        start: u64,
        end: u64,
        sink: &mut S,
    ) -> Result<AuditSummary> {
        let log = self.reconciler.log();
        if end < start {
            log.warn(format!("Empty range {}-{}", start, end));
            return Ok(AuditSummary::default());
        }
        log.info(format!(
            "Starting audit of {} to {} ({} workers)",
            start, end, self.options.workers
        ));

        let progress = Progress::new((end - start).saturating_add(1));
        let summary = if self.options.workers <= 1 {
            self.run_sequential(start, end, sink, &progress).await?
        } else {
            self.run_parallel(start, end, sink, &progress).await?
        };

        progress.report();
        if summary.aborted {
            log.warn(format!(
                "Audit aborted after {} of {} blocks",
                summary.processed,
                progress.total()
            ));
        }
        log.info(format!(
            "Audit finished: {} processed, {} written, {} discrepancies, {} skipped",
            summary.processed, summary.written, summary.discrepancies, summary.skipped
        ));
        Ok(summary)
    }

    fn batches(&self, start: u64, end: u64) -> impl Iterator<Item = (u64, u64)> {
        let size = self.options.batch_size.max(1);
        let mut next = Some(start);
        std::iter::from_fn(move || {
            let from = next?;
            let to = from.saturating_add(size - 1).min(end);
            next = if to < end { Some(to + 1) } else { None };
            Some((from, to))
        })
    }

    fn write<S: ReportSink + ?Sized>(
        &self,
        sink: &mut S,
        outcome: &Option<AuditResult>,
    ) -> Result<()> {
        if let Some(result) = outcome {
            sink.append(result)?;
            let log = self.reconciler.log();
            log.info(format!(
                "Block {} written to report: status={}",
                result.height, result.status
            ));
            log.block_end();
        }
        Ok(())
    }

    async fn run_sequential<S: ReportSink + ?Sized>(
        &self,
        start: u64,
        end: u64,
        sink: &mut S,
        progress: &Progress,
    ) -> Result<AuditSummary> {
        let log = self.reconciler.log();
        let mut summary = AuditSummary::default();

        'batches: for (from, to) in self.batches(start, end) {
            log.debug(format!("Processing batch {}-{}", from, to));
            for height in from..=to {
                if self.aborted() {
                    summary.aborted = true;
                    break 'batches;
                }
                let outcome = audit_height(&self.reconciler, height).await;
                self.write(sink, &outcome)?;
                summary.record(&outcome);
                progress.advance();
            }
            log.debug(format!("Batch {}-{} done", from, to));
            progress.report();
            if to < end {
                tokio::time::sleep(self.options.batch_pause).await;
            }
        }
        Ok(summary)
    }

    async fn run_parallel<S: ReportSink + ?Sized>(
        &self,
        start: u64,
        end: u64,
        sink: &mut S,
        progress: &Progress,
    ) -> Result<AuditSummary> {
        let log = self.reconciler.log();
        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<(u64, Option<AuditResult>)>();
        let mut summary = AuditSummary::default();
        let mut dispatched = 0u64;

        'batches: for (from, to) in self.batches(start, end) {
            log.debug(format!("Dispatching batch {}-{}", from, to));
            for height in from..=to {
                if self.aborted() {
                    summary.aborted = true;
                    break 'batches;
                }
                let permit = semaphore.clone().acquire_owned().await?;
                let reconciler = self.reconciler.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = audit_height(&reconciler, height).await;
                    // The receiver only goes away if the writer already failed.
                    let _ = tx.send((height, outcome));
                });
                dispatched += 1;

                while let Ok((_, outcome)) = rx.try_recv() {
                    self.write(sink, &outcome)?;
                    summary.record(&outcome);
                    progress.advance();
                }
            }
            progress.report();
            if to < end {
                tokio::time::sleep(self.options.batch_pause).await;
            }
        }

        drop(tx);
        while let Some((_, outcome)) = rx.recv().await {
            self.write(sink, &outcome)?;
            summary.record(&outcome);
            progress.advance();
        }

        if summary.processed != dispatched {
            log.error(format!(
                "{} dispatched blocks never reported a result",
                dispatched - summary.processed
            ));
        }
        Ok(summary)
    }
}
