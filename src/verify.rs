//! Re-audit a previously written report
//!
//! Every row is audited again against the node and daemon, and the fresh
//! result is compared field by field with what the report recorded.

use crate::auditor::RangeAuditor;
use crate::model::AuditResult;
use crate::report::ReportRow;

/// Outcome of re-checking one report row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowCheck {
    /// Fresh audit agrees with the report
    Match,
    /// Fields that differ, as `name (report: x, now: y)`
    Mismatch(Vec<String>),
    /// The height could not be audited again
    Unavailable(String),
}

/// Totals of a report check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub matched: usize,
    pub failed: usize,
}

/// Fields of `row` that disagree with `fresh`
pub fn compare_row(row: &ReportRow, fresh: &AuditResult) -> Vec<String> {
    let mut diffs = Vec::new();
    let mut check = |name: &str, recorded: String, now: String| {
        if recorded != now {
            diffs.push(format!("{} (report: {}, now: {})", name, recorded, now));
        }
    };
    check("reward", row.reward.to_string(), fresh.reward.to_string());
    check(
        "coinbase_outputs",
        row.coinbase_outputs.to_string(),
        fresh.coinbase_outputs.to_string(),
    );
    check(
        "total_mined",
        row.total_mined.to_string(),
        fresh.total_mined.to_string(),
    );
    check("issues", row.issues.clone(), fresh.issues_string());
    if !matches!(row.status(), Ok(status) if status == fresh.status) {
        check("status", row.status.clone(), fresh.status.to_string());
    }
    diffs
}

/// Re-audit each row, printing one line per row and a final summary
pub async fn check_report(
    auditor: &RangeAuditor,
    rows: &[ReportRow],
) -> (Vec<(u64, RowCheck)>, CheckSummary) {
    let mut checks = Vec::with_capacity(rows.len());
    let mut summary = CheckSummary::default();

    for row in rows {
        let check = match auditor.audit_one(row.height).await {
            Ok(fresh) => {
                let diffs = compare_row(row, &fresh);
                if diffs.is_empty() {
                    RowCheck::Match
                } else {
                    RowCheck::Mismatch(diffs)
                }
            }
            Err(e) => RowCheck::Unavailable(e.to_string()),
        };

        match &check {
            RowCheck::Match => {
                summary.matched += 1;
                println!("Block {}: OK", row.height);
            }
            RowCheck::Mismatch(diffs) => {
                summary.failed += 1;
                println!("Block {}: MISMATCH ({})", row.height, diffs.join(", "));
            }
            RowCheck::Unavailable(reason) => {
                summary.failed += 1;
                println!("Block {}: could not be audited ({})", row.height, reason);
            }
        }
        checks.push((row.height, check));
    }

    println!(
        "Summary: {} blocks OK, {} blocks with differences or errors",
        summary.matched, summary.failed
    );
    (checks, summary)
}
