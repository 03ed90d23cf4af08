//! Re-checking a written report against a fresh audit

use super::helpers::*;
use anyhow::Result;
use coinbase_audit::audit_log::AuditLog;
use coinbase_audit::report::{read_report, ReportRow};
use coinbase_audit::verify::{check_report, RowCheck};
use coinbase_audit::CsvReport;
use std::sync::Arc;

#[tokio::test]
async fn test_check_flags_edited_rows() -> Result<()> {
    let node = Arc::new(FakeNode::healthy_chain(6).without_block(6));
    let auditor = auditor(node, Arc::new(FakeDaemon::default()), 1, AuditLog::memory());

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("report.csv");
    let mut report = CsvReport::create(&path)?;
    auditor.audit_range(0, 5, &mut report).await?;
    drop(report);

    let mut rows = read_report(&path)?;
    assert_eq!(rows.len(), 6);
    rows[1].reward += 1;
    rows[4].status = "Discrepancy".to_string();
    rows.push(ReportRow {
        height: 6,
        hash: "gone".to_string(),
        reward: 1,
        coinbase_outputs: 1,
        total_mined: 1,
        issues: "None".to_string(),
        status: "OK".to_string(),
        missing_txs: 0,
    });

    let (checks, summary) = check_report(&auditor, &rows).await;
    assert_eq!(summary.matched, 4);
    assert_eq!(summary.failed, 3);
    assert_eq!(checks[0], (0, RowCheck::Match));
    assert!(matches!(&checks[1].1, RowCheck::Mismatch(d) if d.len() == 1 && d[0].starts_with("reward")));
    assert!(matches!(&checks[4].1, RowCheck::Mismatch(d) if d[0].starts_with("status")));
    assert!(matches!(&checks[6].1, RowCheck::Unavailable(_)));
    Ok(())
}
