//! Range and single-block audits against in-memory node and daemon doubles

use super::helpers::*;
use anyhow::Result;
use coinbase_audit::audit_log::AuditLog;
use coinbase_audit::report::{read_report, MemoryReport};
use coinbase_audit::reward::{DaemonRewardFetcher, RetryPolicy};
use coinbase_audit::{AuditError, AuditStatus, CsvReport};
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_concrete_block_100() -> Result<()> {
    let node = Arc::new(
        FakeNode::healthy_chain(120).with_block(block(100, &[598_000_000_000], &[])),
    );
    let auditor = auditor(node, Arc::new(FakeDaemon::default()), 1, AuditLog::memory());

    let short = auditor.audit_one(100).await?;
    assert_eq!(short.status, AuditStatus::Discrepancy);
    assert!(short.issues[0].contains("600000000000 vs 598000000000"));

    let exact = auditor.audit_one(99).await?;
    assert_eq!(exact.status, AuditStatus::Ok);
    assert!(exact.issues.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_single_height_range_matches_single_block_mode() -> Result<()> {
    let node = Arc::new(
        FakeNode::healthy_chain(10)
            .with_block(block(7, &[REWARD - 5], &["a", "b"]))
            .with_tx("a", &[3]),
    );
    let auditor = auditor(node, Arc::new(FakeDaemon::default()), 1, AuditLog::memory());

    let mut report = MemoryReport::default();
    let summary = auditor.audit_range(7, 7, &mut report).await?;
    assert_eq!(summary.processed, 1);
    assert_eq!(report.rows.len(), 1);

    let single = auditor.audit_one(7).await?;
    assert_eq!(report.rows[0], single);
    assert_eq!(single.missing_txs, 1);
    assert_eq!(single.total_mined, REWARD - 2);
    Ok(())
}

#[tokio::test]
async fn test_missing_block_and_reward_are_skipped() -> Result<()> {
    let node = Arc::new(FakeNode::healthy_chain(20).without_block(4));
    let daemon = FakeDaemon {
        failing: vec![9],
        ..Default::default()
    };
    let log = AuditLog::memory();
    let auditor = auditor(node, Arc::new(daemon), 1, log.clone());

    let mut report = MemoryReport::default();
    let summary = auditor.audit_range(0, 20, &mut report).await?;

    assert_eq!(summary.processed, 21);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.written, 19);
    assert!(!summary.aborted);
    let heights: Vec<u64> = report.rows.iter().map(|r| r.height).collect();
    assert!(!heights.contains(&4));
    assert!(!heights.contains(&9));
    assert_eq!(heights.first(), Some(&0));
    assert_eq!(heights.last(), Some(&20));

    let lines = log.lines();
    assert!(lines.iter().any(|l| l.contains("Skip block 4: block not obtained")));
    assert!(lines.iter().any(|l| l.contains("Skip block 9: reward for block 9 unavailable")));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_reward_timeouts_skip_height_without_row() -> Result<()> {
    let node = Arc::new(FakeNode::healthy_chain(5));
    let log = AuditLog::memory();
    let daemon = DaemonRewardFetcher::new(
        "sh".into(),
        vec!["-c".into(), "sleep 5".into(), "--".into()],
        Duration::from_millis(50),
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        },
        1_000_000_000_000,
        log.clone(),
    );
    let auditor = auditor(node, Arc::new(daemon), 1, log.clone());

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("report.csv");
    let mut report = CsvReport::create(&path)?;
    let summary = auditor.audit_range(5, 5, &mut report).await?;
    drop(report);

    assert_eq!(summary.skipped, 1);
    assert!(read_report(&path)?.is_empty());
    let exhausted = log.lines().iter().filter(|l| l.contains("exhausted")).count();
    assert_eq!(exhausted, 1);
    Ok(())
}

#[tokio::test]
async fn test_parallel_audit_records_each_height_once() -> Result<()> {
    let node = Arc::new(
        FakeNode::healthy_chain(99)
            .without_block(13)
            .with_block(block(50, &[1], &[])),
    );
    let daemon = FakeDaemon {
        delay: Duration::from_millis(2),
        ..Default::default()
    };
    let auditor = auditor(node.clone(), Arc::new(daemon), 6, AuditLog::memory());

    let mut report = MemoryReport::default();
    let summary = auditor.audit_range(0, 99, &mut report).await?;

    assert_eq!(summary.processed, 100);
    assert_eq!(summary.written, 99);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.discrepancies, 1);

    let unique: HashSet<u64> = report.rows.iter().map(|r| r.height).collect();
    assert_eq!(unique.len(), report.rows.len());
    assert_eq!(node.requested_heights(), (0..=99).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_abort_stops_between_heights() -> Result<()> {
    let flag = Arc::new(AtomicBool::new(false));
    let node = Arc::new(FakeNode::healthy_chain(30));
    let daemon = FakeDaemon {
        abort_at: Some((3, flag.clone())),
        ..Default::default()
    };
    let auditor = auditor(node.clone(), Arc::new(daemon), 1, AuditLog::memory()).with_abort(flag);

    let mut report = MemoryReport::default();
    let summary = auditor.audit_range(0, 30, &mut report).await?;

    assert!(summary.aborted);
    // Height 3 was already in progress and still completes.
    assert_eq!(summary.processed, 4);
    let heights: Vec<u64> = report.rows.iter().map(|r| r.height).collect();
    assert_eq!(heights, vec![0, 1, 2, 3]);
    assert_eq!(node.requested_heights(), vec![0, 1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_resolve_range() -> Result<()> {
    let log = AuditLog::memory();
    let auditor_with_tip = auditor(
        Arc::new(FakeNode::healthy_chain(40)),
        Arc::new(FakeDaemon::default()),
        1,
        log.clone(),
    );
    assert_eq!(auditor_with_tip.resolve_range(None, None).await?, (0, 40));
    assert_eq!(auditor_with_tip.resolve_range(Some(5), Some(1000)).await?, (5, 40));

    let no_tip = auditor(
        Arc::new(FakeNode::default()),
        Arc::new(FakeDaemon::default()),
        1,
        log.clone(),
    );
    assert!(matches!(
        no_tip.resolve_range(None, None).await,
        Err(AuditError::ChainHeightUnavailable)
    ));
    assert_eq!(no_tip.resolve_range(Some(2), Some(9)).await?, (2, 9));
    assert!(log
        .lines()
        .iter()
        .any(|l| l.contains("Failed to obtain current chain height")));
    Ok(())
}

#[tokio::test]
async fn test_single_block_failures() -> Result<()> {
    let node = Arc::new(FakeNode::healthy_chain(3).without_block(2));
    let daemon = FakeDaemon {
        failing: vec![1],
        ..Default::default()
    };
    let auditor = auditor(node, Arc::new(daemon), 1, AuditLog::memory());

    assert!(matches!(
        auditor.audit_one(2).await,
        Err(AuditError::BlockUnavailable(2))
    ));
    assert!(matches!(
        auditor.audit_one(1).await,
        Err(AuditError::RewardUnavailable { height: 1, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_csv_report_survives_partial_run() -> Result<()> {
    let flag = Arc::new(AtomicBool::new(false));
    let node = Arc::new(FakeNode::healthy_chain(30).with_block(block(2, &[0], &[])));
    let daemon = FakeDaemon {
        abort_at: Some((5, flag.clone())),
        ..Default::default()
    };
    let auditor = auditor(node, Arc::new(daemon), 1, AuditLog::memory()).with_abort(flag);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("report.csv");
    let mut report = CsvReport::create(&path)?;
    auditor.audit_range(0, 30, &mut report).await?;

    // Read while the writer is still alive: every finished row is on disk.
    let rows = read_report(&path)?;
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[2].status, "Discrepancy");
    assert_eq!(rows[3].issues, "None");
    Ok(())
}
