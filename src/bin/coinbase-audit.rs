//! coinbase-audit CLI tool
//!
//! Audits a single block, a range of blocks, or re-checks an earlier report.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use coinbase_audit::config::{parse_workers, rpc_url_for_server};
use coinbase_audit::report::read_report;
use coinbase_audit::auditor::watch_interrupts;
use coinbase_audit::{auditor_from_config, verify, AuditConfig, AuditLog, CsvReport};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "coinbase-audit")]
#[command(about = "Reconcile every block's coinbase against the daemon's reported reward")]
#[command(version)]
struct Cli {
    /// `key = value` configuration file
    #[arg(long, env = "AUDIT_CONFIG", default_value = "audit.cfg")]
    config: PathBuf,
    /// RPC server as host or host:port
    #[arg(long, env = "MONERO_RPC_SERVER")]
    server: Option<String>,
    /// Full JSON-RPC URL (ignored when --server is given)
    #[arg(long, env = "MONERO_RPC_URL")]
    rpc_url: Option<String>,
    /// Daemon binary used for `print_block`
    #[arg(long, env = "MONEROD_PATH")]
    daemon: Option<PathBuf>,
    /// Directory for the report and the operational log
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Concurrent blocks in flight: a number or `max`
    #[arg(long)]
    threads: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit one block and print the result (no report is written)
    Block {
        height: u64,
    },
    /// Audit a range of blocks; defaults to genesis through the chain tip
    Range {
        #[arg(requires = "end")]
        start: Option<u64>,
        end: Option<u64>,
    },
    /// Re-audit every row of an existing report
    Check {
        report: PathBuf,
    },
}

impl Cli {
    fn config(&self) -> Result<AuditConfig> {
        let mut config = AuditConfig::load(&self.config)?;
        if let Some(server) = &self.server {
            config.rpc_url = rpc_url_for_server(server);
        } else if let Some(url) = &self.rpc_url {
            config.rpc_url = url.clone();
        }
        if let Some(daemon) = &self.daemon {
            config.daemon_path = daemon.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(threads) = &self.threads {
            config.workers = parse_workers(threads)?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = match cli.config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let log = match open_log(&config) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    log.info("coinbase-audit started");

    match run(cli.command, &config, &log).await {
        Ok(code) => code,
        Err(e) => {
            log.error(format!("Critical error: {:#}", e));
            eprintln!("❌ Critical error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn stamp() -> String {
    Local::now().format("%Y-%m-%d-%H-%M-%S").to_string()
}

fn open_log(config: &AuditConfig) -> Result<AuditLog> {
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;
    AuditLog::open(&config.output_dir.join(format!("audit_log_{}.txt", stamp())))
}

async fn run(command: Commands, config: &AuditConfig, log: &AuditLog) -> Result<ExitCode> {
    let auditor = auditor_from_config(config, log.clone())?;

    match command {
        Commands::Block { height } => match auditor.audit_one(height).await {
            Ok(result) => {
                println!("\n{}", result);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("❌ Audit failed for block {}: {}", height, e);
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::Range { start, end } => {
            let (start, end) = match auditor.resolve_range(start, end).await {
                Ok(range) => range,
                Err(e) => {
                    eprintln!("❌ {}", e);
                    return Ok(ExitCode::FAILURE);
                }
            };

            let abort = auditor.abort_handle();
            let abort_log = log.clone();
            tokio::spawn(async move {
                if watch_interrupts(tokio::signal::ctrl_c, abort, abort_log).await {
                    eprintln!("❌ Interrupted");
                    std::process::exit(130);
                }
            });

            let path = config
                .output_dir
                .join(format!("audit_report_{}.csv", stamp()));
            let mut report = CsvReport::create(&path)?;

            println!("🚀 Auditing blocks {} to {}", start, end);
            println!("   RPC: {}", config.rpc_url);
            println!("   Workers: {}", config.workers);
            println!("   Report: {}", report.path().display());

            let summary = auditor.audit_range(start, end, &mut report).await?;

            println!("\n📊 Audit summary:");
            println!("   Blocks processed: {}", summary.processed);
            println!("   Rows written: {}", summary.written);
            println!("   Discrepancies: {}", summary.discrepancies);
            println!("   Skipped: {}", summary.skipped);
            if summary.aborted {
                println!("   ⚠️  Aborted before the end of the range");
            }
            println!("✅ Results saved to {}", report.path().display());
            log.info(format!("Results saved to {}", report.path().display()));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { report } => {
            let rows = read_report(&report)?;
            log.info(format!(
                "Checking {} rows of {}",
                rows.len(),
                report.display()
            ));
            let (_, summary) = verify::check_report(&auditor, &rows).await;
            Ok(if summary.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
