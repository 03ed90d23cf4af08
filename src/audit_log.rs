//! Operational log
//!
//! Append-only, timestamped trace of every remote call, daemon invocation,
//! retry, skip and per-height outcome. The handle is created once at startup
//! and passed to every component that records something.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn facade(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

enum Target {
    Writer(Box<dyn Write + Send>),
    Memory(Vec<String>),
}

/// Cloneable handle to the operational log
#[derive(Clone)]
pub struct AuditLog {
    target: Arc<Mutex<Target>>,
}

impl AuditLog {
    /// Open (or create) a log file in append mode
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        Ok(Self::from_writer(Box::new(file)))
    }

    /// Log into an arbitrary writer
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Writer(writer))),
        }
    }

    /// In-memory log, inspectable through [`AuditLog::lines`]
    pub fn memory() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Memory(Vec::new()))),
        }
    }

    /// Lines captured by a [`AuditLog::memory`] log (empty for writer-backed logs)
    pub fn lines(&self) -> Vec<String> {
        match &*self.lock() {
            Target::Memory(lines) => lines.clone(),
            Target::Writer(_) => Vec::new(),
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Error, message.as_ref());
    }

    /// Separator written after the final outcome of a height
    pub fn block_end(&self) {
        self.append_raw("-----");
    }

    /// Append one timestamped line and mirror it to the `log` facade
    pub fn write(&self, level: LogLevel, message: &str) {
        log::log!(target: "coinbase_audit", level.facade(), "{}", message);
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        self.append_raw(&format!("[{}] [{}] {}", stamp, level.tag(), message));
    }

    fn append_raw(&self, line: &str) {
        match &mut *self.lock() {
            Target::Writer(writer) => {
                // A failing log write must never abort the audit itself.
                if writeln!(writer, "{}", line).and_then(|_| writer.flush()).is_err() {
                    eprintln!("⚠️  Failed to write operational log line: {}", line);
                }
            }
            Target::Memory(lines) => lines.push(line.to_string()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Target> {
        // A poisoned lock only means another writer panicked mid-line.
        self.target.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}
