//! Asynchronous logger for the task engine.
//!
//! A background tokio task receives log records over a bounded mpsc channel
//! and appends them to a log file, so task bodies and the manager never block
//! on disk I/O while logging.
//!
//! ```no_run
//! use persistent_tasks::utilities::logger::init_file_logger;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (logger, task) = init_file_logger("tasks.log").await.expect("init logger");
//!     logger.info("Task manager starting up");
//!     logger.warn("Remote service unreachable, retrying on next login");
//!     drop(logger);
//!     let _ = task.await;
//! }
//! ```
//!
//! Without an installed file logger the global [`Logger`] accessor writes to
//! stderr instead.

use crate::err::Result;
use crate::global_var::{DEBUG_MODE, LOGGER_CELL};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Log level for messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug)]
enum LogSink {
    Channel(mpsc::Sender<LogRecord>),
    Stderr,
}

/// A cheap, cloneable logger handle.
#[derive(Clone, Debug)]
pub struct AsyncLogger {
    sink: LogSink,
}

impl AsyncLogger {
    /// Handle that writes formatted lines straight to stderr.
    pub fn stderr() -> Self {
        Self {
            sink: LogSink::Stderr,
        }
    }

    fn log<S: Into<String>>(&self, level: LogLevel, msg: S) {
        let record = LogRecord::new(level, msg.into());
        match &self.sink {
            LogSink::Channel(tx) => {
                if *DEBUG_MODE {
                    if let Some(line) = record.format_line() {
                        print!("{}", line);
                    }
                }
                if let Err(err) = tx.try_send(record) {
                    eprintln!("Failed to send log message: {}", err);
                }
            }
            LogSink::Stderr => {
                if let Some(line) = record.format_line() {
                    eprint!("{}", line);
                }
            }
        }
    }

    /// Request the logger task to flush and shut down.
    pub async fn shutdown(&self) {
        if let LogSink::Channel(tx) = &self.sink {
            // Ignore send error (e.g., task already closed)
            let _ = tx.send(LogRecord::Shutdown).await;
        }
    }

    pub fn trace<S: Into<String>>(&self, msg: S) {
        if *DEBUG_MODE {
            self.log(LogLevel::Trace, msg);
        }
    }
    pub fn debug<S: Into<String>>(&self, msg: S) {
        if *DEBUG_MODE {
            self.log(LogLevel::Debug, msg);
        }
    }
    pub fn info<S: Into<String>>(&self, msg: S) {
        self.log(LogLevel::Info, msg);
    }
    pub fn warn<S: Into<String>>(&self, msg: S) {
        self.log(LogLevel::Warn, msg);
    }
    pub fn error<S: Into<String>>(&self, msg: S) {
        self.log(LogLevel::Error, msg);
    }
}

#[derive(Debug)]
enum LogRecord {
    Message {
        level: LogLevel,
        msg: String,
        ts: DateTime<Utc>,
    },
    Shutdown,
}

impl LogRecord {
    fn new(level: LogLevel, msg: String) -> Self {
        Self::Message {
            level,
            msg,
            ts: Utc::now(),
        }
    }

    fn format_line(&self) -> Option<String> {
        match self {
            // Format: 2025-10-08T21:22:33.123Z [LEVEL] message\n
            LogRecord::Message { level, msg, ts } => Some(format!(
                "{} [{}] {}\n",
                ts.to_rfc3339_opts(SecondsFormat::Millis, true),
                level,
                msg
            )),
            LogRecord::Shutdown => None,
        }
    }
}

/// Initialize a file-based async logger. Returns the logger handle and the background task handle.
/// Dropping the last logger handle closes the channel and lets the task shut down.
pub async fn init_file_logger<P: AsRef<Path>>(path: P) -> Result<(AsyncLogger, JoinHandle<()>)> {
    let path_buf = path.as_ref().to_path_buf();
    if let Some(parent) = path_buf.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path_buf)
        .await?;

    let (tx, mut rx) = mpsc::channel::<LogRecord>(1024);
    let mut writer = BufWriter::new(file);

    let task = tokio::spawn(async move {
        while let Some(rec) = rx.recv().await {
            let Some(line) = rec.format_line() else {
                break;
            };
            if writer.write_all(line.as_bytes()).await.is_err() {
                // Reopen the file once and retry the line; drop it if that fails too.
                let _ = writer.flush().await;
                match OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path_buf)
                    .await
                {
                    Ok(new_file) => {
                        writer = BufWriter::new(new_file);
                        let _ = writer.write_all(line.as_bytes()).await;
                    }
                    Err(_) => {
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    }
                }
            }
        }
        let _ = writer.flush().await;
    });

    Ok((
        AsyncLogger {
            sink: LogSink::Channel(tx),
        },
        task,
    ))
}

pub(crate) struct Logger;

impl Deref for Logger {
    type Target = AsyncLogger;
    fn deref(&self) -> &Self::Target {
        LOGGER_CELL.get_or_init(AsyncLogger::stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::{LogLevel, LogRecord, init_file_logger};
    use crate::utilities::temp_dir::TmpDirGuard;
    use chrono::TimeZone;
    use std::fs;

    #[tokio::test]
    async fn file_logger_writes_lines() {
        let dir = TmpDirGuard::new("file_logger_writes_lines");
        let path = dir.join("logs").join("tasks.log");
        let (logger, task) = init_file_logger(&path).await.expect("init logger");

        logger.info("loaded 3 tasks");
        logger.warn("remote call failed");
        logger.error("record skipped");

        drop(logger);
        task.await.expect("logger task join");

        let content = fs::read_to_string(&path).expect("read log file");
        assert!(content.contains("[INFO] loaded 3 tasks"), "content=\n{}", content);
        assert!(content.contains("[WARN] remote call failed"), "content=\n{}", content);
        assert!(content.contains("[ERROR] record skipped"), "content=\n{}", content);
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn shutdown_stops_the_writer() {
        let dir = TmpDirGuard::new("logger_shutdown");
        let path = dir.join("tasks.log");
        let (logger, task) = init_file_logger(&path).await.expect("init logger");
        logger.info("before shutdown");
        logger.shutdown().await;
        task.await.expect("logger task join");

        let content = fs::read_to_string(&path).expect("read log file");
        assert!(content.contains("before shutdown"));
    }

    #[test]
    fn log_level_display_strings() {
        assert_eq!(format!("{}", LogLevel::Trace), "TRACE");
        assert_eq!(format!("{}", LogLevel::Debug), "DEBUG");
        assert_eq!(format!("{}", LogLevel::Info), "INFO");
        assert_eq!(format!("{}", LogLevel::Warn), "WARN");
        assert_eq!(format!("{}", LogLevel::Error), "ERROR");
    }

    #[test]
    fn format_line_with_fixed_timestamp() {
        let rec = LogRecord::Message {
            level: LogLevel::Warn,
            msg: "xyz".into(),
            ts: chrono::Utc.timestamp_opt(0, 0).unwrap(),
        };
        let line = rec.format_line().expect("line should exist for Message");
        assert_eq!(line, "1970-01-01T00:00:00.000Z [WARN] xyz\n");
        assert!(LogRecord::Shutdown.format_line().is_none());
    }
}
