//! Diagnostics for a measurement run.
//!
//! The report and histogram are written straight to stdout by `main` and
//! never pass through here; everything logged goes to stderr, plus the
//! optional log file and syslog. Nothing is logged from inside a sample
//! block, so the cost of a log call only ever lands between blocks.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Args, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record};

type SyslogLogger = syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Diagnostic level; info adds the counter name and run summary (default: warn)
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Also append diagnostics to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Also send diagnostics to syslog
    #[arg(long)]
    pub syslog: bool,
}

/// `[tickjitter] <level>: <message>`
fn format_line(level: Level, args: &std::fmt::Arguments) -> String {
    let tag = match level {
        Level::Error => "error",
        Level::Warn => "warning",
        Level::Info => "info",
        Level::Debug | Level::Trace => "debug",
    };
    format!("[tickjitter] {}: {}", tag, args)
}

struct TickjitterLogger {
    level: LevelFilter,
    log_file: Option<Mutex<File>>,
    syslog: Option<Mutex<SyslogLogger>>,
}

impl TickjitterLogger {
    fn to_syslog(&self, level: Level, text: &str) {
        let Some(ref logger) = self.syslog else {
            return;
        };
        if let Ok(mut l) = logger.lock() {
            let _ = match level {
                Level::Error => l.err(text),
                Level::Warn => l.warning(text),
                Level::Info => l.info(text),
                Level::Debug | Level::Trace => l.debug(text),
            };
        }
    }
}

impl Log for TickjitterLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record.level(), record.args());
        let _ = writeln!(io::stderr().lock(), "{}", line);

        if let Some(ref file) = self.log_file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{}", line);
            }
        }

        // syslog adds its own tag
        self.to_syslog(record.level(), &record.args().to_string());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
        if let Some(ref file) = self.log_file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

/// Install the logger. A log file or syslog that cannot be opened is
/// reported as a warning once logging is up; the run goes on without it.
pub fn init(args: &LogArgs) {
    let level = LevelFilter::from(args.log_level.unwrap_or(LogLevel::Warn));
    let mut unavailable = Vec::new();

    let log_file = args.log_file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(Mutex::new(f)),
            Err(e) => {
                unavailable.push(format!("log file {}: {}", path.display(), e));
                None
            }
        }
    });

    let syslog = if args.syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: "tickjitter".into(),
            pid: std::process::id(),
        };
        match syslog::unix(formatter) {
            Ok(l) => Some(Mutex::new(l)),
            Err(e) => {
                unavailable.push(format!("syslog: {}", e));
                None
            }
        }
    } else {
        None
    };

    let logger = TickjitterLogger {
        level,
        log_file,
        syslog,
    };
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level);
    }

    for what in unavailable {
        log::warn!("{} unavailable; logging to stderr only", what);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filters() {
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::Error);
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::Warn);
        assert_eq!(LevelFilter::from(LogLevel::Info), LevelFilter::Info);
        assert_eq!(LevelFilter::from(LogLevel::Debug), LevelFilter::Debug);
    }

    #[test]
    fn test_format_line() {
        let line = format_line(Level::Warn, &format_args!("counter ran backwards 3 times"));
        assert_eq!(line, "[tickjitter] warning: counter ran backwards 3 times");
        let line = format_line(Level::Trace, &format_args!("x"));
        assert_eq!(line, "[tickjitter] debug: x");
    }

    #[test]
    fn test_enabled_respects_level() {
        let logger = TickjitterLogger {
            level: LevelFilter::Warn,
            log_file: None,
            syslog: None,
        };
        let meta = |level| Metadata::builder().level(level).build();
        assert!(logger.enabled(&meta(Level::Error)));
        assert!(logger.enabled(&meta(Level::Warn)));
        assert!(!logger.enabled(&meta(Level::Info)));
    }

    #[test]
    fn test_log_file_receives_lines() {
        let path = std::env::temp_dir().join("tickjitter_test_log_file.log");
        let _ = std::fs::remove_file(&path);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        let logger = TickjitterLogger {
            level: LevelFilter::Info,
            log_file: Some(Mutex::new(file)),
            syslog: None,
        };
        logger.log(
            &Record::builder()
                .args(format_args!("sampled 3 blocks"))
                .level(Level::Info)
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("hidden"))
                .level(Level::Debug)
                .build(),
        );
        logger.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "[tickjitter] info: sampled 3 blocks\n");
        let _ = std::fs::remove_file(&path);
    }
}
