use std::sync::OnceLock;

use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use serde::Serialize;
use tokio::sync::broadcast;

static LOGGER: OnceLock<ScannerLogger> = OnceLock::new();

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Writes records to stderr and mirrors them to an optional channel, so a
/// front end can show a live log pane.
pub struct ScannerLogger {
    level: Level,
    sink: Option<broadcast::Sender<LogMessage>>,
}

impl ScannerLogger {
    pub fn new(level: Level, sink: Option<broadcast::Sender<LogMessage>>) -> Self {
        Self { level, sink }
    }

    /// Installs the logger process-wide.
    pub fn init(
        level: Level,
        sink: Option<broadcast::Sender<LogMessage>>,
    ) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| ScannerLogger::new(level, sink));
        log::set_logger(logger).map(|()| log::set_max_level(level_filter(logger.level)))
    }

    fn emit_log(&self, record: &Record) {
        let Some(sink) = &self.sink else {
            return;
        };
        let log_message = LogMessage {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        };
        // No receivers is fine: nobody is watching the log pane.
        let _ = sink.send(log_message);
    }
}

fn level_filter(level: Level) -> LevelFilter {
    match level {
        Level::Error => LevelFilter::Error,
        Level::Warn => LevelFilter::Warn,
        Level::Info => LevelFilter::Info,
        Level::Debug => LevelFilter::Debug,
        Level::Trace => LevelFilter::Trace,
    }
}

impl log::Log for ScannerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
            self.emit_log(record);
        }
    }

    fn flush(&self) {}
}
