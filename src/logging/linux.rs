//! Linux audit sink: syslog/journald under the `ajan` tag

use super::{AuditEvent, LogLevel};
use std::sync::Mutex;
use syslog::{Facility, Formatter3164, Logger, LoggerBackend};

type Syslog = Logger<LoggerBackend, Formatter3164>;

pub struct SystemLogger {
    /// `None` when no socket was found or a write failed
    sink: Mutex<Option<Syslog>>,
}

fn connect() -> Option<Syslog> {
    let formatter = Formatter3164 {
        facility: Facility::LOG_LOCAL0,
        hostname: None,
        process: "ajan".into(),
        pid: std::process::id(),
    };

    syslog::unix(formatter)
        .map_err(|e| tracing::debug!("syslog unavailable, audit goes to tracing only: {}", e))
        .ok()
}

fn write(sink: &mut Syslog, level: LogLevel, line: &str) -> syslog::Result<()> {
    match level {
        LogLevel::Info => sink.info(line),
        LogLevel::Warning => sink.warning(line),
        LogLevel::Error => sink.err(line),
    }
}

impl SystemLogger {
    pub fn new() -> Self {
        SystemLogger {
            sink: Mutex::new(connect()),
        }
    }

    pub fn log(&self, event: AuditEvent) {
        let line = event.to_syslog_format();

        if let Ok(mut guard) = self.sink.lock() {
            let failed = match guard.as_mut() {
                Some(sink) => write(sink, event.level, &line).err(),
                None => None,
            };
            // A broken socket stays broken; stop paying for it
            if let Some(e) = failed {
                tracing::debug!("syslog write failed, disabling: {}", e);
                *guard = None;
            }
        }

        super::trace_event(event.level, &line);
    }
}

impl Default for SystemLogger {
    fn default() -> Self {
        Self::new()
    }
}
