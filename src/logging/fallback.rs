//! Audit logging where no system log is wired up

use super::AuditEvent;

pub struct SystemLogger;

impl SystemLogger {
    pub fn new() -> Self {
        SystemLogger
    }

    pub fn log(&self, event: AuditEvent) {
        super::trace_event(event.level, &event.to_syslog_format());
    }
}

impl Default for SystemLogger {
    fn default() -> Self {
        Self::new()
    }
}
