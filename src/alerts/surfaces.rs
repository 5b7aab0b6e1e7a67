use std::io::Write;

use crate::error::MonitorError;

use super::{ControlSurface, IntegrityAlertEvent, Notifier};

/// Writes each event as one JSON line on stdout.
#[derive(Debug, Default)]
pub struct StdoutControlSurface;

impl ControlSurface for StdoutControlSurface {
    fn deliver(&self, event: &IntegrityAlertEvent) -> Result<(), MonitorError> {
        let line = serde_json::to_string(event)
            .map_err(|err| MonitorError::dispatch(format!("event encoding failed: {err}")))?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")
            .and_then(|_| stdout.flush())
            .map_err(|err| MonitorError::dispatch(format!("stdout write failed: {err}")))
    }
}

/// Notification sink for headless runs.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<(), MonitorError> {
        log::warn!("[notification] {title}: {body}");
        Ok(())
    }
}
