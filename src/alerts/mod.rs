//! Delivery of alerts to the external control surface.
//!
//! Dispatch is fire-and-forget: alerts are queued to a dedicated worker
//! thread so a slow or blocking surface never stalls the aggregator, and a
//! failed delivery is logged and dropped.

mod surfaces;

pub use surfaces::{LogNotifier, StdoutControlSurface};

use std::{
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::models::Alert;

const ENABLE_LOGS: bool = true;

use crate::log_error;

pub const INTEGRITY_ALERT_EVENT: &str = "INTEGRITY_ALERT";

/// Outbound event pushed to the control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityAlertEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub alert: Alert,
    pub session_id: String,
    pub source_url: String,
}

pub trait ControlSurface: Send + Sync {
    fn deliver(&self, event: &IntegrityAlertEvent) -> Result<(), MonitorError>;
}

/// User-facing notification channel (desktop toast, badge, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> Result<(), MonitorError>;
}

enum DispatchCommand {
    Deliver(Alert),
    Shutdown,
}

struct DispatcherInner {
    sender: mpsc::Sender<DispatchCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DispatcherInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DispatchCommand::Shutdown) {
                log_error!("Failed to send shutdown to alert dispatcher: {err}");
            }
            if let Err(join_err) = handle.join() {
                log_error!("Failed to join alert dispatcher: {join_err:?}");
            }
        }
    }
}

#[derive(Clone)]
pub struct AlertDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatchTarget {
    session_id: String,
    source_url: String,
    alert_threshold: f64,
    surface: Arc<dyn ControlSurface>,
    notifier: Arc<dyn Notifier>,
}

impl AlertDispatcher {
    pub fn new(
        session_id: impl Into<String>,
        source_url: impl Into<String>,
        alert_threshold: f64,
        surface: Arc<dyn ControlSurface>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let target = DispatchTarget {
            session_id: session_id.into(),
            source_url: source_url.into(),
            alert_threshold,
            surface,
            notifier,
        };
        let (sender, receiver) = mpsc::channel::<DispatchCommand>();

        let worker = thread::Builder::new()
            .name("alert-dispatch".into())
            .spawn(move || {
                while let Ok(command) = receiver.recv() {
                    match command {
                        DispatchCommand::Deliver(alert) => deliver(&target, alert),
                        DispatchCommand::Shutdown => break,
                    }
                }
            })
            .context("failed to spawn alert dispatcher thread")?;

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                sender,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    /// Queues the alert and returns immediately.
    pub fn dispatch(&self, alert: Alert) {
        if self.inner.sender.send(DispatchCommand::Deliver(alert)).is_err() {
            log_error!("alert dispatcher is gone; dropping alert");
        }
    }
}

fn deliver(target: &DispatchTarget, alert: Alert) {
    let notify_user = alert
        .confidence
        .is_some_and(|confidence| confidence > target.alert_threshold);

    if notify_user {
        let body = notification_body(&alert);
        if let Err(err) = target.notifier.notify("Integrity alert", &body) {
            log_error!("notification failed: {err}");
        }
    }

    let event = IntegrityAlertEvent {
        event_type: INTEGRITY_ALERT_EVENT.to_string(),
        alert,
        session_id: target.session_id.clone(),
        source_url: target.source_url.clone(),
    };
    if let Err(err) = target.surface.deliver(&event) {
        log_error!("alert delivery to control surface failed: {err}");
    }
}

fn notification_body(alert: &Alert) -> String {
    match alert.confidence {
        Some(confidence) => format!(
            "Possible manipulated video detected ({:.0}% confidence)",
            confidence * 100.0
        ),
        None => "Suspicious activity detected".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<IntegrityAlertEvent>>,
        notifications: Mutex<Vec<String>>,
    }

    impl ControlSurface for Recording {
        fn deliver(&self, event: &IntegrityAlertEvent) -> Result<(), MonitorError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    impl Notifier for Recording {
        fn notify(&self, _title: &str, body: &str) -> Result<(), MonitorError> {
            self.notifications.lock().unwrap().push(body.to_string());
            Ok(())
        }
    }

    struct Failing;

    impl ControlSurface for Failing {
        fn deliver(&self, _event: &IntegrityAlertEvent) -> Result<(), MonitorError> {
            Err(MonitorError::dispatch("surface closed"))
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn delivers_event_and_notifies_above_threshold() {
        let recording = Arc::new(Recording::default());
        let dispatcher = AlertDispatcher::new(
            "session_1_abc",
            "https://meet.example.test/room",
            0.7,
            recording.clone(),
            recording.clone(),
        )
        .expect("dispatcher should start");

        dispatcher.dispatch(Alert::deepfake(0.9, Utc::now()));
        dispatcher.dispatch(Alert::overlay(1, Utc::now()));

        assert!(wait_for(|| recording.events.lock().unwrap().len() == 2));
        let events = recording.events.lock().unwrap().clone();
        assert_eq!(events[0].event_type, "INTEGRITY_ALERT");
        assert_eq!(events[0].session_id, "session_1_abc");
        assert_eq!(events[0].source_url, "https://meet.example.test/room");
        // Overlay alerts carry no confidence, so only the deepfake one notifies.
        assert_eq!(recording.notifications.lock().unwrap().len(), 1);
    }

    #[test]
    fn delivery_failures_do_not_stop_the_worker() {
        let recording = Arc::new(Recording::default());
        let dispatcher =
            AlertDispatcher::new("s", "", 0.7, Arc::new(Failing), recording.clone())
                .expect("dispatcher should start");

        dispatcher.dispatch(Alert::deepfake(0.8, Utc::now()));
        dispatcher.dispatch(Alert::deepfake(0.95, Utc::now()));

        assert!(wait_for(|| recording.notifications.lock().unwrap().len() == 2));
    }

    #[test]
    fn serialized_event_uses_wire_names() {
        let event = IntegrityAlertEvent {
            event_type: INTEGRITY_ALERT_EVENT.to_string(),
            alert: Alert::overlay(3, Utc::now()),
            session_id: "s".into(),
            source_url: "u".into(),
        };
        let value = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(value["type"], "INTEGRITY_ALERT");
        assert_eq!(value["sessionId"], "s");
        assert_eq!(value["sourceUrl"], "u");
        assert_eq!(value["alert"]["kind"], "overlayDetected");
        assert_eq!(value["alert"]["detectionCount"], 3);
    }
}
