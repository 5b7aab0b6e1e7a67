//! Folds verdicts from the detection channel and overlay scan snapshots into
//! one shared, mutex-guarded state and raises edge-triggered alerts.
//!
//! Alerts fire on transitions only: a deepfake alert when a verdict crosses
//! the threshold after one that did not, an overlay alert when the number of
//! unique flagged elements grows, a service alert when the service sends an
//! alert payload not seen before.

mod stats;

pub use stats::{compute_stats, is_suspicious};

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::alerts::AlertDispatcher;
use crate::channel::ServiceSummary;
use crate::models::{Alert, AggregateStats, OverlaySummary, VerdictResult};

const MAX_RETAINED_ALERTS: usize = 500;

/// Point-in-time copy of everything the aggregator knows.
#[derive(Debug, Clone)]
pub struct AggregatorReport {
    pub stats: AggregateStats,
    pub overlay: OverlaySummary,
    pub alerts: Vec<Alert>,
    pub evicted_verdicts: u64,
    pub service_summary: Option<ServiceSummary>,
}

#[derive(Clone)]
pub struct ResultAggregator {
    inner: Arc<Mutex<AggregatorState>>,
}

struct AggregatorState {
    alert_threshold: f64,
    max_verdicts: usize,
    verdicts: VecDeque<VerdictResult>,
    evicted_verdicts: u64,
    above_threshold: bool,
    overlay: OverlaySummary,
    alerts: VecDeque<Alert>,
    service_alerts: Vec<Value>,
    service_summary: Option<ServiceSummary>,
    dispatcher: Option<AlertDispatcher>,
}

impl AggregatorState {
    fn raise(&mut self, alert: Alert) -> Alert {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.dispatch(alert.clone());
        }
        self.alerts.push_back(alert.clone());
        if self.alerts.len() > MAX_RETAINED_ALERTS {
            self.alerts.pop_front();
        }
        alert
    }
}

impl ResultAggregator {
    pub fn new(alert_threshold: f64, max_verdicts: usize, dispatcher: Option<AlertDispatcher>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AggregatorState {
                alert_threshold,
                max_verdicts: max_verdicts.max(1),
                verdicts: VecDeque::new(),
                evicted_verdicts: 0,
                above_threshold: false,
                overlay: OverlaySummary::empty(Utc::now()),
                alerts: VecDeque::new(),
                service_alerts: Vec::new(),
                service_summary: None,
                dispatcher,
            })),
        }
    }

    /// Appends in arrival order. Returns the alert when this verdict crosses
    /// the threshold.
    pub async fn record_verdict(&self, result: VerdictResult) -> Option<Alert> {
        let mut state = self.inner.lock().await;

        let above = result.confidence > state.alert_threshold;
        let crossed = above && !state.above_threshold;
        state.above_threshold = above;
        let confidence = result.confidence;
        let received_at = result.received_at;

        state.verdicts.push_back(result);
        while state.verdicts.len() > state.max_verdicts {
            state.verdicts.pop_front();
            state.evicted_verdicts += 1;
        }

        if crossed {
            log::info!("deepfake threshold crossed at confidence {confidence:.3}");
            Some(state.raise(Alert::deepfake(confidence, received_at)))
        } else {
            None
        }
    }

    /// Stores the latest scan snapshot. Returns an alert when new elements
    /// were flagged since the previous snapshot.
    pub async fn record_overlay_scan(&self, summary: OverlaySummary) -> Option<Alert> {
        let mut state = self.inner.lock().await;

        let grew = summary.unique_elements > state.overlay.unique_elements;
        let unique = summary.unique_elements;
        let timestamp = summary.timestamp;
        state.overlay = summary;

        if grew {
            Some(state.raise(Alert::overlay(unique, timestamp)))
        } else {
            None
        }
    }

    /// The service repeats its alert after every frame once raised; only
    /// payloads not seen before are surfaced.
    pub async fn record_service_alert(&self, payload: Value) -> Option<Alert> {
        let mut state = self.inner.lock().await;
        if state.service_alerts.contains(&payload) {
            return None;
        }
        state.service_alerts.push(payload.clone());
        Some(state.raise(Alert::service(payload, Utc::now())))
    }

    pub async fn record_service_summary(&self, summary: ServiceSummary) {
        self.inner.lock().await.service_summary = Some(summary);
    }

    pub async fn stats(&self) -> AggregateStats {
        let state = self.inner.lock().await;
        compute_stats(&state.verdicts, state.alert_threshold)
    }

    pub async fn verdicts(&self) -> Vec<VerdictResult> {
        self.inner.lock().await.verdicts.iter().cloned().collect()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.inner.lock().await.alerts.iter().cloned().collect()
    }

    pub async fn report(&self) -> AggregatorReport {
        let state = self.inner.lock().await;
        AggregatorReport {
            stats: compute_stats(&state.verdicts, state.alert_threshold),
            overlay: state.overlay.clone(),
            alerts: state.alerts.iter().cloned().collect(),
            evicted_verdicts: state.evicted_verdicts,
            service_summary: state.service_summary.clone(),
        }
    }
}
