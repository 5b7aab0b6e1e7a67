use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    DeepfakeDetected,
    OverlayDetected,
    /// Alert raised by the detection service itself.
    ServiceAlert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn deepfake(confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: AlertKind::DeepfakeDetected,
            confidence: Some(confidence),
            detection_count: None,
            payload: None,
            timestamp,
        }
    }

    pub fn overlay(detection_count: usize, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: AlertKind::OverlayDetected,
            confidence: None,
            detection_count: Some(detection_count),
            payload: None,
            timestamp,
        }
    }

    /// Wraps a service-side alert; its `confidence` field is lifted when
    /// present so notification thresholds apply uniformly.
    pub fn service(payload: Value, timestamp: DateTime<Utc>) -> Self {
        let confidence = payload.get("confidence").and_then(Value::as_f64);
        Self {
            id: Uuid::new_v4(),
            kind: AlertKind::ServiceAlert,
            confidence,
            detection_count: None,
            payload: Some(payload),
            timestamp,
        }
    }
}
