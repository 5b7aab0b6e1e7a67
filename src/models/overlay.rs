use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum OverlayReason {
    ZIndex,
    Opacity,
    Size,
    SuspiciousToken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayDetection {
    /// Stable identity of the element inside the host tree.
    pub element_key: String,
    /// Human readable `tag#id.class` descriptor.
    pub element_descriptor: String,
    /// Strongest signal that flagged the element.
    pub reason: OverlayReason,
    /// Every signal that held, strongest first. `Size` shows up here as the
    /// satisfied gate and is never the primary reason.
    pub signals: Vec<OverlayReason>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySummary {
    pub total_detections: usize,
    pub unique_elements: usize,
    pub detections: Vec<OverlayDetection>,
    pub timestamp: DateTime<Utc>,
}

impl OverlaySummary {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            total_detections: 0,
            unique_elements: 0,
            detections: Vec::new(),
            timestamp: now,
        }
    }
}
