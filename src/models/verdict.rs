use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One encoded still taken from the video surface. Consumed by the channel
/// exactly once and never retained.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub payload: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Remote judgment about a single sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictResult {
    pub is_anomalous: bool,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub method_scores: BTreeMap<String, f64>,
    pub received_at: DateTime<Utc>,
}

/// Statistics derived from the retained verdict sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_frames: usize,
    pub suspicious_frames: usize,
    pub average_confidence: f64,
    pub max_confidence: f64,
    pub method_averages: BTreeMap<String, f64>,
}
