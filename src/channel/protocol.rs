//! JSON wire format spoken with the detection service.
//!
//! Outbound: `{"type":"frame","data":<base64 jpeg>,"timestamp":<epoch ms>}`
//! and `{"type":"end_session"}`.
//! Inbound: `{"type":"detection_result","result":{..},"session_summary":{..}}`
//! and `{"type":"alert","alert":{..}}`.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MonitorError;
use crate::models::{SampledFrame, VerdictResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Frame { data: String, timestamp: i64 },
    EndSession,
}

impl OutboundMessage {
    pub fn frame(frame: &SampledFrame) -> Self {
        OutboundMessage::Frame {
            data: BASE64.encode(&frame.payload),
            timestamp: frame.captured_at.timestamp_millis(),
        }
    }

    pub fn to_text(&self) -> Result<String, MonitorError> {
        serde_json::to_string(self)
            .map_err(|err| MonitorError::protocol(format!("outbound encoding failed: {err}")))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    DetectionResult {
        result: WireVerdict,
        #[serde(default)]
        session_summary: Option<ServiceSummary>,
    },
    Alert {
        alert: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WireVerdict {
    pub is_deepfake: bool,
    pub confidence: f64,
    /// Non-numeric entries are ignored.
    #[serde(default)]
    pub methods: BTreeMap<String, Value>,
}

impl WireVerdict {
    pub fn into_verdict(self, received_at: DateTime<Utc>) -> Result<VerdictResult, MonitorError> {
        if !self.confidence.is_finite() {
            return Err(MonitorError::protocol("confidence is not a finite number"));
        }

        let method_scores = self
            .methods
            .into_iter()
            .filter_map(|(method, score)| score.as_f64().map(|score| (method, score)))
            .collect();

        Ok(VerdictResult {
            is_anomalous: self.is_deepfake,
            confidence: self.confidence.clamp(0.0, 1.0),
            method_scores,
            received_at,
        })
    }
}

/// Service-side running summary attached to each detection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all(serialize = "camelCase"), default)]
pub struct ServiceSummary {
    pub session_id: String,
    /// Seconds since the service opened the session.
    pub duration: f64,
    pub frame_count: u64,
    pub overall_confidence: f64,
    pub alerts: Vec<Value>,
    pub is_active: bool,
}

pub fn parse_inbound(text: &str) -> Result<InboundMessage, MonitorError> {
    serde_json::from_str(text)
        .map_err(|err| MonitorError::protocol(format!("malformed inbound message: {err}")))
}
