use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};
use url::Url;

use crate::error::MonitorError;
use crate::overlay::ScannerProfile;

pub const SERVICE_URL_ENV: &str = "INTEGRITY_MONITOR_SERVICE_URL";

/// One frame per millisecond; the sampling interval must stay non-zero.
pub const MAX_FRAME_RATE: u32 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// Base websocket endpoint; the session id is appended as last segment.
    pub service_url: String,
    /// Target frames per second.
    pub frame_rate: u32,
    pub jpeg_quality: u8,
    pub capture_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub alert_threshold: f64,
    pub overlay_scan_interval_ms: u64,
    pub mutation_debounce_ms: u64,
    pub max_retained_verdicts: usize,
    pub max_retained_detections: usize,
    /// Frames allowed to wait for the socket writer before new ones are dropped.
    pub outbound_queue_depth: usize,
    /// Page URL reported with every outbound alert event.
    pub source_url: String,
    pub overlay: ScannerProfile,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            service_url: "ws://localhost:8000/ws/detect".into(),
            frame_rate: 5,
            jpeg_quality: 80,
            capture_timeout_ms: 1_000,
            reconnect_delay_ms: 5_000,
            alert_threshold: 0.7,
            overlay_scan_interval_ms: 5_000,
            mutation_debounce_ms: 200,
            max_retained_verdicts: 3_000,
            max_retained_detections: 1_000,
            outbound_queue_depth: 2,
            source_url: String::new(),
            overlay: ScannerProfile::default(),
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.frame_rate == 0 || self.frame_rate > MAX_FRAME_RATE {
            return Err(MonitorError::Config(format!(
                "frameRate must be within 1..={MAX_FRAME_RATE}"
            )));
        }
        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err(MonitorError::Config(format!(
                "alertThreshold {} is outside [0, 1]",
                self.alert_threshold
            )));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(MonitorError::Config("jpegQuality must be within 1..=100".into()));
        }
        if self.outbound_queue_depth == 0 {
            return Err(MonitorError::Config(
                "outboundQueueDepth must be greater than zero".into(),
            ));
        }
        if self.overlay.min_opacity > self.overlay.max_opacity {
            return Err(MonitorError::Config(
                "overlay opacity band is inverted".into(),
            ));
        }
        self.service_endpoint()?;
        Ok(())
    }

    pub fn service_endpoint(&self) -> Result<Url, MonitorError> {
        let url = Url::parse(&self.service_url)
            .map_err(|err| MonitorError::Config(format!("invalid serviceUrl: {err}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(MonitorError::Config(format!(
                "serviceUrl must use ws or wss, got {other}"
            ))),
        }
    }

    /// Session-scoped connection URI: `<serviceUrl>/<session id>`.
    pub fn session_endpoint(&self, session_id: &str) -> Result<Url, MonitorError> {
        let mut url = self.service_endpoint()?;
        url.path_segments_mut()
            .map_err(|_| MonitorError::Config("serviceUrl cannot be a base".into()))?
            .pop_if_empty()
            .push(session_id);
        Ok(url)
    }

    /// Never shorter than one millisecond.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
            .max(Duration::from_millis(1))
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn overlay_scan_interval(&self) -> Duration {
        Duration::from_millis(self.overlay_scan_interval_ms.max(1))
    }

    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(SERVICE_URL_ENV) {
            if !url.trim().is_empty() {
                self.service_url = url.trim().to_string();
            }
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings in {}: {err}",
                    path.display()
                );
                MonitorSettings::default()
            })
        } else {
            MonitorSettings::default()
        };
        data.apply_env_overrides();
        data.validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> MonitorSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: MonitorSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
