use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    aggregator::ResultAggregator,
    alerts::{AlertDispatcher, ControlSurface, Notifier},
    channel::{ChannelDiagnostics, Connector, DetectionChannel, FrameSender, ServiceSummary},
    models::{generate_session_id, AggregateStats, Alert, OverlaySummary, Session, SessionState},
    overlay::{
        observer::ObserverConfig, ElementTree, MutationSignal, OverlayAnomalyScanner,
        OverlayObserver,
    },
    sensing::{FrameSampler, SamplerController, VideoSurface},
    settings::MonitorSettings,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// External collaborators the controller wires together.
pub struct Collaborators {
    pub surface: Arc<dyn VideoSurface>,
    pub elements: Arc<dyn ElementTree>,
    pub connector: Arc<dyn Connector>,
    pub control_surface: Arc<dyn ControlSurface>,
    pub notifier: Arc<dyn Notifier>,
}

/// Reply to `GET_RESULTS`.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSnapshot {
    pub session_id: String,
    pub state: SessionState,
    pub is_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub stats: AggregateStats,
    pub overlay: OverlaySummary,
    pub alerts: Vec<Alert>,
    pub evicted_verdicts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_summary: Option<ServiceSummary>,
    pub channel: ChannelDiagnostics,
}

#[derive(Clone)]
pub struct SessionController {
    session_id: String,
    settings: Arc<MonitorSettings>,
    session: Arc<Mutex<Session>>,
    /// Serializes start/stop so a slow close can't interleave with a restart.
    lifecycle: Arc<Mutex<()>>,
    aggregator: ResultAggregator,
    channel: Arc<Mutex<DetectionChannel>>,
    frames: FrameSender,
    sampler: Arc<Mutex<SamplerController>>,
    scanner: Arc<Mutex<OverlayAnomalyScanner>>,
    overlay: Arc<Mutex<OverlayObserver>>,
    elements: Arc<dyn ElementTree>,
    mutations: MutationSignal,
}

impl SessionController {
    /// Builds every component for one session id and arms the overlay
    /// observer. Capture does not begin until [`start`](Self::start).
    pub async fn launch(settings: MonitorSettings, collaborators: Collaborators) -> Result<Self> {
        settings.validate().context("refusing to launch with invalid settings")?;

        let session_id = generate_session_id(Utc::now());
        let dispatcher = AlertDispatcher::new(
            session_id.clone(),
            settings.source_url.clone(),
            settings.alert_threshold,
            collaborators.control_surface,
            collaborators.notifier,
        )?;
        let aggregator = ResultAggregator::new(
            settings.alert_threshold,
            settings.max_retained_verdicts,
            Some(dispatcher),
        );

        let channel = DetectionChannel::new(
            collaborators.connector,
            aggregator.clone(),
            settings.reconnect_delay(),
            settings.outbound_queue_depth,
        );
        let frames = channel.frame_sender();

        let sampler = SamplerController::new(
            FrameSampler::new(collaborators.surface, settings.jpeg_quality),
            settings.frame_interval(),
            settings.capture_timeout(),
        );
        let scanner = OverlayAnomalyScanner::new(
            settings.overlay.clone(),
            settings.max_retained_detections,
        );

        let controller = Self {
            session: Arc::new(Mutex::new(Session::new(session_id.clone()))),
            session_id,
            settings: Arc::new(settings),
            lifecycle: Arc::new(Mutex::new(())),
            aggregator,
            channel: Arc::new(Mutex::new(channel)),
            frames,
            sampler: Arc::new(Mutex::new(sampler)),
            scanner: Arc::new(Mutex::new(scanner)),
            overlay: Arc::new(Mutex::new(OverlayObserver::new())),
            elements: collaborators.elements,
            mutations: MutationSignal::new(),
        };

        controller.ensure_overlay_watch().await?;
        log_info!("session controller ready (session {})", controller.session_id);
        Ok(controller)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Handle the host uses to report element tree mutations.
    pub fn mutation_signal(&self) -> MutationSignal {
        self.mutations.clone()
    }

    /// Idle/Stopped -> Capturing. Returns `false` when already capturing.
    pub async fn start(&self) -> Result<bool> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.session.lock().await.is_capturing() {
            return Ok(false);
        }

        let endpoint = self
            .settings
            .session_endpoint(&self.session_id)
            .context("failed to build detection endpoint")?;
        self.channel.lock().await.open(endpoint)?;

        let sampling = self
            .sampler
            .lock()
            .await
            .start_sampling(self.session_id.clone(), self.frames.clone());
        if let Err(err) = sampling {
            if let Err(close_err) = self.channel.lock().await.close().await {
                log_error!("failed to close detection channel after aborted start: {close_err:?}");
            }
            return Err(err);
        }

        self.ensure_overlay_watch().await?;

        let mut session = self.session.lock().await;
        session.begin_capture(Utc::now());
        log_info!("session {} capturing", self.session_id);
        Ok(true)
    }

    /// Capturing -> Stopped. Returns `false` when nothing was capturing.
    /// Accumulated results stay queryable afterwards.
    pub async fn stop(&self) -> Result<bool> {
        let _lifecycle = self.lifecycle.lock().await;

        if !self.session.lock().await.stop() {
            return Ok(false);
        }

        if let Err(err) = self.sampler.lock().await.stop_sampling().await {
            log_error!("failed to stop frame sampling: {err:?}");
        }
        if let Err(err) = self.channel.lock().await.close().await {
            log_error!("failed to close detection channel: {err:?}");
        }
        if let Err(err) = self.overlay.lock().await.stop().await {
            log_error!("failed to stop overlay observer: {err:?}");
        }

        log_info!("session {} stopped", self.session_id);
        Ok(true)
    }

    pub async fn query(&self) -> DetectionSnapshot {
        let session = self.session.lock().await.clone();
        let report = self.aggregator.report().await;

        DetectionSnapshot {
            session_id: session.id,
            is_active: session.state == SessionState::Capturing,
            state: session.state,
            started_at: session.started_at,
            stats: report.stats,
            overlay: report.overlay,
            alerts: report.alerts,
            evicted_verdicts: report.evicted_verdicts,
            service_summary: report.service_summary,
            channel: self.frames.diagnostics(),
        }
    }

    /// Stops capture if active and disarms the overlay observer.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await?;
        let _lifecycle = self.lifecycle.lock().await;
        self.overlay.lock().await.stop().await
    }

    async fn ensure_overlay_watch(&self) -> Result<()> {
        let mut overlay = self.overlay.lock().await;
        if overlay.is_running() {
            return Ok(());
        }

        overlay.start(
            Arc::clone(&self.scanner),
            Arc::clone(&self.elements),
            self.aggregator.clone(),
            self.mutations.clone(),
            ObserverConfig {
                scan_interval: self.settings.overlay_scan_interval(),
                debounce: self.settings.mutation_debounce(),
            },
        )
    }
}
