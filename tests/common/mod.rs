#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, Rgb};
use tokio::sync::mpsc;
use url::Url;

use integrity_monitor_lib::alerts::{ControlSurface, IntegrityAlertEvent, Notifier};
use integrity_monitor_lib::channel::transport::ConnectFuture;
use integrity_monitor_lib::channel::{Connector, Link, LinkMessage};
use integrity_monitor_lib::overlay::{ElementNode, ElementTree};
use integrity_monitor_lib::sensing::VideoSurface;
use integrity_monitor_lib::{MonitorError, MonitorSettings};

/// Service side of one fake connection.
pub struct RemoteEnd {
    pub outbound: mpsc::Receiver<LinkMessage>,
    pub inbound: mpsc::Sender<String>,
}

impl RemoteEnd {
    /// Drains everything the client writes. `Close` is recorded as `"<close>"`.
    pub fn record(self) -> (Arc<Mutex<Vec<String>>>, mpsc::Sender<String>) {
        let RemoteEnd {
            mut outbound,
            inbound,
        } = self;
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&written);
        tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                let entry = match message {
                    LinkMessage::Text(text) => text,
                    LinkMessage::Close => "<close>".to_string(),
                };
                sink.lock().unwrap().push(entry);
            }
        });
        (written, inbound)
    }
}

#[derive(Default)]
pub struct FakeConnector {
    attempts: AtomicUsize,
    refusing: AtomicBool,
    remotes: Mutex<VecDeque<RemoteEnd>>,
    endpoints: Mutex<Vec<Url>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        let connector = Self::default();
        connector.refusing.store(true, Ordering::SeqCst);
        Arc::new(connector)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn take_remote(&self) -> Option<RemoteEnd> {
        self.remotes.lock().unwrap().pop_front()
    }

    pub fn endpoints(&self) -> Vec<Url> {
        self.endpoints.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, endpoint: Url, outbound_depth: usize) -> ConnectFuture {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint.clone());

        if self.refusing.load(Ordering::SeqCst) {
            return Box::pin(async move {
                Err(MonitorError::connection(format!("{endpoint} refused")))
            });
        }

        let (out_tx, out_rx) = mpsc::channel(outbound_depth);
        let (in_tx, in_rx) = mpsc::channel(16);
        self.remotes.lock().unwrap().push_back(RemoteEnd {
            outbound: out_rx,
            inbound: in_tx,
        });
        Box::pin(async move {
            Ok(Link {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

/// Control surface and notifier that keep everything they receive.
#[derive(Default)]
pub struct RecordingSurface {
    pub events: Mutex<Vec<IntegrityAlertEvent>>,
    pub notifications: Mutex<Vec<String>>,
}

impl RecordingSurface {
    pub fn event_kinds(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| {
                serde_json::to_value(&event.alert).unwrap()["kind"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }
}

impl ControlSurface for RecordingSurface {
    fn deliver(&self, event: &IntegrityAlertEvent) -> Result<(), MonitorError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl Notifier for RecordingSurface {
    fn notify(&self, _title: &str, body: &str) -> Result<(), MonitorError> {
        self.notifications.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

/// Solid-colour frames; every `fail_every`-th grab fails when non-zero.
#[derive(Default)]
pub struct SolidSurface {
    pub grabs: AtomicUsize,
    pub fail_every: usize,
}

impl SolidSurface {
    pub fn flaky(fail_every: usize) -> Self {
        Self {
            grabs: AtomicUsize::new(0),
            fail_every,
        }
    }

    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

impl VideoSurface for SolidSurface {
    fn grab(&self) -> Result<DynamicImage, MonitorError> {
        let count = self.grabs.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && count % self.fail_every == 0 {
            return Err(MonitorError::capture("video not ready"));
        }
        let buffer = ImageBuffer::from_pixel(16, 16, Rgb([10u8, 20, 30]));
        Ok(DynamicImage::ImageRgb8(buffer))
    }
}

/// Every grab blocks for `hang`; records how many grabs overlapped.
pub struct HangingSurface {
    hang: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    grabs: AtomicUsize,
}

impl HangingSurface {
    pub fn new(hang: Duration) -> Self {
        Self {
            hang,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            grabs: AtomicUsize::new(0),
        }
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

impl VideoSurface for HangingSurface {
    fn grab(&self) -> Result<DynamicImage, MonitorError> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        std::thread::sleep(self.hang);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Err(MonitorError::capture("surface hung"))
    }
}

/// Fixed tree that counts how often it was read.
pub struct CountingTree {
    roots: Vec<ElementNode>,
    reads: AtomicUsize,
}

impl CountingTree {
    pub fn new(roots: Vec<ElementNode>) -> Arc<Self> {
        Arc::new(Self {
            roots,
            reads: AtomicUsize::new(0),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ElementTree for CountingTree {
    fn snapshot(&self) -> anyhow::Result<Vec<ElementNode>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.roots.clone())
    }
}

pub fn helper_overlay() -> ElementNode {
    let mut node = ElementNode::new("body/div[3]", "div");
    node.classes = vec!["helper-overlay".into()];
    node.z_index = Some(2000);
    node.opacity = 0.5;
    node.width = 320.0;
    node.height = 240.0;
    node
}

pub fn cookie_banner() -> ElementNode {
    let mut node = helper_overlay();
    node.key = "body/div[4]".into();
    node.classes = vec!["cookie-banner".into()];
    node
}

pub fn page_with_overlays() -> Vec<ElementNode> {
    let mut body = ElementNode::new("body", "body");
    body.width = 1280.0;
    body.height = 720.0;
    body.children = vec![helper_overlay(), cookie_banner()];
    vec![body]
}

pub fn detection_result(confidence: f64) -> String {
    serde_json::json!({
        "type": "detection_result",
        "result": {
            "is_deepfake": confidence > 0.5,
            "confidence": confidence,
            "methods": {"frequency": confidence, "temporal": confidence / 2.0}
        }
    })
    .to_string()
}

pub fn detection_result_with_summary(confidence: f64, frame_count: u64) -> String {
    serde_json::json!({
        "type": "detection_result",
        "result": {
            "is_deepfake": false,
            "confidence": confidence,
            "methods": {}
        },
        "session_summary": {
            "session_id": "remote-session",
            "duration": 12.5,
            "frame_count": frame_count,
            "overall_confidence": confidence,
            "alerts": [],
            "is_active": true
        }
    })
    .to_string()
}

/// Fast settings for real-time tests.
pub fn quick_settings() -> MonitorSettings {
    MonitorSettings {
        frame_rate: 20,
        overlay_scan_interval_ms: 50,
        mutation_debounce_ms: 10,
        reconnect_delay_ms: 100,
        ..MonitorSettings::default()
    }
}

/// Lets spawned tasks run without moving the (possibly paused) clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Polls `check` in real time until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
