mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

use integrity_monitor_lib::aggregator::ResultAggregator;
use integrity_monitor_lib::channel::DetectionChannel;
use integrity_monitor_lib::sensing::{FrameSampler, SamplerController};
use url::Url;

use common::{eventually, FakeConnector, HangingSurface, SolidSurface};

fn sampler_over(surface: Arc<SolidSurface>) -> SamplerController {
    SamplerController::new(
        FrameSampler::new(surface, 80),
        Duration::from_millis(20),
        Duration::from_millis(500),
    )
}

#[tokio::test]
async fn capture_failures_skip_the_tick_and_sampling_continues() {
    let connector = FakeConnector::new();
    let mut channel = DetectionChannel::new(
        connector.clone(),
        ResultAggregator::new(0.7, 100, None),
        Duration::from_secs(5),
        4,
    );
    channel
        .open(Url::parse("ws://localhost:8000/ws/detect/s").unwrap())
        .unwrap();
    let probe = &connector;
    assert!(eventually(move || async move { probe.attempts() == 1 }).await);
    let (written, _inbound) = connector.take_remote().unwrap().record();

    let surface = Arc::new(SolidSurface::flaky(2));
    let mut sampler = sampler_over(surface.clone());
    sampler
        .start_sampling("s".into(), channel.frame_sender())
        .unwrap();

    let frames = channel.frame_sender();
    let probe = &frames;
    assert!(eventually(move || async move { probe.diagnostics().frames_sent >= 3 }).await);
    sampler.stop_sampling().await.unwrap();
    assert!(!sampler.is_sampling());

    // Every second grab failed, yet the loop kept going.
    let sent = frames.diagnostics().frames_sent as usize;
    assert!(surface.grabs() >= sent * 2 - 1);

    let first: Value = serde_json::from_str(&written.lock().unwrap()[0]).unwrap();
    assert_eq!(first["type"], "frame");
    assert!(first["timestamp"].as_i64().unwrap() > 0);
    let jpeg = STANDARD.decode(first["data"].as_str().unwrap()).unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    channel.close().await.unwrap();
}

#[tokio::test]
async fn frames_captured_while_disconnected_are_dropped() {
    let connector = FakeConnector::new();
    // Never opened: stays Disconnected.
    let channel = DetectionChannel::new(
        connector.clone(),
        ResultAggregator::new(0.7, 100, None),
        Duration::from_secs(5),
        2,
    );

    let surface = Arc::new(SolidSurface::default());
    let mut sampler = sampler_over(surface);
    sampler
        .start_sampling("s".into(), channel.frame_sender())
        .unwrap();

    let probe = &channel;
    assert!(eventually(move || async move { probe.diagnostics().frames_dropped >= 3 }).await);
    sampler.stop_sampling().await.unwrap();

    let diagnostics = channel.diagnostics();
    assert_eq!(diagnostics.frames_sent, 0);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let channel = DetectionChannel::new(
        FakeConnector::new(),
        ResultAggregator::new(0.7, 100, None),
        Duration::from_secs(5),
        2,
    );
    let mut sampler = sampler_over(Arc::new(SolidSurface::default()));

    sampler
        .start_sampling("s".into(), channel.frame_sender())
        .unwrap();
    assert!(sampler
        .start_sampling("s".into(), channel.frame_sender())
        .is_err());
    sampler.stop_sampling().await.unwrap();
}

#[tokio::test]
async fn a_hung_capture_blocks_new_grabs_until_it_returns() {
    let channel = DetectionChannel::new(
        FakeConnector::new(),
        ResultAggregator::new(0.7, 100, None),
        Duration::from_secs(5),
        2,
    );
    let surface = Arc::new(HangingSurface::new(Duration::from_millis(300)));
    let mut sampler = SamplerController::new(
        FrameSampler::new(surface.clone(), 80),
        Duration::from_millis(20),
        Duration::from_millis(20),
    );

    sampler
        .start_sampling("s".into(), channel.frame_sender())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;
    sampler.stop_sampling().await.unwrap();

    // Roughly 20 ticks elapsed, but the hung grab held every one of them.
    assert_eq!(surface.peak_concurrency(), 1);
    assert!(surface.grabs() <= 2, "grabs = {}", surface.grabs());
}
