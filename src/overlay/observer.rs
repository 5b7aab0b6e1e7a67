use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::aggregator::ResultAggregator;

use super::{ElementTree, OverlayAnomalyScanner};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Host-side handle for "the element tree changed". Bursts collapse into a
/// single pending notification.
#[derive(Clone, Default)]
pub struct MutationSignal {
    notify: Arc<Notify>,
}

impl MutationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.notify.notify_one();
    }

    async fn changed(&self) {
        self.notify.notified().await;
    }

    /// Consumes a notification stored while nobody was waiting.
    fn clear_pending(&self) {
        let _ = self.notify.notified().now_or_never();
    }
}

#[derive(Clone)]
pub struct ObserverConfig {
    pub scan_interval: Duration,
    pub debounce: Duration,
}

/// Owns the periodic + mutation-driven scan task.
pub struct OverlayObserver {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl OverlayObserver {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        scanner: Arc<Mutex<OverlayAnomalyScanner>>,
        tree: Arc<dyn ElementTree>,
        aggregator: ResultAggregator,
        signal: MutationSignal,
        config: ObserverConfig,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("overlay observer already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(overlay_watch_loop(
            scanner,
            tree,
            aggregator,
            signal,
            config,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("overlay observer task failed to join")
        } else {
            Ok(())
        }
    }
}

impl Default for OverlayObserver {
    fn default() -> Self {
        Self::new()
    }
}

async fn overlay_watch_loop(
    scanner: Arc<Mutex<OverlayAnomalyScanner>>,
    tree: Arc<dyn ElementTree>,
    aggregator: ResultAggregator,
    signal: MutationSignal,
    config: ObserverConfig,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_scan(&scanner, &tree, &aggregator).await;
            }
            _ = signal.changed() => {
                // Mutations arriving during the window fold into this scan.
                tokio::select! {
                    _ = tokio::time::sleep(config.debounce) => {}
                    _ = cancel_token.cancelled() => break,
                }
                signal.clear_pending();
                run_scan(&scanner, &tree, &aggregator).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("overlay observer shutting down");
                break;
            }
        }
    }
}

async fn run_scan(
    scanner: &Arc<Mutex<OverlayAnomalyScanner>>,
    tree: &Arc<dyn ElementTree>,
    aggregator: &ResultAggregator,
) {
    let roots = match tree.snapshot() {
        Ok(roots) => roots,
        Err(err) => {
            log_warn!("element tree unavailable, skipping overlay scan: {err:#}");
            return;
        }
    };

    let summary = {
        let mut guard = scanner.lock().await;
        let now = Utc::now();
        let flagged = guard.scan(&roots, now);
        log::debug!(
            "overlay scan flagged {flagged} element(s), {} unique so far",
            guard.unique_elements()
        );
        guard.detection_summary(now)
    };

    aggregator.record_overlay_scan(summary).await;
}
