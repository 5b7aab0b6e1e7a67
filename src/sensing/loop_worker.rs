use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::channel::FrameSender;
use crate::error::MonitorError;
use crate::models::SampledFrame;

use super::surface::FrameSampler;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Samples one frame per tick and hands it to the channel. Capture failures
/// and timeouts skip the tick; the loop only ends on cancellation.
pub async fn sampling_loop(
    session_id: String,
    sampler: Arc<FrameSampler>,
    frames: FrameSender,
    interval: Duration,
    capture_timeout: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut skipped: u64 = 0;
    // A grab that outlived its timeout keeps its blocking thread; no new
    // grab starts until it returns.
    let mut stalled: Option<JoinHandle<Result<SampledFrame, MonitorError>>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if stalled.as_ref().is_some_and(|handle| !handle.is_finished()) {
                    skipped += 1;
                    log::debug!("previous capture still running; skipping tick for session {session_id}");
                    continue;
                }
                // Whatever the stale grab produced is too old to send.
                stalled = None;

                let worker = Arc::clone(&sampler);
                let mut capture = tokio::task::spawn_blocking(move || worker.sample(Utc::now()));

                match tokio::time::timeout(capture_timeout, &mut capture).await {
                    Ok(Ok(Ok(frame))) => {
                        if !frames.send_frame(frame) {
                            log::trace!("frame dropped for session {session_id}");
                        }
                    }
                    Ok(Ok(Err(err))) => {
                        skipped += 1;
                        log::debug!("frame capture skipped for session {session_id}: {err}");
                    }
                    Ok(Err(join_err)) => {
                        skipped += 1;
                        log_warn!("frame capture worker failed: {join_err}");
                    }
                    Err(_) => {
                        skipped += 1;
                        stalled = Some(capture);
                        log_warn!(
                            "frame capture timeout (> {:?}) session {}",
                            capture_timeout,
                            session_id
                        );
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down ({skipped} tick(s) skipped)");
                break;
            }
        }
    }
}
