use anyhow::{bail, Context, Result};
use log::info;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::channel::FrameSender;

use super::loop_worker::sampling_loop;
use super::surface::FrameSampler;

pub struct SamplerController {
    sampler: Arc<FrameSampler>,
    interval: Duration,
    capture_timeout: Duration,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SamplerController {
    pub fn new(sampler: FrameSampler, interval: Duration, capture_timeout: Duration) -> Self {
        Self {
            sampler: Arc::new(sampler),
            interval,
            capture_timeout,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start_sampling(&mut self, session_id: String, frames: FrameSender) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampling already active");
        }

        info!(
            "Starting frame sampling every {:?} for session {}",
            self.interval, session_id
        );

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sampling_loop(
            session_id,
            Arc::clone(&self.sampler),
            frames,
            self.interval,
            self.capture_timeout,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Stops ticking. An in-flight capture is abandoned; its frame is never sent.
    pub async fn stop_sampling(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("sampling loop task failed to join")
        } else {
            Ok(())
        }
    }
}
