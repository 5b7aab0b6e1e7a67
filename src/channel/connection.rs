//! Connection supervisor: Disconnected -> Connecting -> Connected, and after
//! any loss Reconnecting -> Connecting again after a fixed delay, for as long
//! as the channel is open. Frames offered while not connected, or while the
//! outbound queue is full, are dropped.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::aggregator::ResultAggregator;
use crate::models::SampledFrame;

use super::protocol::{parse_inbound, InboundMessage, OutboundMessage};
use super::transport::{Connector, Link, LinkMessage};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDiagnostics {
    pub state: ChannelState,
    pub reconnect_attempts: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub protocol_errors: u64,
}

struct ChannelShared {
    state: Mutex<ChannelState>,
    outbound: Mutex<Option<mpsc::Sender<LinkMessage>>>,
    reconnect_attempts: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    protocol_errors: AtomicU64,
}

impl ChannelShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState::Disconnected),
            outbound: Mutex::new(None),
            reconnect_attempts: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
        }
    }

    fn state(&self) -> ChannelState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: ChannelState) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard != next {
            log::debug!("detection channel {:?} -> {:?}", *guard, next);
            *guard = next;
        }
    }

    fn install(&self, sender: Option<mpsc::Sender<LinkMessage>>) {
        let mut guard = match self.outbound.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = sender;
    }

    fn diagnostics(&self) -> ChannelDiagnostics {
        ChannelDiagnostics {
            state: self.state(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
        }
    }
}

/// Cheap handle the sampler pushes frames through. Never blocks.
#[derive(Clone)]
pub struct FrameSender {
    shared: Arc<ChannelShared>,
}

impl FrameSender {
    /// Diagnostics of the channel this sender feeds.
    pub fn diagnostics(&self) -> ChannelDiagnostics {
        self.shared.diagnostics()
    }

    /// Returns `false` when the frame was dropped.
    pub fn send_frame(&self, frame: SampledFrame) -> bool {
        let sender = match self.shared.outbound.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let Some(sender) = sender else {
            self.shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let text = match OutboundMessage::frame(&frame).to_text() {
            Ok(text) => text,
            Err(err) => {
                log::debug!("frame encoding failed: {err}");
                self.shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        match sender.try_send(LinkMessage::Text(text)) {
            Ok(()) => {
                self.shared.frames_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

pub struct DetectionChannel {
    connector: Arc<dyn Connector>,
    aggregator: ResultAggregator,
    reconnect_delay: Duration,
    outbound_depth: usize,
    shared: Arc<ChannelShared>,
    supervisor: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl DetectionChannel {
    pub fn new(
        connector: Arc<dyn Connector>,
        aggregator: ResultAggregator,
        reconnect_delay: Duration,
        outbound_depth: usize,
    ) -> Self {
        Self {
            connector,
            aggregator,
            reconnect_delay,
            outbound_depth: outbound_depth.max(1),
            shared: Arc::new(ChannelShared::new()),
            supervisor: None,
            cancel_token: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.supervisor.is_some()
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn diagnostics(&self) -> ChannelDiagnostics {
        self.shared.diagnostics()
    }

    pub fn frame_sender(&self) -> FrameSender {
        FrameSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Starts connecting to `endpoint` and keeps the connection alive until
    /// [`close`](Self::close).
    pub fn open(&mut self, endpoint: Url) -> Result<()> {
        if self.supervisor.is_some() {
            bail!("detection channel already open");
        }

        let cancel_token = CancellationToken::new();
        let supervisor = Supervisor {
            endpoint,
            connector: Arc::clone(&self.connector),
            aggregator: self.aggregator.clone(),
            shared: Arc::clone(&self.shared),
            reconnect_delay: self.reconnect_delay,
            outbound_depth: self.outbound_depth,
            cancel_token: cancel_token.clone(),
        };

        self.supervisor = Some(tokio::spawn(supervisor.run()));
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Sends `end_session` if connected, closes the link and cancels any
    /// pending reconnect. No-op when the channel is not open.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.supervisor.take() {
            handle
                .await
                .context("detection channel supervisor failed to join")
        } else {
            Ok(())
        }
    }
}

struct Supervisor {
    endpoint: Url,
    connector: Arc<dyn Connector>,
    aggregator: ResultAggregator,
    shared: Arc<ChannelShared>,
    reconnect_delay: Duration,
    outbound_depth: usize,
    cancel_token: CancellationToken,
}

impl Supervisor {
    async fn run(self) {
        loop {
            self.shared.set_state(ChannelState::Connecting);

            let attempt = self.connector.connect(self.endpoint.clone(), self.outbound_depth);
            let connected = tokio::select! {
                result = attempt => result,
                _ = self.cancel_token.cancelled() => {
                    self.shared.set_state(ChannelState::Disconnected);
                    return;
                }
            };

            match connected {
                Ok(link) => {
                    if self.serve(link).await {
                        self.shared.set_state(ChannelState::Disconnected);
                        return;
                    }
                    log_warn!(
                        "connection to detection service lost; retrying in {:?}",
                        self.reconnect_delay
                    );
                }
                Err(err) => {
                    log_warn!("{err}; retrying in {:?}", self.reconnect_delay);
                }
            }

            self.shared.set_state(ChannelState::Reconnecting);
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = self.cancel_token.cancelled() => {
                    self.shared.set_state(ChannelState::Disconnected);
                    return;
                }
            }
            self.shared.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Pumps inbound messages until the link drops (`false`) or the channel
    /// is closed (`true`).
    async fn serve(&self, link: Link) -> bool {
        let Link {
            outbound,
            mut inbound,
        } = link;

        self.shared.install(Some(outbound.clone()));
        self.shared.set_state(ChannelState::Connected);
        log_info!("connected to detection service at {}", self.endpoint);

        let closing = loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(text) => self.handle_inbound(&text).await,
                    None => break false,
                },
                _ = self.cancel_token.cancelled() => break true,
            }
        };

        self.shared.install(None);
        if !closing {
            self.shared.set_state(ChannelState::Disconnected);
            return false;
        }

        match OutboundMessage::EndSession.to_text() {
            Ok(text) => {
                let notice = outbound.send(LinkMessage::Text(text));
                if tokio::time::timeout(CLOSE_GRACE, notice).await.is_err() {
                    log_warn!("end_session notice timed out");
                }
            }
            Err(err) => log_warn!("{err}"),
        }
        match tokio::time::timeout(CLOSE_GRACE, outbound.send(LinkMessage::Close)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => log::debug!("link writer already gone; close request not queued"),
            Err(_) => log_warn!("close request timed out"),
        }
        log_info!("detection channel closed");
        true
    }

    async fn handle_inbound(&self, text: &str) {
        match parse_inbound(text) {
            Ok(InboundMessage::DetectionResult {
                result,
                session_summary,
            }) => {
                match result.into_verdict(Utc::now()) {
                    Ok(verdict) => {
                        self.aggregator.record_verdict(verdict).await;
                    }
                    Err(err) => self.protocol_failure(&err.to_string()),
                }
                if let Some(summary) = session_summary {
                    self.aggregator.record_service_summary(summary).await;
                }
            }
            Ok(InboundMessage::Alert { alert }) => {
                self.aggregator.record_service_alert(alert).await;
            }
            Err(err) => self.protocol_failure(&err.to_string()),
        }
    }

    fn protocol_failure(&self, detail: &str) {
        self.shared.protocol_errors.fetch_add(1, Ordering::Relaxed);
        log_warn!("discarding inbound message: {detail}");
    }
}
