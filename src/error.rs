//! Failure taxonomy shared by the monitoring pipeline.
//!
//! None of these are fatal: each boundary decides whether to skip, retry or
//! log-and-drop, but callers still need to know which bucket a failure is in.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Per-tick capture problem (surface not ready, zero-sized frame, encode
    /// failure). The tick is skipped.
    #[error("capture failure: {0}")]
    Capture(String),
    /// Transport error or abrupt close of the detection connection.
    #[error("connection failure: {0}")]
    Connection(String),
    /// Delivery to the external control surface failed.
    #[error("dispatch failure: {0}")]
    Dispatch(String),
    /// Inbound message could not be understood; the connection stays open.
    #[error("protocol failure: {0}")]
    Protocol(String),
    /// Settings failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn capture(detail: impl Into<String>) -> Self {
        Self::Capture(detail.into())
    }

    pub fn connection(detail: impl Into<String>) -> Self {
        Self::Connection(detail.into())
    }

    pub fn dispatch(detail: impl Into<String>) -> Self {
        Self::Dispatch(detail.into())
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol(detail.into())
    }
}
