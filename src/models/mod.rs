//! Data model shared by the capture, channel, aggregation and overlay paths.

pub mod alert;
pub mod overlay;
pub mod session;
pub mod verdict;

pub use alert::{Alert, AlertKind};
pub use overlay::{OverlayDetection, OverlayReason, OverlaySummary};
pub use session::{generate_session_id, Session, SessionState};
pub use verdict::{AggregateStats, SampledFrame, VerdictResult};
