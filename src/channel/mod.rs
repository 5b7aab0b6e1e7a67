//! Session-scoped connection to the remote detection service.

pub mod connection;
pub mod protocol;
pub mod transport;

pub use connection::{ChannelDiagnostics, ChannelState, DetectionChannel, FrameSender};
pub use protocol::{InboundMessage, OutboundMessage, ServiceSummary, WireVerdict};
pub use transport::{Connector, Link, LinkMessage, WebSocketConnector};
