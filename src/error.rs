//! Error taxonomy for the streaming session.
//!
//! Only capture and transport errors ever reach the operator. Encode and
//! protocol errors are contained where they happen and degrade to "skip".

use thiserror::Error;

pub const CAPTURE_ERROR_MESSAGE: &str = "Unable to access camera. Please grant camera permission.";
pub const TRANSPORT_ERROR_MESSAGE: &str = "WebSocket connection error";
pub const CONNECT_ERROR_MESSAGE: &str = "Failed to create WebSocket connection";

#[derive(Debug, Error)]
pub enum StreamError {
    /// Camera could not be acquired. Fatal for the session, never retried.
    #[error("capture unavailable: {0}")]
    Capture(String),

    /// A single frame could not be encoded. The tick is skipped.
    #[error("frame encode failed: {0}")]
    Encode(String),

    /// Connection failed or dropped. Drives the reconnection policy.
    #[error("transport error: {0}")]
    Transport(String),

    /// Connection could not even be created for the resolved endpoint.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Inbound message was not a results batch. Dropped silently.
    #[error("malformed inbound message: {0}")]
    Protocol(String),
}

impl StreamError {
    /// True for the classes that are surfaced to the operator.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            StreamError::Capture(_) | StreamError::Transport(_) | StreamError::Connect(_)
        )
    }

    /// Operator-facing message, if this class is surfaced at all.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            StreamError::Capture(_) => Some(CAPTURE_ERROR_MESSAGE),
            StreamError::Transport(_) => Some(TRANSPORT_ERROR_MESSAGE),
            StreamError::Connect(_) => Some(CONNECT_ERROR_MESSAGE),
            StreamError::Encode(_) | StreamError::Protocol(_) => None,
        }
    }
}
