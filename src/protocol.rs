//! Wire messages exchanged with the detection service.
//!
//! Outbound: `{ "frame": "<data:image/jpeg;base64,...>", "action": "<token>" }`
//! Inbound:  `{ "results": [ { "name"?: string, "status": string }, ... ] }`
//!
//! Anything inbound that is not a results batch is a protocol error and is
//! dropped by the caller without touching session state.

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Name the service (and the UI) use for a face it could not identify.
pub const UNKNOWN_FACE: &str = "Unknown Face";

/// Status the service reports when no identity matched.
pub const STATUS_NOT_FOUND: &str = "NOT_FOUND";

const SUCCESS_SUFFIX: &str = "_SUCCESS";

/// Operational intent of a streaming session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Acquire,
    Return,
}

/// Wire tokens for each action. Deployments may localize them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionTokens {
    pub acquire: String,
    pub ret: String,
}

impl Default for ActionTokens {
    fn default() -> Self {
        Self {
            acquire: "ACQUIRE".to_string(),
            ret: "RETURN".to_string(),
        }
    }
}

impl ActionTokens {
    pub fn token(&self, action: Action) -> &str {
        match action {
            Action::Acquire => &self.acquire,
            Action::Return => &self.ret,
        }
    }
}

/// One encoded still image plus the action it was captured under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramePayload {
    encoded_image: String,
    action: Action,
}

#[derive(Serialize)]
struct WireFrame<'a> {
    frame: &'a str,
    action: &'a str,
}

impl FramePayload {
    pub fn new(encoded_image: String, action: Action) -> Self {
        Self {
            encoded_image,
            action,
        }
    }

    pub fn encoded_image(&self) -> &str {
        &self.encoded_image
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// JSON text for the duplex connection.
    pub fn to_wire(&self, tokens: &ActionTokens) -> serde_json::Result<String> {
        serde_json::to_string(&WireFrame {
            frame: &self.encoded_image,
            action: tokens.token(self.action),
        })
    }
}

/// Outcome for one face in a results batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: String,
}

/// Visual partition of a result in the status panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultClass {
    /// Status ends in `_SUCCESS`.
    Matched,
    /// `NOT_FOUND`, or no usable name.
    Unmatched,
    /// Any other status for a named face (e.g. already logged, rejected).
    Unverified,
}

impl DetectionResult {
    pub fn is_success(&self) -> bool {
        self.status.ends_with(SUCCESS_SUFFIX)
    }

    /// Name when present and not the unknown sentinel.
    pub fn known_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty() && *name != UNKNOWN_FACE)
    }

    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => UNKNOWN_FACE,
        }
    }

    pub fn classify(&self) -> ResultClass {
        if self.is_success() {
            ResultClass::Matched
        } else if self.status == STATUS_NOT_FOUND || self.known_name().is_none() {
            ResultClass::Unmatched
        } else {
            ResultClass::Unverified
        }
    }
}

#[derive(Deserialize)]
struct ResultsMessage {
    results: Vec<DetectionResult>,
}

/// Parse inbound text as a results batch.
pub fn parse_results(text: &str) -> Result<Vec<DetectionResult>, StreamError> {
    serde_json::from_str::<ResultsMessage>(text)
        .map(|message| message.results)
        .map_err(|e| StreamError::Protocol(e.to_string()))
}
