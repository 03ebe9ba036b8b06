//! Face-detection streaming client.
//!
//! Captures live video, periodically ships a downscaled JPEG frame to a remote
//! detection service over a persistent websocket, and shows the service's
//! latest per-face verdicts alongside locally drawn face boxes.
//!
//! # Module Structure
//!
//! - `frame`, `ingest`: video surface and capture sources
//! - `encode`, `protocol`: frame encoding and the wire format
//! - `endpoint`, `transport`, `reconnect`: connection target, socket
//!   lifecycle and backoff
//! - `results`, `persist`: latest results batch and optional recording
//! - `detect`, `overlay`: local face boxes paired with server results
//! - `session`: the controller that ties the above together
//! - `config`, `runtime`, `ui`: process wiring for the `facelog_stream` binary

pub mod config;
pub mod detect;
pub mod encode;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod persist;
pub mod protocol;
pub mod reconnect;
pub mod results;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod ui;

pub use config::StreamConfig;
pub use encode::{EncoderSettings, FrameEncoder};
pub use endpoint::{Endpoint, EndpointResolver, NavigationContext};
pub use error::StreamError;
pub use frame::{CaptureSource, VideoFrame};
pub use overlay::{OverlayRenderer, OverlaySurface, RenderOutcome};
pub use protocol::{Action, ActionTokens, DetectionResult, FramePayload, ResultClass};
pub use reconnect::{BackoffSettings, ReconnectPolicy, ReconnectState};
pub use results::ResultChannel;
pub use session::{SessionController, SessionPhase, SessionSettings, SessionStatus};
pub use transport::{Connection, Connector, TransportEvent, TransportSession, TransportState};
