//! Session controller.
//!
//! The only component the operator surface talks to. It owns the capture
//! source, the transport session, the reconnection policy, the result channel
//! and the session clock, and is driven entirely by explicit calls:
//!
//! - `start` / `stop` / `teardown` from the operator surface
//! - `present_frame` when the capture source decodes a new frame
//! - `handle_transport` for inbound transport activity
//! - `advance(now)` to fire due timers (send tick, clock tick, retry)
//!
//! Time is always passed in, so the whole state machine runs deterministically
//! in tests without a socket or a camera.
//!
//! Phases: `Stopped -> Starting -> Streaming -> Stopped`. While streaming, the
//! transport may close and reopen any number of times; only a manual stop (or
//! a capture failure) leaves `Streaming`.

use std::time::{Duration, Instant};

use crate::encode::{EncoderSettings, FrameEncoder};
use crate::endpoint::{EndpointResolver, NavigationContext};
use crate::error::{StreamError, CAPTURE_ERROR_MESSAGE, TRANSPORT_ERROR_MESSAGE};
use crate::frame::{CaptureSource, VideoFrame};
use crate::persist::DetectionSink;
use crate::protocol::{Action, ActionTokens, DetectionResult};
use crate::reconnect::{BackoffSettings, ReconnectPolicy};
use crate::results::ResultChannel;
use crate::transport::{Connector, TransportEvent, TransportSession, TransportState};

pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(2_000);
const CLOCK_TICK: Duration = Duration::from_secs(1);
const MAX_EVENTS_PER_POLL: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Stopped,
    Starting,
    Streaming,
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub send_interval: Duration,
    pub encoder: EncoderSettings,
    pub backoff: BackoffSettings,
    pub action_tokens: ActionTokens,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            send_interval: DEFAULT_SEND_INTERVAL,
            encoder: EncoderSettings::default(),
            backoff: BackoffSettings::default(),
            action_tokens: ActionTokens::default(),
        }
    }
}

/// Elapsed seconds since the current connection opened.
#[derive(Clone, Copy, Debug)]
pub struct SessionClock {
    elapsed_secs: u64,
    next_tick: Instant,
}

impl SessionClock {
    pub fn started(now: Instant) -> Self {
        Self {
            elapsed_secs: 0,
            next_tick: now + CLOCK_TICK,
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    fn advance(&mut self, now: Instant) {
        while now >= self.next_tick {
            self.elapsed_secs += 1;
            self.next_tick += CLOCK_TICK;
        }
    }

    pub fn formatted(&self) -> String {
        format_elapsed(self.elapsed_secs)
    }
}

/// `MM:SS`, minutes not wrapped.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Snapshot for the operator surface.
#[derive(Clone, Debug)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub transport: TransportState,
    pub elapsed_secs: u64,
    pub reconnect_attempt: u32,
    pub retry_scheduled: bool,
    pub error: Option<String>,
    pub results: Vec<DetectionResult>,
    pub endpoint: Option<String>,
}

impl SessionStatus {
    /// Streaming as the operator sees it: true across automatic reconnects.
    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    pub fn is_connected(&self) -> bool {
        self.transport == TransportState::Open
    }
}

pub struct SessionController<S: CaptureSource, C: Connector> {
    settings: SessionSettings,
    nav: NavigationContext,
    resolver: EndpointResolver,
    capture: S,
    transport: TransportSession<C>,
    reconnect: ReconnectPolicy,
    encoder: FrameEncoder,
    results: ResultChannel,
    sink: Option<Box<dyn DetectionSink>>,
    clock: Option<SessionClock>,
    next_send: Option<Instant>,
    surface: VideoFrame,
    action: Action,
    phase: SessionPhase,
    error: Option<String>,
    capture_stalled: bool,
    frames_sent: u64,
}

impl<S: CaptureSource, C: Connector> SessionController<S, C> {
    pub fn new(
        settings: SessionSettings,
        nav: NavigationContext,
        resolver: EndpointResolver,
        capture: S,
        connector: C,
    ) -> Self {
        let encoder = FrameEncoder::new(settings.encoder);
        let reconnect = ReconnectPolicy::new(settings.backoff);
        Self {
            settings,
            nav,
            resolver,
            capture,
            transport: TransportSession::new(connector),
            reconnect,
            encoder,
            results: ResultChannel::new(),
            sink: None,
            clock: None,
            next_send: None,
            surface: VideoFrame::not_ready(),
            action: Action::Acquire,
            phase: SessionPhase::Stopped,
            error: None,
            capture_stalled: false,
            frames_sent: 0,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn DetectionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Change the navigation path. Takes effect at the next connection open.
    pub fn navigate(&mut self, path: impl Into<String>) {
        self.nav.path = path.into();
    }

    pub fn navigation(&self) -> &NavigationContext {
        &self.nav
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn transport(&self) -> &TransportSession<C> {
        &self.transport
    }

    pub fn reconnect(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    pub fn results(&self) -> &[DetectionResult] {
        self.results.snapshot()
    }

    pub fn clock(&self) -> Option<&SessionClock> {
        self.clock.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn surface(&self) -> &VideoFrame {
        &self.surface
    }

    pub fn capture(&self) -> &S {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut S {
        &mut self.capture
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            transport: self.transport.state(),
            elapsed_secs: self.clock.map(|c| c.elapsed_secs()).unwrap_or(0),
            reconnect_attempt: self.reconnect.attempt(),
            retry_scheduled: self.reconnect.is_scheduled(),
            error: self.error.clone(),
            results: self.results.snapshot().to_vec(),
            endpoint: self.transport.endpoint().map(|e| e.url.to_string()),
        }
    }

    /// Begin streaming. A no-op while a connection is open, being made, or
    /// scheduled for retry. A capture failure is fatal: the controller stays
    /// stopped and nothing is retried.
    pub fn start(&mut self, now: Instant) -> Result<(), StreamError> {
        if self.phase == SessionPhase::Streaming
            && (self.transport.state().is_active() || self.reconnect.is_scheduled())
        {
            log::debug!("start ignored: session already streaming");
            return Ok(());
        }

        if !self.capture.is_open() {
            self.phase = SessionPhase::Starting;
            if let Err(err) = self.capture.open() {
                self.capture.release();
                let err = StreamError::Capture(format!("{:#}", err));
                self.fail_capture(&err);
                return Err(err);
            }
            log::info!("capture acquired: {}", self.capture.describe());
        }

        self.phase = SessionPhase::Streaming;
        self.reconnect.arm();
        self.connect(now);
        Ok(())
    }

    /// Manual stop: disarm reconnection, close the connection, clear the clock
    /// and results, release the camera.
    pub fn stop(&mut self) {
        if self.reconnect.disarm() {
            log::info!("pending reconnect cancelled");
        }
        self.transport.close();
        self.clock = None;
        self.next_send = None;
        self.results.clear();
        if self.capture.is_open() {
            self.capture.release();
            log::info!("capture released: {}", self.capture.describe());
        }
        self.surface = VideoFrame::not_ready();
        self.capture_stalled = false;
        if self.phase != SessionPhase::Stopped {
            log::info!("session stopped ({} frames sent)", self.frames_sent);
        }
        self.phase = SessionPhase::Stopped;
    }

    /// Unconditional cleanup when the operator surface goes away. Safe to call
    /// any number of times.
    pub fn teardown(&mut self) {
        self.stop();
    }

    /// The capture source decoded a new frame.
    pub fn present_frame(&mut self, frame: VideoFrame) {
        self.surface = frame;
    }

    /// Pull the next frame from the capture source into the video surface.
    /// Returns true when the surface changed.
    ///
    /// A grab error ends the session like a failed start. A source that stops
    /// delivering frames has its last frame withdrawn so no stale image is
    /// sent, until it recovers.
    pub fn pump_capture(&mut self) -> bool {
        if !self.capture.is_open() {
            return false;
        }
        match self.capture.grab() {
            Ok(Some(frame)) => {
                if self.capture_stalled {
                    self.capture_stalled = false;
                    if self.error.as_deref() == Some(CAPTURE_ERROR_MESSAGE) {
                        self.error = None;
                    }
                    log::info!("capture resumed: {}", self.capture.describe());
                }
                self.present_frame(frame);
                true
            }
            Ok(None) => {
                if self.capture_stalled || self.capture.is_healthy() {
                    return false;
                }
                log::warn!("capture stalled: {}", self.capture.describe());
                self.capture_stalled = true;
                self.surface = VideoFrame::not_ready();
                self.error = Some(CAPTURE_ERROR_MESSAGE.to_string());
                true
            }
            Err(err) => {
                self.fail_capture(&StreamError::Capture(format!("{:#}", err)));
                false
            }
        }
    }

    pub fn handle_transport(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Closed => self.on_connection_lost(now, None),
            TransportEvent::Error(reason) => {
                let err = StreamError::Transport(reason);
                log::warn!("{}", err);
                self.on_connection_lost(now, err.user_message());
            }
        }
    }

    /// Drain pending transport activity, then fire due timers.
    pub fn poll(&mut self, now: Instant) {
        for _ in 0..MAX_EVENTS_PER_POLL {
            let Some(event) = self.transport.poll() else {
                break;
            };
            self.handle_transport(event, now);
        }
        self.advance(now);
    }

    /// Fire every timer due at `now`.
    pub fn advance(&mut self, now: Instant) {
        if self.reconnect.take_due(now) {
            log::info!(
                "reconnecting (attempt {})",
                self.reconnect.attempt()
            );
            self.connect(now);
        }

        if let Some(clock) = self.clock.as_mut() {
            clock.advance(now);
        }

        if let Some(due) = self.next_send {
            if now >= due {
                // Missed ticks are skipped, never queued.
                let mut next = due + self.settings.send_interval;
                if next <= now {
                    next = now + self.settings.send_interval;
                }
                self.next_send = Some(next);
                self.send_frame();
            }
        }
    }

    /// Earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.reconnect.next_deadline(),
            self.next_send,
            self.clock.map(|c| c.next_tick()),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Capture errors are fatal: stop everything and surface the message.
    fn fail_capture(&mut self, err: &StreamError) {
        log::error!("{} ({})", err, self.capture.describe());
        self.stop();
        self.error = err.user_message().map(str::to_string);
    }

    fn connect(&mut self, now: Instant) {
        let endpoint = match self.resolver.resolve(&self.nav) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                log::warn!("endpoint resolution failed: {:#}", err);
                self.schedule_retry(now, Some(TRANSPORT_ERROR_MESSAGE));
                return;
            }
        };
        let action = endpoint.action;
        match self.transport.open(endpoint) {
            Ok(()) => self.on_open(now, action),
            Err(err) => {
                log::warn!("{}", err);
                let message = err.user_message();
                self.schedule_retry(now, message);
            }
        }
    }

    fn on_open(&mut self, now: Instant, action: Action) {
        self.error = None;
        self.reconnect.on_open();
        self.clock = Some(SessionClock::started(now));
        self.next_send = Some(now + self.settings.send_interval);
        self.action = action;
        log::info!(
            "session open: action={} every {}ms",
            self.settings.action_tokens.token(action),
            self.settings.send_interval.as_millis()
        );
    }

    fn on_message(&mut self, text: &str) {
        if self.transport.state() != TransportState::Open {
            return;
        }
        let Some(batch) = self.results.apply_message(text) else {
            return;
        };
        log::debug!("results batch: {} face(s)", batch.len());
        if batch.is_empty() {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.record(batch) {
                log::warn!("failed to record detections: {:#}", err);
            }
        }
    }

    fn on_connection_lost(&mut self, now: Instant, message: Option<&str>) {
        if !self.transport.mark_closed() {
            return;
        }
        log::info!("connection closed");
        self.schedule_retry(now, message);
    }

    fn schedule_retry(&mut self, now: Instant, message: Option<&str>) {
        self.clock = None;
        self.next_send = None;
        self.results.clear();
        if let Some(message) = message {
            self.error = Some(message.to_string());
        }
        if let Some(delay) = self.reconnect.on_involuntary_close(now) {
            log::info!(
                "reconnect scheduled in {}ms (attempt {})",
                delay.as_millis(),
                self.reconnect.attempt()
            );
        }
    }

    fn send_frame(&mut self) {
        if self.transport.state() != TransportState::Open {
            return;
        }
        let payload = match self.encoder.encode(&self.surface, self.action) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                log::debug!("send tick skipped: video not ready");
                return;
            }
            Err(err) => {
                log::debug!("send tick skipped: {}", err);
                return;
            }
        };
        let wire = match payload.to_wire(&self.settings.action_tokens) {
            Ok(wire) => wire,
            Err(err) => {
                log::debug!("send tick skipped: {}", err);
                return;
            }
        };
        if self.transport.send(&wire) {
            self.frames_sent += 1;
        }
    }
}

impl<S: CaptureSource, C: Connector> Drop for SessionController<S, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
