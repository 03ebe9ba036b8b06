use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use url::Url;

use facelog_stream::error::{CAPTURE_ERROR_MESSAGE, CONNECT_ERROR_MESSAGE, TRANSPORT_ERROR_MESSAGE};
use facelog_stream::persist::DetectionSink;
use facelog_stream::{
    CaptureSource, Connection, Connector, DetectionResult, EndpointResolver, NavigationContext,
    ReconnectState, SessionController, SessionPhase, SessionSettings, StreamError, TransportEvent,
    TransportState, VideoFrame,
};

#[derive(Default)]
struct Wire {
    connects: Vec<String>,
    failing_connects: usize,
    inbound: VecDeque<TransportEvent>,
    sent: Vec<String>,
    closes: usize,
}

struct FakeConnector {
    wire: Rc<RefCell<Wire>>,
}

struct FakeConnection {
    wire: Rc<RefCell<Wire>>,
}

impl Connector for FakeConnector {
    type Conn = FakeConnection;

    fn connect(&mut self, url: &Url) -> Result<FakeConnection> {
        let mut wire = self.wire.borrow_mut();
        wire.connects.push(url.to_string());
        if wire.failing_connects > 0 {
            wire.failing_connects -= 1;
            return Err(anyhow!("connection refused"));
        }
        Ok(FakeConnection {
            wire: Rc::clone(&self.wire),
        })
    }
}

impl Connection for FakeConnection {
    fn send_text(&mut self, text: &str) -> Result<()> {
        self.wire.borrow_mut().sent.push(text.to_string());
        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        self.wire.borrow_mut().inbound.pop_front()
    }

    fn close(&mut self) {
        self.wire.borrow_mut().closes += 1;
    }
}

struct FakeCamera {
    deny: bool,
    open: bool,
    opens: u32,
    releases: u32,
    grabs: u32,
    /// Grabs fail once this many frames were delivered.
    unplug_after: Option<u32>,
    /// Grabs stop yielding frames once this many were delivered.
    stall_after: Option<u32>,
}

impl FakeCamera {
    fn new() -> Self {
        Self {
            deny: false,
            open: false,
            opens: 0,
            releases: 0,
            grabs: 0,
            unplug_after: None,
            stall_after: None,
        }
    }

    fn unplugged_after(frames: u32) -> Self {
        Self {
            unplug_after: Some(frames),
            ..Self::new()
        }
    }

    fn stalled_after(frames: u32) -> Self {
        Self {
            stall_after: Some(frames),
            ..Self::new()
        }
    }

    fn stalled(&self) -> bool {
        self.stall_after.is_some_and(|n| self.grabs >= n)
    }

    fn denied() -> Self {
        Self {
            deny: true,
            ..Self::new()
        }
    }
}

impl CaptureSource for FakeCamera {
    fn describe(&self) -> String {
        "fake://camera".to_string()
    }

    fn open(&mut self) -> Result<()> {
        self.opens += 1;
        if self.deny {
            return Err(anyhow!("permission denied"));
        }
        self.open = true;
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<VideoFrame>> {
        if !self.open {
            return Err(anyhow!("camera not open"));
        }
        if self.unplug_after.is_some_and(|n| self.grabs >= n) {
            return Err(anyhow!("device disconnected"));
        }
        if self.stalled() {
            return Ok(None);
        }
        self.grabs += 1;
        Ok(Some(test_frame(1280, 720)))
    }

    fn release(&mut self) {
        self.open = false;
        self.releases += 1;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_healthy(&self) -> bool {
        self.open && !self.stalled()
    }
}

struct RecordingSink {
    batches: Rc<RefCell<Vec<Vec<DetectionResult>>>>,
    fail: bool,
}

impl DetectionSink for RecordingSink {
    fn record(&mut self, batch: &[DetectionResult]) -> Result<()> {
        self.batches.borrow_mut().push(batch.to_vec());
        if self.fail {
            return Err(anyhow!("api unavailable"));
        }
        Ok(())
    }
}

type Controller = SessionController<FakeCamera, FakeConnector>;

fn test_frame(width: u32, height: u32) -> VideoFrame {
    let data = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
    VideoFrame::from_rgb(data, width, height).unwrap()
}

fn controller(path: &str, camera: FakeCamera) -> (Controller, Rc<RefCell<Wire>>) {
    let wire = Rc::new(RefCell::new(Wire::default()));
    let controller = SessionController::new(
        SessionSettings::default(),
        NavigationContext::new("http://localhost:3000", path),
        EndpointResolver::new(None),
        camera,
        FakeConnector {
            wire: Rc::clone(&wire),
        },
    );
    (controller, wire)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn scheduled_delay(controller: &Controller) -> Option<Duration> {
    match controller.reconnect().state() {
        ReconnectState::Scheduled { delay, .. } => Some(delay),
        _ => None,
    }
}

#[test]
fn start_opens_one_connection_and_repeat_start_is_ignored() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();

    controller.start(t0).unwrap();
    controller.start(t0 + ms(10)).unwrap();

    assert_eq!(controller.phase(), SessionPhase::Streaming);
    assert_eq!(controller.transport_state(), TransportState::Open);
    assert_eq!(wire.borrow().connects, vec!["ws://localhost:3000/ws/log-hp"]);
    assert_eq!(controller.capture().opens, 1);
    assert_eq!(controller.clock().map(|c| c.elapsed_secs()), Some(0));
    assert!(controller.status().is_connected());
}

#[test]
fn backoff_doubles_per_failure_and_resets_on_open() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    wire.borrow_mut().failing_connects = 3;
    let t0 = Instant::now();

    controller.start(t0).unwrap();
    assert_eq!(controller.reconnect().attempt(), 1);
    assert_eq!(scheduled_delay(&controller), Some(ms(1_000)));
    assert_eq!(controller.error(), Some(CONNECT_ERROR_MESSAGE));
    assert!(controller.status().is_streaming());

    controller.advance(t0 + ms(999));
    assert_eq!(wire.borrow().connects.len(), 1);

    controller.advance(t0 + ms(1_000));
    assert_eq!(controller.reconnect().attempt(), 2);
    assert_eq!(scheduled_delay(&controller), Some(ms(2_000)));

    controller.advance(t0 + ms(3_000));
    assert_eq!(controller.reconnect().attempt(), 3);
    assert_eq!(scheduled_delay(&controller), Some(ms(4_000)));

    controller.advance(t0 + ms(7_000));
    assert_eq!(wire.borrow().connects.len(), 4);
    assert_eq!(controller.transport_state(), TransportState::Open);
    assert_eq!(controller.reconnect().attempt(), 0);
    assert_eq!(controller.reconnect().state(), ReconnectState::Armed);
    assert_eq!(controller.error(), None);

    wire.borrow_mut().inbound.push_back(TransportEvent::Closed);
    controller.poll(t0 + ms(8_000));
    assert_eq!(controller.reconnect().attempt(), 1);
    assert_eq!(scheduled_delay(&controller), Some(ms(1_000)));
}

#[test]
fn three_drops_schedule_one_two_and_four_seconds() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    wire.borrow_mut().inbound.push_back(TransportEvent::Closed);
    controller.poll(t0 + ms(100));
    assert_eq!(scheduled_delay(&controller), Some(ms(1_000)));
    assert_eq!(controller.transport_state(), TransportState::Closed);

    // Reconnect attempts keep failing so the counter is never reset.
    wire.borrow_mut().failing_connects = 2;
    controller.advance(t0 + ms(1_100));
    assert_eq!(scheduled_delay(&controller), Some(ms(2_000)));
    controller.advance(t0 + ms(3_100));
    assert_eq!(scheduled_delay(&controller), Some(ms(4_000)));
    assert_eq!(controller.reconnect().attempt(), 3);
}

#[test]
fn error_then_close_counts_as_one_failure() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    {
        let mut wire = wire.borrow_mut();
        wire.inbound.push_back(TransportEvent::Error("reset by peer".into()));
        wire.inbound.push_back(TransportEvent::Closed);
    }
    controller.poll(t0 + ms(50));

    assert_eq!(controller.reconnect().attempt(), 1);
    assert_eq!(scheduled_delay(&controller), Some(ms(1_000)));
    assert_eq!(controller.error(), Some(TRANSPORT_ERROR_MESSAGE));
    assert!(controller.clock().is_none());
}

#[test]
fn stop_cancels_pending_reconnect() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    wire.borrow_mut().inbound.push_back(TransportEvent::Closed);
    controller.poll(t0 + ms(10));
    assert!(controller.reconnect().is_scheduled());

    controller.stop();
    controller.advance(t0 + ms(60_000));

    assert_eq!(wire.borrow().connects.len(), 1);
    assert_eq!(controller.phase(), SessionPhase::Stopped);
    assert!(controller.reconnect().is_disarmed());
    assert!(!controller.capture().is_open());
    assert_eq!(controller.capture().releases, 1);
    assert!(controller.next_deadline().is_none());
}

#[test]
fn stop_while_open_closes_without_reconnecting() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    controller.stop();
    controller.advance(t0 + ms(10_000));

    assert_eq!(wire.borrow().closes, 1);
    assert_eq!(wire.borrow().connects.len(), 1);
    assert_eq!(controller.transport_state(), TransportState::Closed);
    assert!(controller.results().is_empty());
}

#[test]
fn malformed_message_keeps_previous_results() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    wire.borrow_mut().inbound.push_back(TransportEvent::Message(
        r#"{"results":[{"status":"LOGIN_SUCCESS","name":"Ada"}]}"#.into(),
    ));
    controller.poll(t0 + ms(10));
    wire.borrow_mut()
        .inbound
        .push_back(TransportEvent::Message("not json".into()));
    controller.poll(t0 + ms(20));

    assert_eq!(
        controller.results(),
        &[DetectionResult {
            name: Some("Ada".into()),
            status: "LOGIN_SUCCESS".into(),
        }]
    );

    wire.borrow_mut()
        .inbound
        .push_back(TransportEvent::Message(r#"{"results":[]}"#.into()));
    controller.poll(t0 + ms(30));
    assert!(controller.results().is_empty());
}

#[test]
fn capture_failure_is_fatal_and_never_retried() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::denied());
    let t0 = Instant::now();

    let err = controller.start(t0).unwrap_err();
    assert!(matches!(err, StreamError::Capture(_)));
    assert_eq!(controller.error(), Some(CAPTURE_ERROR_MESSAGE));
    assert_eq!(controller.phase(), SessionPhase::Stopped);

    controller.advance(t0 + ms(60_000));
    assert!(wire.borrow().connects.is_empty());
    assert!(controller.next_deadline().is_none());
}

#[test]
fn camera_lost_mid_session_stops_streaming() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::unplugged_after(1));
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    assert!(controller.pump_capture());
    controller.advance(t0 + ms(2_000));
    assert_eq!(wire.borrow().sent.len(), 1);

    assert!(!controller.pump_capture());
    assert_eq!(controller.phase(), SessionPhase::Stopped);
    assert_eq!(controller.error(), Some(CAPTURE_ERROR_MESSAGE));
    assert!(!controller.surface().is_ready());
    assert!(!controller.capture().is_open());
    assert_eq!(controller.capture().releases, 1);
    assert_eq!(wire.borrow().closes, 1);

    controller.advance(t0 + ms(60_000));
    assert_eq!(wire.borrow().sent.len(), 1);
    assert_eq!(wire.borrow().connects.len(), 1);
    assert!(controller.next_deadline().is_none());
}

#[test]
fn stalled_camera_withdraws_last_frame_until_it_recovers() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::stalled_after(1));
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    assert!(controller.pump_capture());
    controller.advance(t0 + ms(2_000));
    assert_eq!(wire.borrow().sent.len(), 1);

    // First empty grab on an unhealthy source clears the surface once.
    assert!(controller.pump_capture());
    assert!(!controller.pump_capture());
    assert!(!controller.surface().is_ready());
    assert_eq!(controller.error(), Some(CAPTURE_ERROR_MESSAGE));
    assert_eq!(controller.phase(), SessionPhase::Streaming);

    controller.advance(t0 + ms(4_000));
    controller.advance(t0 + ms(6_000));
    assert_eq!(wire.borrow().sent.len(), 1);

    controller.capture_mut().stall_after = None;
    assert!(controller.pump_capture());
    assert!(controller.surface().is_ready());
    assert_eq!(controller.error(), None);
    controller.advance(t0 + ms(8_000));
    assert_eq!(wire.borrow().sent.len(), 2);
}

#[test]
fn send_tick_ships_encoded_frame_with_action_token() {
    let (mut controller, wire) = controller("/return-laptop", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();
    assert_eq!(
        wire.borrow().connects,
        vec!["ws://localhost:3000/ws/log-laptop"]
    );

    // No frame decoded yet: the tick is skipped.
    controller.advance(t0 + ms(2_000));
    assert!(wire.borrow().sent.is_empty());

    assert!(controller.pump_capture());
    controller.advance(t0 + ms(4_000));

    let sent = wire.borrow().sent.clone();
    assert_eq!(sent.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(payload["action"], "RETURN");
    let frame = payload["frame"].as_str().unwrap();
    assert!(frame.starts_with("data:image/jpeg;base64,"));
    assert_eq!(controller.frames_sent(), 1);
    assert_eq!(controller.clock().map(|c| c.formatted()), Some("00:04".to_string()));
}

#[test]
fn missed_send_ticks_are_skipped_not_queued() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();
    controller.pump_capture();

    controller.advance(t0 + ms(9_000));
    assert_eq!(wire.borrow().sent.len(), 1);
    controller.advance(t0 + ms(9_500));
    assert_eq!(wire.borrow().sent.len(), 1);
    controller.advance(t0 + ms(11_000));
    assert_eq!(wire.borrow().sent.len(), 2);
}

#[test]
fn navigation_change_applies_on_next_open() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    controller.navigate("/return-laptop");
    wire.borrow_mut().inbound.push_back(TransportEvent::Closed);
    controller.poll(t0 + ms(10));
    controller.advance(t0 + ms(1_010));

    assert_eq!(
        wire.borrow().connects,
        vec![
            "ws://localhost:3000/ws/log-hp",
            "ws://localhost:3000/ws/log-laptop"
        ]
    );
    assert_eq!(controller.transport_state(), TransportState::Open);
}

#[test]
fn disconnect_clears_results_and_clock() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();
    controller.advance(t0 + ms(3_000));
    assert_eq!(controller.status().elapsed_secs, 3);

    wire.borrow_mut().inbound.push_back(TransportEvent::Message(
        r#"{"results":[{"status":"NOT_FOUND"}]}"#.into(),
    ));
    wire.borrow_mut().inbound.push_back(TransportEvent::Closed);
    controller.poll(t0 + ms(3_100));

    let status = controller.status();
    assert!(status.results.is_empty());
    assert_eq!(status.elapsed_secs, 0);
    assert!(status.retry_scheduled);
}

#[test]
fn sink_receives_batches_and_its_failures_are_contained() {
    let batches = Rc::new(RefCell::new(Vec::new()));
    let (controller, wire) = controller("/take-phone", FakeCamera::new());
    let mut controller = controller.with_sink(Box::new(RecordingSink {
        batches: Rc::clone(&batches),
        fail: true,
    }));
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    {
        let mut wire = wire.borrow_mut();
        wire.inbound.push_back(TransportEvent::Message(
            r#"{"results":[{"status":"LOGIN_SUCCESS","name":"Ada"}]}"#.into(),
        ));
        wire.inbound
            .push_back(TransportEvent::Message(r#"{"results":[]}"#.into()));
    }
    controller.poll(t0 + ms(10));

    assert_eq!(batches.borrow().len(), 1);
    assert_eq!(batches.borrow()[0][0].name.as_deref(), Some("Ada"));
    assert_eq!(controller.transport_state(), TransportState::Open);
    assert_eq!(controller.error(), None);
}

#[test]
fn teardown_is_idempotent_and_restart_works() {
    let (mut controller, wire) = controller("/take-phone", FakeCamera::new());
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    controller.teardown();
    controller.teardown();
    assert_eq!(controller.capture().releases, 1);
    assert_eq!(wire.borrow().closes, 1);

    controller.start(t0 + ms(5_000)).unwrap();
    assert_eq!(wire.borrow().connects.len(), 2);
    assert_eq!(controller.capture().opens, 2);
    assert_eq!(controller.transport_state(), TransportState::Open);
}
