//! Single-threaded drive loop for the streaming client.
//!
//! Each pass pumps the capture source, redraws the overlay for a new frame,
//! drains transport events, fires due timers and refreshes the status line,
//! then sleeps until the next deadline (capped so capture stays responsive).

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::frame::CaptureSource;
use crate::overlay::{OverlayRenderer, RenderOutcome};
use crate::session::{SessionController, SessionPhase};
use crate::transport::Connector;
use crate::ui::StatusLine;

const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(20);
const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// Upper bound on one idle sleep.
    pub idle_sleep: Duration,
    pub health_interval: Duration,
    /// Stop after this long; run until shutdown when unset.
    pub run_for: Option<Duration>,
    /// Annotated frames are written here (JPEG) when set.
    pub overlay_output: Option<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            idle_sleep: DEFAULT_IDLE_SLEEP,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            run_for: None,
            overlay_output: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_sent: u64,
    pub overlay_cycles: u64,
    pub connections_opened: u64,
}

/// Drive `controller` until `shutdown` is set, the run duration elapses or the
/// session leaves `Streaming`. Always tears the session down before returning.
pub fn run<S: CaptureSource, C: Connector>(
    controller: &mut SessionController<S, C>,
    overlay: &mut OverlayRenderer,
    mut status_line: Option<&mut StatusLine>,
    shutdown: &AtomicBool,
    opts: &RuntimeOptions,
) -> Result<RunSummary> {
    let started = Instant::now();
    let mut last_health_log = started;

    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if let Some(limit) = opts.run_for {
            if now.duration_since(started) >= limit {
                log::info!("run duration reached");
                break;
            }
        }
        if controller.phase() != SessionPhase::Streaming {
            log::info!("session no longer streaming");
            break;
        }

        if controller.pump_capture() {
            let outcome = overlay.render_cycle(controller.surface(), controller.results());
            if let (RenderOutcome::Drawn { .. }, Some(path)) = (outcome, &opts.overlay_output) {
                match overlay.annotate(controller.surface()) {
                    Ok(image) => {
                        if let Err(err) = image.save_with_format(path, image::ImageFormat::Jpeg) {
                            log::warn!("failed to write overlay {}: {}", path.display(), err);
                        }
                    }
                    Err(err) => log::debug!("overlay annotate failed: {:#}", err),
                }
            }
        }

        controller.poll(now);

        if let Some(line) = status_line.as_deref_mut() {
            line.update(&controller.status(), overlay.surface());
        }

        if now.duration_since(last_health_log) >= opts.health_interval {
            let capture = controller.capture();
            log::info!(
                "source={} healthy={} frames_captured={} frames_sent={} transport={:?}",
                capture.describe(),
                capture.is_healthy(),
                capture.frames_captured(),
                controller.frames_sent(),
                controller.transport_state()
            );
            last_health_log = now;
        }

        let sleep = controller
            .next_deadline()
            .map(|due| due.saturating_duration_since(Instant::now()))
            .unwrap_or(opts.idle_sleep)
            .min(opts.idle_sleep);
        if !sleep.is_zero() {
            std::thread::sleep(sleep);
        }
    }

    let summary = RunSummary {
        frames_sent: controller.frames_sent(),
        overlay_cycles: overlay.cycles(),
        connections_opened: controller.transport().connections_opened(),
    };
    controller.teardown();
    Ok(summary)
}
