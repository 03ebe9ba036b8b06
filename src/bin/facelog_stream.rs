//! facelog_stream - live face-detection streaming client
//!
//! This binary:
//! 1. Opens the configured camera (HTTP MJPEG, still image or synthetic stub)
//! 2. Connects to the detection service endpoint chosen by the navigation path
//! 3. Sends one encoded frame every send interval and shows the latest results
//! 4. Reconnects with exponential backoff until stopped (Ctrl-C)

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use facelog_stream::detect::BackendRegistry;
use facelog_stream::error::CAPTURE_ERROR_MESSAGE;
use facelog_stream::ingest::capture_source_for;
use facelog_stream::persist::RestDetectionSink;
use facelog_stream::runtime::{self, RuntimeOptions};
use facelog_stream::transport::ws::WsConnector;
use facelog_stream::ui::Ui;
use facelog_stream::{OverlayRenderer, SessionController, StreamConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Navigation path (/take-phone, /take-laptop, /return-phone, /return-laptop).
    #[arg(long)]
    path: Option<String>,
    /// Camera URL: stub://name, http(s):// MJPEG/JPEG, or an image path.
    #[arg(long)]
    camera: Option<String>,
    /// Websocket base (ws:// or wss://); derived from the page origin when unset.
    #[arg(long)]
    ws_base: Option<String>,
    /// Local face detector for the overlay (none|center).
    #[arg(long)]
    detector: Option<String>,
    /// Stop after this many seconds.
    #[arg(long, env = "FACELOG_DURATION_SECS")]
    duration_secs: Option<u64>,
    /// UI mode for the stderr status line (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = StreamConfig::load()?;
    if let Some(path) = args.path {
        cfg.path = path;
    }
    if let Some(camera) = args.camera {
        cfg.camera.url = camera;
    }
    if let Some(ws_base) = args.ws_base {
        cfg.ws_base = Some(ws_base);
    }
    if let Some(detector) = args.detector {
        cfg.overlay.detector = detector;
    }
    cfg.validate()?;

    let capture = capture_source_for(&cfg.camera.url, cfg.camera.target_fps)?;
    let mut controller = SessionController::new(
        cfg.session_settings(),
        cfg.navigation(),
        cfg.endpoint_resolver(),
        capture,
        WsConnector::default(),
    );
    if let Some(api) = cfg.api.clone() {
        let sink = RestDetectionSink::new(api);
        log::info!("recording detections to {}", sink.url());
        controller = controller.with_sink(Box::new(sink));
    }

    let detector = BackendRegistry::with_builtin().take(&cfg.overlay.detector)?;
    let mut overlay = OverlayRenderer::new(detector);
    log::info!("overlay detector: {}", overlay.detector_name());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    controller
        .start(Instant::now())
        .map_err(|e| anyhow!("failed to start session: {}", e))?;

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);
    let mut status_line = ui.status_line(&format!("Streaming {}", cfg.path));

    let opts = RuntimeOptions {
        run_for: args.duration_secs.map(Duration::from_secs),
        overlay_output: cfg.overlay.output_path.as_ref().map(PathBuf::from),
        ..RuntimeOptions::default()
    };
    let summary = runtime::run(
        &mut controller,
        &mut overlay,
        Some(&mut status_line),
        &shutdown,
        &opts,
    )?;
    drop(status_line);

    log::info!(
        "facelog_stream finished: frames_sent={} overlay_cycles={} connections={}",
        summary.frames_sent,
        summary.overlay_cycles,
        summary.connections_opened
    );
    if controller.error() == Some(CAPTURE_ERROR_MESSAGE) {
        return Err(anyhow!("session ended: {}", CAPTURE_ERROR_MESSAGE));
    }
    Ok(())
}
