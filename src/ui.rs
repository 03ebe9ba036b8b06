use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::overlay::OverlaySurface;
use crate::protocol::ResultClass;
use crate::session::{format_elapsed, SessionPhase, SessionStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn status_line(&self, name: &str) -> StatusLine {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StatusLine::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StatusLine::new(name.to_string(), None)
        }
    }
}

/// Operator-facing status: session timer, connection state, the latest
/// results and any error string. Plain mode prints only when the text changes.
pub struct StatusLine {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    last: String,
}

impl StatusLine {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            last: String::new(),
        }
    }

    pub fn update(&mut self, status: &SessionStatus, overlay: &OverlaySurface) {
        let message = render_status(status, overlay);
        if message == self.last {
            return;
        }
        match &self.spinner {
            Some(spinner) => spinner.set_message(message.clone()),
            None => eprintln!("{message}"),
        }
        self.last = message;
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// One-line rendering of the session for the terminal.
pub fn render_status(status: &SessionStatus, overlay: &OverlaySurface) -> String {
    let state = match (status.phase, status.is_connected()) {
        (SessionPhase::Stopped, _) => "stopped".to_string(),
        (SessionPhase::Starting, _) => "starting".to_string(),
        (SessionPhase::Streaming, true) => "streaming".to_string(),
        (SessionPhase::Streaming, false) if status.retry_scheduled => {
            format!("reconnecting (attempt {})", status.reconnect_attempt)
        }
        (SessionPhase::Streaming, false) => "connecting".to_string(),
    };

    let mut line = format!("⏱ {} | {}", format_elapsed(status.elapsed_secs), state);
    if !overlay.boxes.is_empty() {
        line.push_str(&format!(" | {} face(s) in view", overlay.boxes.len()));
    }
    if !status.results.is_empty() {
        let faces: Vec<String> = status
            .results
            .iter()
            .map(|result| {
                let mark = match result.classify() {
                    ResultClass::Matched => "✔",
                    ResultClass::Unmatched => "✘",
                    ResultClass::Unverified => "?",
                };
                format!("{} {} [{}]", mark, result.display_name(), result.status)
            })
            .collect();
        line.push_str(" | ");
        line.push_str(&faces.join(", "));
    }
    if let Some(error) = &status.error {
        line.push_str(" | ");
        line.push_str(error);
    }
    line
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
