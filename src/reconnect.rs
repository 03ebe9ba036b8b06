//! Reconnection policy.
//!
//! `Armed -> Scheduled -> (Armed | Disarmed)`. An involuntary close while armed
//! always schedules exactly one retry, so "dropped, not stopped, nothing
//! scheduled" cannot be represented. `Disarmed` is the manual-stop state: it
//! cancels any pending retry and stays put until the next explicit start.

use std::time::{Duration, Instant};

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffSettings {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl BackoffSettings {
    /// `min(max, base * 2^(attempt - 1))` for a 1-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let multiplier = 1u32 << shift;
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectState {
    Armed,
    Scheduled { due: Instant, delay: Duration },
    Disarmed,
}

#[derive(Debug)]
pub struct ReconnectPolicy {
    settings: BackoffSettings,
    attempt: u32,
    state: ReconnectState,
}

impl ReconnectPolicy {
    /// New policies start disarmed; `arm` is called by an explicit start.
    pub fn new(settings: BackoffSettings) -> Self {
        Self {
            settings,
            attempt: 0,
            state: ReconnectState::Disarmed,
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_disarmed(&self) -> bool {
        self.state == ReconnectState::Disarmed
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.state, ReconnectState::Scheduled { .. })
    }

    pub fn arm(&mut self) {
        if self.state == ReconnectState::Disarmed {
            self.state = ReconnectState::Armed;
        }
    }

    /// Manual stop. Returns true when a pending retry was cancelled.
    /// The attempt counter is left alone.
    pub fn disarm(&mut self) -> bool {
        let cancelled = self.is_scheduled();
        self.state = ReconnectState::Disarmed;
        cancelled
    }

    /// A connection reached OPEN.
    pub fn on_open(&mut self) {
        self.attempt = 0;
        if self.is_scheduled() {
            self.state = ReconnectState::Armed;
        }
    }

    /// Involuntary close or transport error. Returns the scheduled delay, or
    /// `None` when disarmed.
    pub fn on_involuntary_close(&mut self, now: Instant) -> Option<Duration> {
        if self.is_disarmed() {
            return None;
        }
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.settings.delay(self.attempt);
        self.state = ReconnectState::Scheduled {
            due: now + delay,
            delay,
        };
        Some(delay)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            ReconnectState::Scheduled { due, .. } => Some(due),
            _ => None,
        }
    }

    /// Consume a due retry. True means the caller should reconnect now.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.state {
            ReconnectState::Scheduled { due, .. } if now >= due => {
                self.state = ReconnectState::Armed;
                true
            }
            _ => false,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(BackoffSettings::default())
    }
}
