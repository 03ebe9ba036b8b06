//! Result channel: the latest results batch, nothing older.

use crate::protocol::{parse_results, DetectionResult};

#[derive(Clone, Debug, Default)]
pub struct ResultChannel {
    latest: Vec<DetectionResult>,
    batches_seen: u64,
    dropped_messages: u64,
}

impl ResultChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one inbound text message. A valid batch replaces the snapshot
    /// wholesale; anything else is dropped and the snapshot is untouched.
    /// Returns the new snapshot when it changed.
    pub fn apply_message(&mut self, text: &str) -> Option<&[DetectionResult]> {
        match parse_results(text) {
            Ok(batch) => {
                self.latest = batch;
                self.batches_seen += 1;
                Some(&self.latest)
            }
            Err(err) => {
                self.dropped_messages += 1;
                log::debug!("discarding inbound message: {}", err);
                None
            }
        }
    }

    pub fn snapshot(&self) -> &[DetectionResult] {
        &self.latest
    }

    pub fn clear(&mut self) {
        self.latest.clear();
    }

    pub fn batches_seen(&self) -> u64 {
        self.batches_seen
    }

    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }
}
