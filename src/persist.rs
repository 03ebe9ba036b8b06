//! Detection persistence.
//!
//! Each results batch may be recorded with the logbook REST API as
//! `POST {base}/detections { "result": [...] }`. Recording is best-effort: a
//! failure is logged and never reaches the streaming session.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::time::Duration;

use crate::protocol::DetectionResult;

pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives every non-empty results batch.
pub trait DetectionSink {
    fn record(&mut self, batch: &[DetectionResult]) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct RestSinkConfig {
    /// API base, e.g. `http://localhost:8000`.
    pub base: String,
    pub token: Option<String>,
    pub branch_id: Option<String>,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct DetectionsRequest<'a> {
    result: &'a [DetectionResult],
}

pub struct RestDetectionSink {
    agent: ureq::Agent,
    url: String,
    token: Option<String>,
    branch_id: Option<String>,
}

impl RestDetectionSink {
    pub fn new(config: RestSinkConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            agent,
            url: detections_url(&config.base),
            token: config.token,
            branch_id: config.branch_id,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub fn detections_url(base: &str) -> String {
    format!("{}/detections", base.trim_end_matches('/'))
}

impl DetectionSink for RestDetectionSink {
    fn record(&mut self, batch: &[DetectionResult]) -> Result<()> {
        let mut request = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        if let Some(branch_id) = &self.branch_id {
            request = request.set("X-Branch-ID", branch_id);
        }
        let body = serde_json::to_value(DetectionsRequest { result: batch })?;
        match request.send_json(body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => {
                Err(anyhow!("POST {} returned status {}", self.url, code))
            }
            Err(e) => Err(anyhow!("POST {} failed: {}", self.url, e)),
        }
    }
}
