use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::encode::{EncoderSettings, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_WIDTH};
use crate::endpoint::{EndpointResolver, NavigationContext};
use crate::persist::{RestSinkConfig, DEFAULT_API_TIMEOUT};
use crate::protocol::ActionTokens;
use crate::reconnect::{BackoffSettings, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use crate::session::{SessionSettings, DEFAULT_SEND_INTERVAL};

const DEFAULT_PAGE_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_PATH: &str = "/take-phone";
const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_DETECTOR: &str = "none";

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    ws_base: Option<String>,
    page_origin: Option<String>,
    path: Option<String>,
    camera: Option<CameraConfigFile>,
    stream: Option<StreamTuningFile>,
    reconnect: Option<ReconnectConfigFile>,
    actions: Option<ActionsConfigFile>,
    api: Option<ApiConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamTuningFile {
    send_interval_ms: Option<u64>,
    max_width: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct ReconnectConfigFile {
    base_ms: Option<u64>,
    max_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ActionsConfigFile {
    acquire: Option<String>,
    #[serde(rename = "return")]
    ret: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    base: Option<String>,
    token: Option<String>,
    branch_id: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    detector: Option<String>,
    output_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Explicit websocket base; derived from `page_origin` when unset.
    pub ws_base: Option<String>,
    pub page_origin: String,
    pub path: String,
    pub camera: CameraSettings,
    pub send_interval: Duration,
    pub encoder: EncoderSettings,
    pub backoff: BackoffSettings,
    pub action_tokens: ActionTokens,
    pub api: Option<RestSinkConfig>,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub detector: String,
    pub output_path: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_base: None,
            page_origin: DEFAULT_PAGE_ORIGIN.to_string(),
            path: DEFAULT_PATH.to_string(),
            camera: CameraSettings {
                url: DEFAULT_CAMERA_URL.to_string(),
                target_fps: DEFAULT_CAMERA_FPS,
            },
            send_interval: DEFAULT_SEND_INTERVAL,
            encoder: EncoderSettings::default(),
            backoff: BackoffSettings::default(),
            action_tokens: ActionTokens::default(),
            api: None,
            overlay: OverlaySettings {
                detector: DEFAULT_DETECTOR.to_string(),
                output_path: None,
            },
        }
    }
}

impl StreamConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FACELOG_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StreamConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let stream = file.stream.unwrap_or_default();
        let reconnect = file.reconnect.unwrap_or_default();
        let actions = file.actions.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        let defaults = ActionTokens::default();

        let api = file.api.and_then(|api| {
            let base = api.base?;
            Some(RestSinkConfig {
                base,
                token: api.token,
                branch_id: api.branch_id,
                timeout: api
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_API_TIMEOUT),
            })
        });

        Self {
            ws_base: file.ws_base,
            page_origin: file
                .page_origin
                .unwrap_or_else(|| DEFAULT_PAGE_ORIGIN.to_string()),
            path: file.path.unwrap_or_else(|| DEFAULT_PATH.to_string()),
            camera: CameraSettings {
                url: camera
                    .url
                    .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            send_interval: stream
                .send_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SEND_INTERVAL),
            encoder: EncoderSettings {
                max_width: stream.max_width.unwrap_or(DEFAULT_MAX_WIDTH),
                quality: stream.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            backoff: BackoffSettings {
                base_delay: reconnect
                    .base_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_BASE_DELAY),
                max_delay: reconnect
                    .max_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_MAX_DELAY),
            },
            action_tokens: ActionTokens {
                acquire: actions.acquire.unwrap_or(defaults.acquire),
                ret: actions.ret.unwrap_or(defaults.ret),
            },
            api,
            overlay: OverlaySettings {
                detector: overlay
                    .detector
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                output_path: overlay.output_path,
            },
        }
    }

    fn apply_env(&mut self) {
        if let Some(base) = non_empty_env("FACELOG_WS_BASE") {
            self.ws_base = Some(base);
        }
        if let Some(origin) = non_empty_env("FACELOG_PAGE_ORIGIN") {
            self.page_origin = origin;
        }
        if let Some(path) = non_empty_env("FACELOG_PATH") {
            self.path = path;
        }
        if let Some(url) = non_empty_env("FACELOG_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(detector) = non_empty_env("FACELOG_DETECTOR") {
            self.overlay.detector = detector;
        }
        if let Some(base) = non_empty_env("FACELOG_API_BASE") {
            let timeout = self
                .api
                .as_ref()
                .map(|api| api.timeout)
                .unwrap_or(DEFAULT_API_TIMEOUT);
            let api = self.api.get_or_insert_with(|| RestSinkConfig {
                base: String::new(),
                token: None,
                branch_id: None,
                timeout,
            });
            api.base = base;
        }
        if let Some(api) = self.api.as_mut() {
            if let Some(token) = non_empty_env("FACELOG_API_TOKEN") {
                api.token = Some(token);
            }
            if let Some(branch_id) = non_empty_env("FACELOG_BRANCH_ID") {
                api.branch_id = Some(branch_id);
            }
        }
    }

    pub fn validate(&mut self) -> Result<()> {
        if let Some(base) = self.ws_base.as_mut() {
            let trimmed = base.trim().trim_end_matches('/').to_string();
            if trimmed.is_empty() {
                self.ws_base = None;
            } else {
                let url = Url::parse(&trimmed)
                    .map_err(|e| anyhow!("ws_base '{}' is not a url: {}", trimmed, e))?;
                if !matches!(url.scheme(), "ws" | "wss") {
                    return Err(anyhow!("ws_base must use ws:// or wss://"));
                }
                *base = trimmed;
            }
        }

        let origin = Url::parse(&self.page_origin)
            .map_err(|e| anyhow!("page_origin '{}' is not a url: {}", self.page_origin, e))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(anyhow!("page_origin must use http:// or https://"));
        }
        if !self.path.starts_with('/') {
            return Err(anyhow!("path must start with '/'"));
        }

        if self.send_interval.is_zero() {
            return Err(anyhow!("send interval must be greater than zero"));
        }
        if self.encoder.max_width == 0 {
            return Err(anyhow!("max_width must be greater than zero"));
        }
        if !(1..=100).contains(&self.encoder.quality) {
            return Err(anyhow!("jpeg_quality must be within 1..=100"));
        }
        if self.backoff.base_delay.is_zero() {
            return Err(anyhow!("reconnect base delay must be greater than zero"));
        }
        if self.backoff.max_delay < self.backoff.base_delay {
            return Err(anyhow!("reconnect max delay must be >= base delay"));
        }

        let tokens = &self.action_tokens;
        if tokens.acquire.trim().is_empty() || tokens.ret.trim().is_empty() {
            return Err(anyhow!("action tokens must not be empty"));
        }
        if tokens.acquire == tokens.ret {
            return Err(anyhow!("action tokens must be distinct"));
        }

        if let Some(api) = &self.api {
            let url = Url::parse(&api.base)
                .map_err(|e| anyhow!("api base '{}' is not a url: {}", api.base, e))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(anyhow!("api base must use http:// or https://"));
            }
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            send_interval: self.send_interval,
            encoder: self.encoder,
            backoff: self.backoff,
            action_tokens: self.action_tokens.clone(),
        }
    }

    pub fn navigation(&self) -> NavigationContext {
        NavigationContext::new(self.page_origin.clone(), self.path.clone())
    }

    pub fn endpoint_resolver(&self) -> EndpointResolver {
        EndpointResolver::new(self.ws_base.clone())
    }
}

fn read_config_file(path: &Path) -> Result<StreamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
