//! Endpoint resolution.
//!
//! The connection target is read from the navigation context every time a
//! connection is opened, never cached at schedule time:
//!
//! | path             | endpoint          | action  |
//! |------------------|-------------------|---------|
//! | `/take-phone`    | `/ws/log-hp`      | Acquire |
//! | `/take-laptop`   | `/ws/log-laptop`  | Acquire |
//! | `/return-phone`  | `/ws/log-hp`      | Return  |
//! | `/return-laptop` | `/ws/log-laptop`  | Return  |
//! | anything else    | `/ws/log-hp`      | Acquire |

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::protocol::Action;

pub const PHONE_ENDPOINT: &str = "/ws/log-hp";
pub const LAPTOP_ENDPOINT: &str = "/ws/log-laptop";

/// Where the client currently "is": page origin plus navigation path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationContext {
    /// Page origin, `http(s)://host[:port]`.
    pub origin: String,
    pub path: String,
}

impl NavigationContext {
    pub fn new(origin: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: path.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    Phone,
    Laptop,
}

impl DeviceClass {
    pub fn endpoint_path(self) -> &'static str {
        match self {
            DeviceClass::Phone => PHONE_ENDPOINT,
            DeviceClass::Laptop => LAPTOP_ENDPOINT,
        }
    }
}

/// Resolved connection target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub url: Url,
    pub action: Action,
    pub device: DeviceClass,
}

/// Map a navigation path to its device class and action.
pub fn route_for_path(path: &str) -> (DeviceClass, Action) {
    match path {
        "/take-phone" => (DeviceClass::Phone, Action::Acquire),
        "/take-laptop" => (DeviceClass::Laptop, Action::Acquire),
        "/return-phone" => (DeviceClass::Phone, Action::Return),
        "/return-laptop" => (DeviceClass::Laptop, Action::Return),
        _ => (DeviceClass::Phone, Action::Acquire),
    }
}

/// Websocket base for a page origin: http becomes ws, https becomes wss.
pub fn ws_base_from_origin(origin: &str) -> Result<String> {
    let url = Url::parse(origin).with_context(|| format!("parse page origin '{}'", origin))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(anyhow!("page origin scheme '{}' is not http(s)", other)),
    };
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("page origin '{}' has no host", origin))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", scheme, host, port),
        None => format!("{}://{}", scheme, host),
    })
}

/// Resolves endpoints from an optional explicit base and the navigation context.
#[derive(Clone, Debug, Default)]
pub struct EndpointResolver {
    ws_base: Option<String>,
}

impl EndpointResolver {
    /// `ws_base` is an explicit override; when `None` the page origin is used.
    pub fn new(ws_base: Option<String>) -> Self {
        Self {
            ws_base: ws_base.map(|base| base.trim_end_matches('/').to_string()),
        }
    }

    pub fn base_for(&self, nav: &NavigationContext) -> Result<String> {
        match &self.ws_base {
            Some(base) if !base.is_empty() => Ok(base.clone()),
            _ => ws_base_from_origin(&nav.origin),
        }
    }

    pub fn resolve(&self, nav: &NavigationContext) -> Result<Endpoint> {
        let base = self.base_for(nav)?;
        let (device, action) = route_for_path(&nav.path);
        let raw = format!("{}{}", base, device.endpoint_path());
        let url = Url::parse(&raw).with_context(|| format!("parse endpoint '{}'", raw))?;
        Ok(Endpoint {
            url,
            action,
            device,
        })
    }
}
