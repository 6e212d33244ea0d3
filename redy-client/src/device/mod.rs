pub mod html;
pub mod nodes;

use std::time::Duration;

use serde_json::Value;

pub use html::{embedded_payload, PAYLOAD_MARKER};
pub use nodes::{extract_nodes, ExtractIssue, Extraction, NotAnObject};

/// Parsed JSON document served by the device.
pub type DevicePayload = Value;

pub const DEFAULT_PORT: u16 = 1234;
pub const DEVICES_PATH: &str = "/api/devices";

#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("request to device failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response has no text node containing REDYMETER")]
    MissingPayload,
    #[error("embedded payload is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

impl DeviceError {
    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::MissingPayload | Self::MalformedJson(_) => "payload",
        }
    }
}

/// HTTP client for the local device API.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    url: String,
}

impl DeviceClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: format!("http://{host}:{port}{DEVICES_PATH}"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One GET of the devices page, unwrapped and parsed.
    pub async fn fetch_payload(&self) -> Result<DevicePayload, DeviceError> {
        tracing::debug!(url = %self.url, "fetching device payload");

        let body = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_payload(&body)
    }
}

/// Recover the JSON document from the HTML served by the device.
pub fn parse_payload(body: &str) -> Result<DevicePayload, DeviceError> {
    let json = embedded_payload(body).ok_or(DeviceError::MissingPayload)?;
    Ok(serde_json::from_str(&json)?)
}
