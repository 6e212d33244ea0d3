use serde::Deserialize;
use std::fs;

use anyhow::Context;
use redy_client::device::DEFAULT_PORT;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_update_interval() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds between poll cycles.
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    #[default]
    Log,
    StateApi,
    HomeAssistant,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub kind: HostKind,
    /// Listen address of the state API.
    pub bind_addr: Option<String>,
    /// Home Assistant base URL, e.g. `http://homeassistant.local:8123`.
    pub base_url: Option<String>,
    /// Home Assistant long-lived access token.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub host: HostConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load from `$REDY_CONFIG` (default `redy-bridge.toml`).
    ///
    /// `REDY_DEVICE_HOST` overrides `device.host`.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("REDY_CONFIG").unwrap_or_else(|_| "redy-bridge.toml".to_string());
        let contents =
            fs::read_to_string(&path).with_context(|| format!("failed to read config {path}"))?;
        let mut cfg = Self::from_toml_str(&contents)?;

        if let Ok(host) = env::var("REDY_DEVICE_HOST") {
            cfg.device.host = host;
            cfg.validate()?;
        }
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let expanded = expand_env_placeholders(raw)?;
        let cfg: AppConfig = toml::from_str(&expanded).context("invalid config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.device.host.trim().is_empty(), "device.host must not be empty");
        anyhow::ensure!(
            self.device.update_interval > 0,
            "device.update_interval must be a positive number of seconds"
        );
        anyhow::ensure!(
            self.device.request_timeout_secs > 0,
            "device.request_timeout_secs must be positive"
        );

        match self.host.kind {
            HostKind::Log => {}
            HostKind::StateApi => {
                anyhow::ensure!(
                    self.host.bind_addr.is_some(),
                    "host.bind_addr is required for the state_api host"
                );
            }
            HostKind::HomeAssistant => {
                anyhow::ensure!(
                    self.host.base_url.is_some() && self.host.token.is_some(),
                    "host.base_url and host.token are required for the home_assistant host"
                );
            }
        }
        Ok(())
    }
}

/// Replace `${VAR}` with the value of environment variable `VAR`.
/// `$$` is a literal `$`; any other `$` is kept as is.
fn expand_env_placeholders(input: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match it.peek().copied() {
            Some('$') => {
                it.next();
                out.push('$');
            }
            Some('{') => {
                it.next();
                let mut var = String::new();
                let mut closed = false;
                for ch in it.by_ref() {
                    if ch == '}' {
                        closed = true;
                        break;
                    }
                    var.push(ch);
                }
                anyhow::ensure!(closed, "unterminated env placeholder: missing '}}'");
                let val = std::env::var(&var)
                    .with_context(|| format!("missing environment variable: {var}"))?;
                out.push_str(&val);
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}
