use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use redy_bridge::{
    config::{AppConfig, HostKind},
    hosts::{EntityHost, HomeAssistantHost, HostError, LogHost, StateApiHost},
    metrics_server,
    observability,
    pipeline::Pipeline,
    sinks::ReconcileSink,
    sources::DevicePollSource,
    transform,
};
use redy_client::{DeviceClient, DevicePayload, NodeReading, SensorEntity};

enum Host {
    Log(LogHost),
    StateApi(StateApiHost),
    HomeAssistant(HomeAssistantHost),
}

#[async_trait::async_trait]
impl EntityHost for Host {
    async fn add_entities(&self, entities: Vec<SensorEntity>) -> Result<(), HostError> {
        match self {
            Self::Log(h) => h.add_entities(entities).await,
            Self::StateApi(h) => h.add_entities(entities).await,
            Self::HomeAssistant(h) => h.add_entities(entities).await,
        }
    }

    async fn publish(&self, entity: &SensorEntity) -> Result<(), HostError> {
        match self {
            Self::Log(h) => h.publish(entity).await,
            Self::StateApi(h) => h.publish(entity).await,
            Self::HomeAssistant(h) => h.publish(entity).await,
        }
    }
}

async fn build_host(cfg: &AppConfig) -> Result<Host> {
    let host_cfg = &cfg.host;
    let host = match host_cfg.kind {
        HostKind::Log => Host::Log(LogHost),
        HostKind::StateApi => {
            let bind_addr = host_cfg.bind_addr.as_deref().unwrap_or_default();
            Host::StateApi(StateApiHost::bind(bind_addr).await?)
        }
        HostKind::HomeAssistant => Host::HomeAssistant(HomeAssistantHost::new(
            host_cfg.base_url.as_deref().unwrap_or_default(),
            host_cfg.token.as_deref().unwrap_or_default(),
            Duration::from_secs(cfg.device.request_timeout_secs),
        )?),
    };
    Ok(host)
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr).await?;
    }

    let device = &cfg.device;
    let client = DeviceClient::new(
        &device.host,
        device.port,
        Duration::from_secs(device.request_timeout_secs),
    )
    .context("failed to build device HTTP client")?;

    tracing::info!(
        url = client.url(),
        update_interval = device.update_interval,
        host_kind = ?cfg.host.kind,
        "starting Re:dy bridge"
    );

    let pipeline: Pipeline<_, DevicePayload, Vec<NodeReading>, _> = Pipeline {
        source: DevicePollSource::new(client, Duration::from_secs(device.update_interval)),
        transform: Arc::new(transform::NodeExtraction),
        sink: ReconcileSink::new(build_host(&cfg).await?),
    };

    tokio::select! {
        res = pipeline.run() => res?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
    }

    Ok(())
}
