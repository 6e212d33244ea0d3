pub mod home_assistant;
pub mod log;
pub mod state_api;

use redy_client::SensorEntity;

pub use home_assistant::HomeAssistantHost;
pub use log::LogHost;
pub use state_api::StateApiHost;

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("invalid host configuration: {0}")]
    Config(String),
    #[error("host i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request to host failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("host rejected {entity_id} with status {status}")]
    Rejected { entity_id: String, status: u16 },
    #[error("entity {0} was never registered")]
    Unregistered(String),
}

/// The automation platform that owns the sensor entities.
///
/// New entities arrive in batches, once per cycle; entities already
/// registered get their refreshed state through `publish`.
#[async_trait::async_trait]
pub trait EntityHost: Send + Sync {
    async fn add_entities(&self, entities: Vec<SensorEntity>) -> Result<(), HostError>;

    async fn publish(&self, entity: &SensorEntity) -> Result<(), HostError>;
}
