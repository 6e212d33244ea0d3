use redy_client::SensorEntity;

use super::{EntityHost, HostError};

/// Host that only writes entity changes to the log.
#[derive(Debug, Clone, Default)]
pub struct LogHost;

#[async_trait::async_trait]
impl EntityHost for LogHost {
    async fn add_entities(&self, entities: Vec<SensorEntity>) -> Result<(), HostError> {
        for e in &entities {
            tracing::info!(
                entity_id = %e.entity_id,
                unique_id = %e.unique_id,
                name = %e.name,
                state = ?e.state,
                "new power sensor"
            );
        }
        Ok(())
    }

    async fn publish(&self, entity: &SensorEntity) -> Result<(), HostError> {
        tracing::info!(
            entity_id = %entity.entity_id,
            state = ?entity.state,
            unit = %entity.unit_of_measurement,
            attributes = ?entity.attributes,
            "sensor state"
        );
        Ok(())
    }
}
