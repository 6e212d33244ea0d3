use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use redy_client::SensorEntity;
use tokio::sync::RwLock;

use super::{EntityHost, HostError};

type EntityMap = Arc<RwLock<BTreeMap<String, SensorEntity>>>;

/// Keeps the latest state of every entity and serves it over HTTP:
///
/// - `GET /entities` all entities, ordered by unique id
/// - `GET /entities/:unique_id` one entity or 404
/// - `GET /healthz`
#[derive(Clone)]
pub struct StateApiHost {
    entities: EntityMap,
    local_addr: SocketAddr,
}

impl StateApiHost {
    pub async fn bind(bind_addr: &str) -> Result<Self, HostError> {
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| HostError::Config(format!("invalid bind addr: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let entities = EntityMap::default();
        let app = router(entities.clone());

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                tracing::error!(error = %e, "state API server error");
            }
        });

        tracing::info!(addr = %local_addr, "state API listening");
        Ok(Self {
            entities,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[cfg(test)]
    pub(crate) async fn snapshot(&self) -> Vec<SensorEntity> {
        self.entities.read().await.values().cloned().collect()
    }
}

fn router(entities: EntityMap) -> Router {
    Router::new()
        .route("/entities", get(list_entities))
        .route("/entities/:unique_id", get(get_entity))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(entities)
}

async fn list_entities(State(entities): State<EntityMap>) -> Json<Vec<SensorEntity>> {
    Json(entities.read().await.values().cloned().collect())
}

async fn get_entity(
    State(entities): State<EntityMap>,
    Path(unique_id): Path<String>,
) -> Result<Json<SensorEntity>, StatusCode> {
    entities
        .read()
        .await
        .get(&unique_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[async_trait::async_trait]
impl EntityHost for StateApiHost {
    async fn add_entities(&self, entities: Vec<SensorEntity>) -> Result<(), HostError> {
        let mut map = self.entities.write().await;
        for e in entities {
            map.insert(e.unique_id.clone(), e);
        }
        Ok(())
    }

    async fn publish(&self, entity: &SensorEntity) -> Result<(), HostError> {
        let mut map = self.entities.write().await;
        match map.get_mut(&entity.unique_id) {
            Some(slot) => {
                *slot = entity.clone();
                Ok(())
            }
            None => Err(HostError::Unregistered(entity.unique_id.clone())),
        }
    }
}
