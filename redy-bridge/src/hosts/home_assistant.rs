use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
    time::Duration,
};

use redy_client::SensorEntity;
use serde::Serialize;
use serde_json::{json, Value};

use super::{EntityHost, HostError};

/// Pushes entity states into Home Assistant through its REST API
/// (`POST /api/states/<entity_id>`, long-lived access token).
pub struct HomeAssistantHost {
    http: reqwest::Client,
    base_url: String,
    token: String,
    /// unique_id -> entity_id handed out at registration.
    entity_ids: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct StateUpdate {
    state: String,
    attributes: BTreeMap<String, Value>,
}

impl StateUpdate {
    fn from_entity(entity: &SensorEntity) -> Self {
        let mut attributes = entity.attributes.clone().unwrap_or_default();
        attributes.insert("friendly_name".to_string(), json!(entity.name));
        attributes.insert("unit_of_measurement".to_string(), json!(entity.unit_of_measurement));
        attributes.insert("device_class".to_string(), json!(entity.device_class));

        Self {
            state: entity
                .state
                .map(|w| w.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            attributes,
        }
    }
}

impl HomeAssistantHost {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, HostError> {
        if base_url.trim().is_empty() || token.trim().is_empty() {
            return Err(HostError::Config(
                "home_assistant host needs base_url and token".to_string(),
            ));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            entity_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Entity id for `entity`, assigned once per unique id. Two nodes with
    /// the same display name get `_2`, `_3`, ... appended.
    fn assign_entity_id(&self, entity: &SensorEntity) -> String {
        let mut ids = self
            .entity_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = ids.get(&entity.unique_id) {
            return existing.clone();
        }

        let mut candidate = entity.entity_id.clone();
        let mut suffix = 2;
        while ids.values().any(|taken| *taken == candidate) {
            candidate = format!("{}_{suffix}", entity.entity_id);
            suffix += 1;
        }

        ids.insert(entity.unique_id.clone(), candidate.clone());
        candidate
    }

    fn registered_entity_id(&self, unique_id: &str) -> Option<String> {
        self.entity_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(unique_id)
            .cloned()
    }

    async fn push_state(&self, entity_id: &str, entity: &SensorEntity) -> Result<(), HostError> {
        let url = format!("{}/api/states/{entity_id}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&StateUpdate::from_entity(entity))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HostError::Rejected {
                entity_id: entity_id.to_string(),
                status: status.as_u16(),
            });
        }

        tracing::debug!(entity_id, state = ?entity.state, "pushed state to Home Assistant");
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityHost for HomeAssistantHost {
    async fn add_entities(&self, entities: Vec<SensorEntity>) -> Result<(), HostError> {
        for entity in &entities {
            let entity_id = self.assign_entity_id(entity);
            self.push_state(&entity_id, entity).await?;
        }
        Ok(())
    }

    async fn publish(&self, entity: &SensorEntity) -> Result<(), HostError> {
        let entity_id = self
            .registered_entity_id(&entity.unique_id)
            .ok_or_else(|| HostError::Unregistered(entity.unique_id.clone()))?;
        self.push_state(&entity_id, entity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use pretty_assertions::assert_eq;
    use redy_client::{NodeReading, Reading};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Received {
        entity_id: String,
        authorization: Option<String>,
        body: Value,
    }

    #[derive(Clone)]
    struct Stub {
        received: Arc<Mutex<Vec<Received>>>,
        status: StatusCode,
    }

    async fn record_state(
        State(stub): State<Stub>,
        Path(entity_id): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        stub.received.lock().unwrap().push(Received {
            entity_id,
            authorization,
            body,
        });
        stub.status
    }

    async fn spawn_stub(status: StatusCode) -> (String, Arc<Mutex<Vec<Received>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/api/states/:entity_id", post(record_state))
            .with_state(Stub {
                received: received.clone(),
                status,
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });

        (format!("http://{addr}/"), received)
    }

    fn smart_meter() -> SensorEntity {
        Reading::from_node(NodeReading {
            id: "5".to_string(),
            name: "Smart Meter".to_string(),
            power_kw: Some(1.234),
            voltage: Some(230.4),
            contracted_power_w: Some(6900.0),
            last_communication: Some("t1".to_string()),
            online: Some("TRUE".to_string()),
        })
        .to_entity()
    }

    #[tokio::test]
    async fn registration_pushes_state_with_token() {
        let (base_url, received) = spawn_stub(StatusCode::CREATED).await;
        let host = HomeAssistantHost::new(&base_url, "secret", Duration::from_secs(5)).unwrap();

        host.add_entities(vec![smart_meter()]).await.unwrap();

        let received = received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].entity_id, "sensor.power_smart_meter");
        assert_eq!(received[0].authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(
            received[0].body,
            json!({
                "state": "1234",
                "attributes": {
                    "device_class": "power",
                    "friendly_name": "Power Smart Meter",
                    "icon": "mdi:cloud-outline",
                    "last_communication": "t1",
                    "online": "TRUE",
                    "unit_of_measurement": "W",
                    "voltage": 230
                }
            })
        );
    }

    #[tokio::test]
    async fn same_display_name_gets_numbered_entity_ids() {
        let (base_url, received) = spawn_stub(StatusCode::OK).await;
        let host = HomeAssistantHost::new(&base_url, "secret", Duration::from_secs(5)).unwrap();

        let a = Reading::from_node(NodeReading::power_only("a", "Plug", 0.1)).to_entity();
        let b = Reading::from_node(NodeReading::power_only("b", "Plug", 0.2)).to_entity();
        host.add_entities(vec![a.clone(), b]).await.unwrap();
        host.publish(&a).await.unwrap();

        let ids: Vec<_> = received
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.entity_id.clone())
            .collect();
        assert_eq!(ids, vec!["sensor.power_plug", "sensor.power_plug_2", "sensor.power_plug"]);
    }

    #[tokio::test]
    async fn rejected_push_is_reported() {
        let (base_url, _received) = spawn_stub(StatusCode::UNAUTHORIZED).await;
        let host = HomeAssistantHost::new(&base_url, "wrong", Duration::from_secs(5)).unwrap();

        let res = host.add_entities(vec![smart_meter()]).await;
        assert!(matches!(res, Err(HostError::Rejected { status: 401, .. })));
    }

    #[tokio::test]
    async fn publish_before_registration_is_refused() {
        let host = HomeAssistantHost::new("http://127.0.0.1:9", "secret", Duration::from_secs(1)).unwrap();
        let res = host.publish(&smart_meter()).await;
        assert!(matches!(res, Err(HostError::Unregistered(_))));
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let res = HomeAssistantHost::new("http://ha:8123", " ", Duration::from_secs(1));
        assert!(matches!(res, Err(HostError::Config(_))));
    }

    #[test]
    fn unknown_power_is_sent_as_unknown_state() {
        let mut entity = smart_meter();
        entity.state = None;
        assert_eq!(StateUpdate::from_entity(&entity).state, "unknown");
    }
}
