use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Reading;

pub const UNIT_WATT: &str = "W";
pub const DEVICE_CLASS_POWER: &str = "power";

/// What a host platform sees of a `Reading`: a power sensor entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEntity {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub state: Option<i64>,
    pub unit_of_measurement: String,
    pub device_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, Value>>,
}

impl SensorEntity {
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            entity_id: entity_id_for(&reading.name),
            unique_id: reading.id.clone(),
            name: reading.name.clone(),
            state: reading.power_watts,
            unit_of_measurement: UNIT_WATT.to_string(),
            device_class: DEVICE_CLASS_POWER.to_string(),
            attributes: reading.attributes(),
        }
    }
}

/// `sensor.<slug>` where the slug is the lowercased name with every run of
/// non-alphanumeric characters collapsed into one underscore.
pub fn entity_id_for(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch);
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("unknown");
    }

    format!("sensor.{slug}")
}
