use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use super::{NodeReading, SensorEntity};

pub const ONLINE_TRUE: &str = "TRUE";
pub const ONLINE_FALSE: &str = "FALSE";

const ICON_ONLINE: &str = "mdi:cloud-outline";
const ICON_OFFLINE: &str = "mdi:cloud-off-outline";

/// Latest known values for one metering node, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub id: String,
    pub name: String,
    pub power_watts: Option<i64>,
    pub voltage: Option<i64>,
    pub contracted_power_kw: Option<f64>,
    pub last_communication: Option<String>,
    pub online: Option<String>,
}

impl Reading {
    pub fn from_node(node: NodeReading) -> Self {
        let mut reading = Self {
            id: node.id.clone(),
            name: format!("Power {}", node.name),
            power_watts: None,
            voltage: None,
            contracted_power_kw: None,
            last_communication: None,
            online: None,
        };
        reading.apply(node);
        reading
    }

    /// Overwrite the mutable fields with a newer sighting of the same node.
    ///
    /// `id` and `name` never change once the reading exists.
    pub fn apply(&mut self, node: NodeReading) {
        self.power_watts = node.power_kw.map(kw_to_watts);
        self.voltage = node.voltage.map(|v| v.round_ties_even() as i64);
        self.contracted_power_kw = node.contracted_power_w.map(watts_to_kw);
        self.last_communication = node.last_communication;
        self.online = node.online;
    }

    pub fn is_online(&self) -> Option<bool> {
        match self.online.as_deref() {
            Some(ONLINE_TRUE) => Some(true),
            Some(ONLINE_FALSE) => Some(false),
            _ => None,
        }
    }

    /// State attributes shown next to the power value.
    ///
    /// Nothing is reported until the device has sent a last-communication
    /// timestamp, and the online details only when the flag is known.
    pub fn attributes(&self) -> Option<BTreeMap<String, Value>> {
        let last_comm = self.last_communication.as_ref().filter(|s| !s.is_empty())?;

        let mut attrs = BTreeMap::new();
        attrs.insert("last_communication".to_string(), json!(last_comm));

        if let Some(online) = self.is_online() {
            let icon = if online { ICON_ONLINE } else { ICON_OFFLINE };
            attrs.insert("online".to_string(), json!(self.online));
            attrs.insert("icon".to_string(), json!(icon));
            attrs.insert("voltage".to_string(), json!(self.voltage));
        }

        Some(attrs)
    }

    pub fn to_entity(&self) -> SensorEntity {
        SensorEntity::from_reading(self)
    }
}

fn kw_to_watts(kw: f64) -> i64 {
    (kw * 1000.0).round_ties_even() as i64
}

fn watts_to_kw(w: f64) -> f64 {
    (w / 1000.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn smart_meter() -> NodeReading {
        NodeReading {
            id: "5".to_string(),
            name: "Smart Meter".to_string(),
            power_kw: Some(1.234),
            voltage: Some(230.4),
            contracted_power_w: Some(6900.0),
            last_communication: Some("t1".to_string()),
            online: Some("TRUE".to_string()),
        }
    }

    #[test]
    fn converts_device_units() {
        let reading = Reading::from_node(smart_meter());

        assert_eq!(
            reading,
            Reading {
                id: "5".to_string(),
                name: "Power Smart Meter".to_string(),
                power_watts: Some(1234),
                voltage: Some(230),
                contracted_power_kw: Some(6.9),
                last_communication: Some("t1".to_string()),
                online: Some("TRUE".to_string()),
            }
        );
    }

    #[test]
    fn power_only_node_leaves_details_empty() {
        let reading = Reading::from_node(NodeReading::power_only("n1", "Plug", 0.5));

        assert_eq!(reading.name, "Power Plug");
        assert_eq!(reading.power_watts, Some(500));
        assert_eq!(reading.voltage, None);
        assert_eq!(reading.contracted_power_kw, None);
        assert!(reading.attributes().is_none());
    }

    #[test]
    fn contracted_power_rounds_to_two_decimals() {
        let mut node = smart_meter();
        node.contracted_power_w = Some(10351.0);
        let reading = Reading::from_node(node);
        assert_eq!(reading.contracted_power_kw, Some(10.35));
    }

    #[test]
    fn halves_round_to_even() {
        let mut node = smart_meter();
        node.power_kw = Some(0.0025);
        node.voltage = Some(230.5);
        let reading = Reading::from_node(node);

        assert_eq!(reading.power_watts, Some(2));
        assert_eq!(reading.voltage, Some(230));

        let mut node = smart_meter();
        node.power_kw = Some(0.0035);
        node.voltage = Some(231.5);
        let reading = Reading::from_node(node);

        assert_eq!(reading.power_watts, Some(4));
        assert_eq!(reading.voltage, Some(232));
    }

    #[test]
    fn empty_last_communication_reports_no_attributes() {
        let mut node = smart_meter();
        node.last_communication = Some(String::new());
        assert!(Reading::from_node(node).attributes().is_none());
    }

    #[test]
    fn apply_overwrites_values_but_keeps_identity() {
        let mut reading = Reading::from_node(smart_meter());

        let mut newer = NodeReading::power_only("5", "Renamed", 0.1);
        newer.online = Some("FALSE".to_string());
        reading.apply(newer);

        assert_eq!(reading.id, "5");
        assert_eq!(reading.name, "Power Smart Meter");
        assert_eq!(reading.power_watts, Some(100));
        assert_eq!(reading.voltage, None);
        assert_eq!(reading.last_communication, None);
        assert_eq!(reading.online.as_deref(), Some("FALSE"));
    }

    #[test]
    fn online_reading_reports_cloud_icon_and_voltage() {
        let attrs = Reading::from_node(smart_meter()).attributes().unwrap();

        assert_eq!(attrs["last_communication"], json!("t1"));
        assert_eq!(attrs["online"], json!("TRUE"));
        assert_eq!(attrs["icon"], json!("mdi:cloud-outline"));
        assert_eq!(attrs["voltage"], json!(230));
    }

    #[test]
    fn offline_reading_reports_cloud_off_icon() {
        let mut node = smart_meter();
        node.online = Some("FALSE".to_string());
        let attrs = Reading::from_node(node).attributes().unwrap();

        assert_eq!(attrs["icon"], json!("mdi:cloud-off-outline"));
    }

    #[test]
    fn unknown_online_flag_reports_only_last_communication() {
        let mut node = smart_meter();
        node.online = Some("MAYBE".to_string());
        let attrs = Reading::from_node(node).attributes().unwrap();

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["last_communication"], json!("t1"));
    }
}
