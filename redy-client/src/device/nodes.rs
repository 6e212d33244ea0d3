use serde_json::Value;

use crate::domain::NodeReading;

pub const SECTION_REDYMETER: &str = "REDYMETER";
pub const SECTION_ZBENDPOINT: &str = "ZBENDPOINT";
pub const SECTION_EDPBOX: &str = "EDPBOX";

const KEY_NODES: &str = "NODES";
const KEY_ID: &str = "ID";
const KEY_NAME: &str = "NAME";
const KEY_POWER: &str = "EMETER:POWER_APLUS";

const KEY_SMARTMETER_ID: &str = "SMARTMETER_ID";
const KEY_LAST_COMMUNICATION: &str = "LAST_COMMUNICATION";
const KEY_ONLINE: &str = "ONLINE";
const KEY_VOLTAGE: &str = "EMETER:VOLTAGE_L1";
const KEY_CONTRACTED_POWER: &str = "CONTRACTED_POWER";

pub const SMART_METER_NAME: &str = "Smart Meter";

/// Problems found while walking a payload. None of them stop the walk.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExtractIssue {
    #[error("{section} section has no usable NODES list")]
    MalformedSection { section: &'static str },
    #[error("{section} node has no usable {field}; skipped")]
    MalformedNode {
        section: &'static str,
        field: &'static str,
    },
    #[error("EDPBOX smart meter is missing required field {0}")]
    SmartMeterMissingField(&'static str),
    #[error("EDPBOX smart meter field {field} has unusable value {value}")]
    SmartMeterInvalidField { field: &'static str, value: String },
}

impl ExtractIssue {
    /// The smart meter node is all-or-nothing, so losing it is unexpected;
    /// a single malformed plug is routine.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            Self::SmartMeterMissingField(_) | Self::SmartMeterInvalidField { .. }
        )
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("device payload is not a JSON object")]
pub struct NotAnObject;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extraction {
    pub nodes: Vec<NodeReading>,
    pub issues: Vec<ExtractIssue>,
}

/// Walk the three node sources of a device document, in order:
/// `REDYMETER[0].NODES`, every `ZBENDPOINT[*].NODES`, then `EDPBOX[0]` as the
/// synthetic smart meter node. Every source is optional.
pub fn extract_nodes(doc: &Value) -> Result<Extraction, NotAnObject> {
    if !doc.is_object() {
        return Err(NotAnObject);
    }

    let mut out = Extraction::default();

    if let Some(section) = first_entry(doc, SECTION_REDYMETER) {
        match section.get(KEY_NODES) {
            Some(nodes) => read_nodes(SECTION_REDYMETER, nodes, &mut out),
            None => out.issues.push(ExtractIssue::MalformedSection {
                section: SECTION_REDYMETER,
            }),
        }
    }

    if let Some(endpoints) = doc.get(SECTION_ZBENDPOINT).and_then(Value::as_array) {
        for endpoint in endpoints.iter().filter(|e| !e.is_null()) {
            if let Some(nodes) = endpoint.get(KEY_NODES) {
                read_nodes(SECTION_ZBENDPOINT, nodes, &mut out);
            }
        }
    }

    if let Some(section) = first_entry(doc, SECTION_EDPBOX) {
        match smart_meter(section) {
            Ok(node) => out.nodes.push(node),
            Err(issue) => out.issues.push(issue),
        }
    }

    Ok(out)
}

/// First element of a top-level list, if it carries anything at all.
fn first_entry<'a>(doc: &'a Value, section: &str) -> Option<&'a Value> {
    let first = doc.get(section)?.as_array()?.first()?;
    match first {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other),
    }
}

fn read_nodes(section: &'static str, nodes: &Value, out: &mut Extraction) {
    let Some(nodes) = nodes.as_array() else {
        out.issues.push(ExtractIssue::MalformedSection { section });
        return;
    };

    for node in nodes {
        // Nodes without a power reading are not meters.
        let Some(power) = node.get(KEY_POWER) else {
            continue;
        };

        let malformed = |field| ExtractIssue::MalformedNode { section, field };

        // A null reading is a meter with no value right now.
        let power_kw = match power {
            Value::Null => None,
            other => match number(other) {
                Some(kw) => Some(kw),
                None => {
                    out.issues.push(malformed(KEY_POWER));
                    continue;
                }
            },
        };
        let Some(id) = node.get(KEY_ID).and_then(text) else {
            out.issues.push(malformed(KEY_ID));
            continue;
        };
        let Some(name) = node.get(KEY_NAME).and_then(text) else {
            out.issues.push(malformed(KEY_NAME));
            continue;
        };

        out.nodes.push(NodeReading {
            id,
            name,
            power_kw,
            ..NodeReading::default()
        });
    }
}

fn smart_meter(section: &Value) -> Result<NodeReading, ExtractIssue> {
    let field = |key: &'static str| {
        section
            .get(key)
            .ok_or(ExtractIssue::SmartMeterMissingField(key))
    };

    let id_value = field(KEY_SMARTMETER_ID)?;
    let power = field(KEY_POWER)?;
    let last_communication = field(KEY_LAST_COMMUNICATION)?;
    let online = field(KEY_ONLINE)?;
    let voltage = field(KEY_VOLTAGE)?;
    let contracted_power = field(KEY_CONTRACTED_POWER)?;

    let id = text(id_value).ok_or_else(|| ExtractIssue::SmartMeterInvalidField {
        field: KEY_SMARTMETER_ID,
        value: id_value.to_string(),
    })?;

    Ok(NodeReading {
        id,
        name: SMART_METER_NAME.to_string(),
        power_kw: optional_number(KEY_POWER, power)?,
        voltage: optional_number(KEY_VOLTAGE, voltage)?,
        contracted_power_w: optional_number(KEY_CONTRACTED_POWER, contracted_power)?,
        last_communication: text(last_communication),
        online: text(online),
    })
}

/// Null means "no value"; anything else has to be numeric.
fn optional_number(field: &'static str, value: &Value) -> Result<Option<f64>, ExtractIssue> {
    if value.is_null() {
        return Ok(None);
    }
    number(value)
        .map(Some)
        .ok_or_else(|| ExtractIssue::SmartMeterInvalidField {
            field,
            value: value.to_string(),
        })
}

/// The device sends numbers as JSON strings, sometimes as plain numbers.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
