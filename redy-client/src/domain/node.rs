/// One metering node as the device reports it, before unit conversion.
///
/// Power comes in kW and contracted power in W; `Reading` converts both.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeReading {
    pub id: String,
    pub name: String,
    pub power_kw: Option<f64>,
    pub voltage: Option<f64>,
    pub contracted_power_w: Option<f64>,
    pub last_communication: Option<String>,
    pub online: Option<String>,
}

impl NodeReading {
    /// A plug or zigbee endpoint node: only identity and power are known.
    pub fn power_only(id: impl Into<String>, name: impl Into<String>, power_kw: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            power_kw: Some(power_kw),
            ..Self::default()
        }
    }
}
