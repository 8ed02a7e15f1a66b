//! ---
//! snet_section: "03-state-history"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Current-state cache and sensor history."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cache key: one device type on one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceKey {
    /// Owning node.
    pub node_id: String,
    /// Sensor or actuator type on that node.
    pub device_type: String,
}

impl DeviceKey {
    /// Build a key from its parts.
    pub fn new(node_id: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            device_type: device_type.into(),
        }
    }
}

/// Latest value reported by one sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    /// Reporting node.
    pub node_id: String,
    /// Sensor type, e.g. `temperature`.
    pub sensor_type: String,
    /// Numeric reading.
    pub value: f64,
    /// Unit, when the node sent one.
    pub unit: Option<String>,
    /// When the reading was taken (or received, if the node sent no time).
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Cache key of this reading.
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.node_id.clone(), self.sensor_type.clone())
    }
}

/// Latest state reported for one actuator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActuatorReading {
    /// Owning node.
    pub node_id: String,
    /// Actuator type, e.g. `heater`.
    pub actuator_type: String,
    /// Textual state, e.g. `ON` or a set point.
    pub state: String,
    /// When the state was applied.
    pub timestamp: DateTime<Utc>,
}

impl ActuatorReading {
    /// Cache key of this reading.
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.node_id.clone(), self.actuator_type.clone())
    }
}

/// Owned copy of the cache contents at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateSnapshot {
    /// Sensor readings in first-seen order of their keys.
    pub sensors: Vec<SensorReading>,
    /// Actuator readings in first-seen order of their keys.
    pub actuators: Vec<ActuatorReading>,
}

impl StateSnapshot {
    /// Find the reading for one sensor.
    pub fn sensor(&self, node_id: &str, sensor_type: &str) -> Option<&SensorReading> {
        self.sensors
            .iter()
            .find(|r| r.node_id == node_id && r.sensor_type == sensor_type)
    }

    /// Find the state of one actuator.
    pub fn actuator(&self, node_id: &str, actuator_type: &str) -> Option<&ActuatorReading> {
        self.actuators
            .iter()
            .find(|r| r.node_id == node_id && r.actuator_type == actuator_type)
    }

    /// True when neither table holds an entry.
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty() && self.actuators.is_empty()
    }
}
