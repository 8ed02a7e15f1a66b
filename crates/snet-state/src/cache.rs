//! ---
//! snet_section: "03-state-history"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Current-state cache and sensor history."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{error, trace, warn};

use crate::reading::{ActuatorReading, DeviceKey, SensorReading, StateSnapshot};

/// Receives every actuator update applied to a [`StateCache`].
///
/// Sinks run synchronously on the thread that applied the update, which is the
/// session receive thread for network driven updates.
pub trait ActuatorSink: Send + Sync {
    /// Called after `reading` has been stored.
    fn on_actuator_update(&self, reading: &ActuatorReading) -> anyhow::Result<()>;
}

impl<F> ActuatorSink for F
where
    F: Fn(&ActuatorReading) -> anyhow::Result<()> + Send + Sync,
{
    fn on_actuator_update(&self, reading: &ActuatorReading) -> anyhow::Result<()> {
        self(reading)
    }
}

/// Latest-value cache keyed by `(node, device type)`.
///
/// Each table sits behind its own lock and entries are replaced whole, so a
/// concurrent snapshot never observes a half-written reading.
#[derive(Default)]
pub struct StateCache {
    sensors: RwLock<IndexMap<DeviceKey, SensorReading>>,
    actuators: RwLock<IndexMap<DeviceKey, ActuatorReading>>,
    sinks: RwLock<Vec<Arc<dyn ActuatorSink>>>,
}

impl fmt::Debug for StateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCache")
            .field("sensors", &self.sensors.read().len())
            .field("actuators", &self.actuators.read().len())
            .field("sinks", &self.sinks.read().len())
            .finish()
    }
}

impl StateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sensor reading, replacing any earlier one for the same key.
    pub fn apply_sensor(
        &self,
        node_id: &str,
        sensor_type: &str,
        value: f64,
        unit: Option<&str>,
        timestamp: DateTime<Utc>,
    ) {
        let reading = SensorReading {
            node_id: node_id.to_owned(),
            sensor_type: sensor_type.to_owned(),
            value,
            unit: unit.map(str::to_owned),
            timestamp,
        };
        trace!(node = node_id, sensor = sensor_type, value, "sensor reading applied");
        self.sensors.write().insert(reading.key(), reading);
    }

    /// Store an actuator state, then notify every sink in registration order.
    ///
    /// A sink that fails or panics is logged and skipped; the stored state and
    /// the remaining sinks are unaffected.
    pub fn apply_actuator(
        &self,
        node_id: &str,
        actuator_type: &str,
        state: &str,
        timestamp: DateTime<Utc>,
    ) {
        let reading = ActuatorReading {
            node_id: node_id.to_owned(),
            actuator_type: actuator_type.to_owned(),
            state: state.to_owned(),
            timestamp,
        };
        self.actuators
            .write()
            .insert(reading.key(), reading.clone());
        trace!(node = node_id, actuator = actuator_type, state, "actuator state applied");
        self.notify(&reading);
    }

    fn notify(&self, reading: &ActuatorReading) {
        // copy the list so sinks may (de)register without deadlocking
        let sinks = self.sinks.read().clone();
        for (index, sink) in sinks.iter().enumerate() {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| sink.on_actuator_update(reading)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    sink = index,
                    node = %reading.node_id,
                    actuator = %reading.actuator_type,
                    error = %err,
                    "actuator sink failed"
                ),
                Err(_) => error!(
                    sink = index,
                    node = %reading.node_id,
                    actuator = %reading.actuator_type,
                    "actuator sink panicked"
                ),
            }
        }
    }

    /// Deep copy of both tables taken under their read locks.
    pub fn snapshot(&self) -> StateSnapshot {
        let sensors = self.sensors.read();
        let actuators = self.actuators.read();
        StateSnapshot {
            sensors: sensors.values().cloned().collect(),
            actuators: actuators.values().cloned().collect(),
        }
    }

    /// Latest reading for one sensor.
    pub fn sensor(&self, node_id: &str, sensor_type: &str) -> Option<SensorReading> {
        self.sensors
            .read()
            .get(&DeviceKey::new(node_id, sensor_type))
            .cloned()
    }

    /// Latest state of one actuator.
    pub fn actuator(&self, node_id: &str, actuator_type: &str) -> Option<ActuatorReading> {
        self.actuators
            .read()
            .get(&DeviceKey::new(node_id, actuator_type))
            .cloned()
    }

    /// Number of distinct sensors seen.
    pub fn sensor_count(&self) -> usize {
        self.sensors.read().len()
    }

    /// Number of distinct actuators seen.
    pub fn actuator_count(&self) -> usize {
        self.actuators.read().len()
    }

    /// Register a sink. Registering the same `Arc` twice is a no-op.
    pub fn add_actuator_sink(&self, sink: Arc<dyn ActuatorSink>) {
        let mut sinks = self.sinks.write();
        if !sinks.iter().any(|existing| same_sink(existing, &sink)) {
            sinks.push(sink);
        }
    }

    /// Unregister a sink by identity; returns whether it was registered.
    pub fn remove_actuator_sink(&self, sink: &Arc<dyn ActuatorSink>) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|existing| !same_sink(existing, sink));
        sinks.len() != before
    }

    /// Drop all readings; sinks stay registered.
    pub fn clear(&self) {
        self.sensors.write().clear();
        self.actuators.write().clear();
    }
}

fn same_sink(a: &Arc<dyn ActuatorSink>, b: &Arc<dyn ActuatorSink>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
