//! ---
//! snet_section: "03-state-history"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Current-state cache and sensor history."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! In-memory state kept by a SensorNet client.
//!
//! [`StateCache`] holds the latest reading per device and notifies actuator
//! sinks; [`HistoryAggregator`] keeps a 24 hour window of sensor values per key
//! and answers min/max/mean queries over it.

pub mod cache;
pub mod history;
pub mod reading;

pub use cache::{ActuatorSink, StateCache};
pub use history::{history_key, HistoryAggregator, HistoryPoint, Statistics, DEFAULT_RETENTION};
pub use reading::{ActuatorReading, DeviceKey, SensorReading, StateSnapshot};
