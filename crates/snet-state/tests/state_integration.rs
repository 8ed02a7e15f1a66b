//! ---
//! snet_section: "03-state-history"
//! snet_subsection: "integration-tests"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Current-state cache and sensor history."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use snet_state::{history_key, ActuatorReading, HistoryAggregator, StateCache, Statistics};

#[test]
fn snapshot_serialises_for_ui_layers() {
    let cache = StateCache::new();
    let at = Utc.timestamp_millis_opt(1_700_000_000_000).single().expect("ts");
    cache.apply_sensor("7", "temperature", 22.5, Some("C"), at);
    cache.apply_actuator("7", "heater", "ON", at);

    let value = serde_json::to_value(cache.snapshot()).expect("serialise");
    assert_eq!(value["sensors"][0]["node_id"], "7");
    assert_eq!(value["sensors"][0]["value"], 22.5);
    assert_eq!(value["sensors"][0]["unit"], "C");
    assert_eq!(value["actuators"][0]["state"], "ON");
}

#[test]
fn empty_statistics_serialise_as_nulls() {
    let value = serde_json::to_value(Statistics::EMPTY).expect("serialise");
    assert!(value["min"].is_null());
    assert!(value["average"].is_null());
}

#[test]
fn sink_driven_history_matches_cache() {
    let cache = StateCache::new();
    let history = Arc::new(HistoryAggregator::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let recorded = Arc::clone(&seen);
    cache.add_actuator_sink(Arc::new(move |reading: &ActuatorReading| -> anyhow::Result<()> {
        recorded.lock().push(reading.state.clone());
        Ok(())
    }));

    let now = Utc::now();
    for (offset, value) in [(30, 18.0), (20, 19.0), (10, 23.0)] {
        let at = now - Duration::minutes(offset);
        cache.apply_sensor("7", "temperature", value, Some("C"), at);
        history.add_reading(&history_key("7", "temperature"), value, at);
    }
    cache.apply_actuator("7", "heater", "OFF", now);

    let stats = history.get_statistics_at("7/temperature", now);
    assert_eq!(stats.min, 18.0);
    assert_eq!(stats.max, 23.0);
    assert_eq!(stats.average, 20.0);
    assert_eq!(cache.sensor("7", "temperature").map(|r| r.value), Some(23.0));
    assert_eq!(*seen.lock(), vec!["OFF".to_owned()]);
}
