//! ---
//! snet_section: "03-state-history"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Current-state cache and sensor history."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Window kept by [`HistoryAggregator::new`].
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Series key for one sensor on one node.
pub fn history_key(node_id: &str, sensor_key: &str) -> String {
    format!("{node_id}/{sensor_key}")
}

/// One retained sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    /// Sample value.
    pub value: f64,
    /// Sample time.
    pub timestamp: DateTime<Utc>,
}

/// Exact min/max/mean over the retained samples of one key.
///
/// [`Statistics::EMPTY`] (all NaN) stands for "no samples"; it compares equal
/// to itself.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Statistics {
    /// Smallest retained value.
    pub min: f64,
    /// Largest retained value.
    pub max: f64,
    /// Arithmetic mean of the retained values.
    pub average: f64,
}

impl Statistics {
    /// Sentinel for a key with no retained samples.
    pub const EMPTY: Statistics = Statistics {
        min: f64::NAN,
        max: f64::NAN,
        average: f64::NAN,
    };

    /// True for the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.min.is_nan() && self.max.is_nan() && self.average.is_nan()
    }

    fn over(points: &[HistoryPoint]) -> Self {
        if points.is_empty() {
            return Self::EMPTY;
        }
        let min = points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min);
        let max = points
            .iter()
            .map(|p| p.value)
            .fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = points.iter().map(|p| p.value).sum();
        Self {
            min,
            max,
            average: sum / points.len() as f64,
        }
    }
}

impl PartialEq for Statistics {
    fn eq(&self, other: &Self) -> bool {
        fn same(a: f64, b: f64) -> bool {
            a == b || (a.is_nan() && b.is_nan())
        }
        same(self.min, other.min) && same(self.max, other.max) && same(self.average, other.average)
    }
}

/// Append-only sensor series with a lazily enforced retention window.
///
/// Samples are only pruned when statistics are requested for their key, so
/// [`reading_count`](Self::get_reading_count) can include expired samples
/// until the next query.
#[derive(Debug)]
pub struct HistoryAggregator {
    retention: Duration,
    series: Mutex<HashMap<String, Vec<HistoryPoint>>>,
}

impl Default for HistoryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryAggregator {
    /// Aggregator with the 24 hour window.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Aggregator with a custom window.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention,
            series: Mutex::new(HashMap::new()),
        }
    }

    /// Configured retention window.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Append a sample; nothing is evicted here.
    pub fn add_reading(&self, key: &str, value: f64, timestamp: DateTime<Utc>) {
        self.series
            .lock()
            .entry(key.to_owned())
            .or_default()
            .push(HistoryPoint { value, timestamp });
    }

    /// Prune `key` against the current time, then summarise what is left.
    pub fn get_statistics(&self, key: &str) -> Statistics {
        self.get_statistics_at(key, Utc::now())
    }

    /// Prune `key` against `now`, then summarise what is left.
    pub fn get_statistics_at(&self, key: &str, now: DateTime<Utc>) -> Statistics {
        let mut series = self.series.lock();
        let Some(points) = series.get_mut(key) else {
            return Statistics::EMPTY;
        };

        if let Some(cutoff) = self.cutoff(now) {
            let before = points.len();
            points.retain(|p| p.timestamp >= cutoff);
            let pruned = before - points.len();
            if pruned > 0 {
                debug!(key, pruned, retained = points.len(), "pruned expired history");
            }
        }

        let stats = Statistics::over(points);
        if points.is_empty() {
            series.remove(key);
        }
        stats
    }

    /// Stored samples for `key`, including any not yet pruned.
    pub fn get_reading_count(&self, key: &str) -> usize {
        self.series.lock().get(key).map_or(0, Vec::len)
    }

    /// Copy of the stored samples for `key`, oldest append first.
    pub fn readings(&self, key: &str) -> Vec<HistoryPoint> {
        self.series.lock().get(key).cloned().unwrap_or_default()
    }

    /// Keys with at least one stored sample, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.series.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop every series.
    pub fn clear(&self) {
        self.series.lock().clear();
    }

    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let window = chrono::Duration::from_std(self.retention).ok()?;
        now.checked_sub_signed(window)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;

    #[test]
    fn statistics_over_window() {
        let history = HistoryAggregator::new();
        let now = Utc::now();
        for value in [10.0, 20.0, 30.0] {
            history.add_reading("7/temperature", value, now);
        }
        let stats = history.get_statistics("7/temperature");
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.average, 20.0);
    }

    #[test]
    fn unknown_key_is_empty() {
        let history = HistoryAggregator::new();
        let stats = history.get_statistics("nope");
        assert!(stats.is_empty());
        assert_eq!(stats, Statistics::EMPTY);
        assert_eq!(history.get_reading_count("nope"), 0);
    }

    #[test]
    fn expired_samples_count_until_a_query_prunes_them() {
        let history = HistoryAggregator::new();
        let now = Utc::now();
        history.add_reading("k", 100.0, now - ChronoDuration::hours(25));
        history.add_reading("k", 4.0, now - ChronoDuration::hours(1));
        history.add_reading("k", 6.0, now);

        assert_eq!(history.get_reading_count("k"), 3);
        let stats = history.get_statistics_at("k", now);
        assert_eq!(stats.max, 6.0);
        assert_eq!(stats.average, 5.0);
        assert_eq!(history.get_reading_count("k"), 2);
    }

    #[test]
    fn repeated_queries_are_idempotent() {
        let history = HistoryAggregator::new();
        let now = Utc::now();
        history.add_reading("k", 1.0, now - ChronoDuration::hours(30));
        history.add_reading("k", 2.0, now);
        let first = history.get_statistics_at("k", now);
        let second = history.get_statistics_at("k", now);
        assert_eq!(first, second);

        history.add_reading("old", 1.0, now - ChronoDuration::hours(48));
        let first = history.get_statistics_at("old", now);
        let second = history.get_statistics_at("old", now);
        assert!(first.is_empty());
        assert_eq!(first, second);
        assert!(!history.keys().contains(&"old".to_owned()));
    }

    #[test]
    fn custom_retention_window() {
        let history = HistoryAggregator::with_retention(Duration::from_secs(60));
        let now = Utc::now();
        history.add_reading("k", 1.0, now - ChronoDuration::seconds(61));
        history.add_reading("k", 3.0, now - ChronoDuration::seconds(59));
        assert_eq!(history.get_statistics_at("k", now).min, 3.0);
        assert_eq!(history.retention(), Duration::from_secs(60));
    }

    #[test]
    fn clear_drops_every_series() {
        let history = HistoryAggregator::new();
        history.add_reading(&history_key("7", "temperature"), 1.0, Utc::now());
        history.add_reading(&history_key("8", "humidity"), 1.0, Utc::now());
        assert_eq!(history.keys(), ["7/temperature", "8/humidity"]);
        history.clear();
        assert!(history.keys().is_empty());
        assert_eq!(history.get_reading_count("7/temperature"), 0);
    }

    #[test]
    fn concurrent_appends_and_queries() {
        let history = std::sync::Arc::new(HistoryAggregator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let history = std::sync::Arc::clone(&history);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        history.add_reading("k", f64::from(i), Utc::now());
                        let _ = history.get_statistics("k");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker");
        }
        assert_eq!(history.get_reading_count("k"), 1000);
        let stats = history.get_statistics("k");
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 249.0);
    }
}
