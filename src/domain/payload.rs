//! Normalized, route-independent payload representation.

use std::collections::BTreeMap;

/// Decoded request payload: `local_device_id → local_sensor_id → value`.
///
/// Produced fresh for every request by a route decoder and discarded after
/// persistence. Ordered maps keep iteration deterministic, which keeps
/// batch inserts and logs stable across runs. Inserting the same
/// coordinate twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPayload {
    devices: BTreeMap<i64, BTreeMap<i64, String>>,
    skipped: usize,
}

impl DecodedPayload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` at `(device, sensor)`, replacing any previous value.
    pub fn insert(&mut self, device: i64, sensor: i64, value: impl Into<String>) {
        self.devices
            .entry(device)
            .or_default()
            .insert(sensor, value.into());
    }

    /// Adds to the count of tolerated, dropped sub-segments.
    pub fn record_skipped(&mut self, count: usize) {
        self.skipped = self.skipped.saturating_add(count);
    }

    /// Number of sub-segments dropped by tolerant decoding.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Returns the value at `(device, sensor)`, if any.
    #[must_use]
    pub fn get(&self, device: i64, sensor: i64) -> Option<&str> {
        self.devices
            .get(&device)
            .and_then(|sensors| sensors.get(&sensor))
            .map(String::as_str)
    }

    /// Returns the sensor map of a device, if any.
    #[must_use]
    pub fn device(&self, device: i64) -> Option<&BTreeMap<i64, String>> {
        self.devices.get(&device)
    }

    /// Iterates over device-local ids in ascending order.
    pub fn device_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.devices.keys().copied()
    }

    /// Iterates over `(device, sensor, value)` entries in ascending order.
    pub fn entries(&self) -> impl Iterator<Item = (i64, i64, &str)> + '_ {
        self.devices.iter().flat_map(|(device, sensors)| {
            sensors
                .iter()
                .map(move |(sensor, value)| (*device, *sensor, value.as_str()))
        })
    }

    /// Total number of `(device, sensor)` entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if no entry was decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
