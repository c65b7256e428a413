//! Database models for devices, sensors and readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ResolvedIds;

/// A row from the `devices` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Auto-increment row ID.
    pub id: i64,
    /// Owning hub.
    pub hub_id: i64,
    /// Hardware-assigned id, unique within the hub.
    pub local_id: i64,
    /// Latest title reported by the hub.
    pub title: String,
    /// Free-form description.
    pub description: String,
}

/// A row from the `sensors` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    /// Auto-increment row ID.
    pub id: i64,
    /// Owning device.
    pub device_id: i64,
    /// Hardware-assigned id, unique within the device.
    pub local_id: i64,
    /// Sensor title.
    pub title: String,
    /// Free-form description.
    pub description: String,
}

/// A stored row from the `sensor_readings` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Auto-increment row ID.
    pub id: i64,
    /// Owning account.
    pub account_id: i64,
    /// Hub.
    pub hub_id: i64,
    /// Device.
    pub device_id: i64,
    /// Sensor.
    pub sensor_id: i64,
    /// Device-local id as reported on the wire.
    pub local_device_id: i64,
    /// Sensor-local id as reported on the wire.
    pub local_sensor_id: i64,
    /// Raw reported value.
    pub value: String,
    /// Server-side ingestion timestamp.
    pub created_at: DateTime<Utc>,
    /// Device-side timestamp, when the hub supplies one.
    pub user_time: Option<DateTime<Utc>>,
}

/// A reading ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReading {
    /// Persistent ids the reading is attributed to.
    pub ids: ResolvedIds,
    /// Device-local id as reported on the wire.
    pub local_device_id: i64,
    /// Sensor-local id as reported on the wire.
    pub local_sensor_id: i64,
    /// Raw reported value.
    pub value: String,
    /// Server-side ingestion timestamp.
    pub created_at: DateTime<Utc>,
    /// Device-side timestamp.
    pub user_time: Option<DateTime<Utc>>,
}

/// Find-or-create request for a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUpsert {
    /// Owning hub.
    pub hub_id: i64,
    /// Hardware-assigned id.
    pub local_id: i64,
    /// Title to store; always overwrites.
    pub title: String,
    /// Description used only on creation.
    pub description: String,
}

/// Find-or-create request for a sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorUpsert {
    /// Owning device.
    pub device_id: i64,
    /// Hardware-assigned id.
    pub local_id: i64,
    /// Title to store on creation.
    pub title: String,
    /// Whether an existing sensor's title is replaced by `title`.
    pub overwrite_title: bool,
    /// Description used only on creation.
    pub description: String,
}

/// Result of a find-or-create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Persistent id of the found or created row.
    pub id: i64,
    /// `true` if the row was inserted by this call.
    pub created: bool,
}
