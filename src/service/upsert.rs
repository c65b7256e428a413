//! Find-or-create of devices and sensors reported by a hub.

use std::sync::Arc;

use crate::error::IngestError;
use crate::persistence::TelemetryStore;
use crate::persistence::models::{DeviceUpsert, SensorUpsert, UpsertOutcome};

/// Placeholder description stored with a newly created device.
#[must_use]
pub fn device_description(title: &str) -> String {
    format!("Description of the {title}")
}

/// Placeholder title of a sensor registered without one.
#[must_use]
pub fn sensor_placeholder_title(local_sensor_id: i64) -> String {
    format!("Sensor {local_sensor_id}")
}

/// Placeholder description stored with a newly created sensor.
#[must_use]
pub fn sensor_description(local_sensor_id: i64) -> String {
    format!("Description of the sensor {local_sensor_id}")
}

/// Registers devices and sensors under a resolved hub.
///
/// Both operations are idempotent per `(scope, local_id)`: a repeat call
/// returns the existing row id and only touches its title.
#[derive(Debug, Clone)]
pub struct UpsertEngine {
    store: Arc<dyn TelemetryStore>,
}

impl UpsertEngine {
    /// Creates an engine writing through `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Creates the device `(hub_id, local_id)` or renames it to `title`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] if the store rejects the
    /// statement.
    pub async fn upsert_device(
        &self,
        hub_id: i64,
        local_id: i64,
        title: &str,
    ) -> Result<UpsertOutcome, IngestError> {
        let outcome = self
            .store
            .upsert_device(&DeviceUpsert {
                hub_id,
                local_id,
                title: title.to_string(),
                description: device_description(title),
            })
            .await?;
        tracing::debug!(
            hub_id,
            local_id,
            device_id = outcome.id,
            created = outcome.created,
            "device upserted"
        );
        Ok(outcome)
    }

    /// Creates the sensor `local_sensor_id` on device `local_device_id` of
    /// the hub, or updates its title.
    ///
    /// An empty `reported` title registers the sensor under a placeholder
    /// and leaves the title of an existing sensor untouched.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::NoIdentityMatch`] if the hub has no device
    /// `local_device_id`, or [`IngestError::PersistenceFailure`] if the
    /// store rejects the statement.
    pub async fn upsert_sensor(
        &self,
        hub_id: i64,
        local_device_id: i64,
        local_sensor_id: i64,
        reported: &str,
    ) -> Result<UpsertOutcome, IngestError> {
        let device_id = self
            .store
            .find_device(hub_id, local_device_id)
            .await?
            .ok_or_else(|| {
                IngestError::NoIdentityMatch(format!(
                    "hub {hub_id} has no device {local_device_id}"
                ))
            })?;

        let (title, overwrite_title) = if reported.is_empty() {
            (sensor_placeholder_title(local_sensor_id), false)
        } else {
            (reported.to_string(), true)
        };

        let outcome = self
            .store
            .upsert_sensor(&SensorUpsert {
                device_id,
                local_id: local_sensor_id,
                title,
                overwrite_title,
                description: sensor_description(local_sensor_id),
            })
            .await?;
        tracing::debug!(
            device_id,
            local_sensor_id,
            sensor_id = outcome.id,
            created = outcome.created,
            "sensor upserted"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn engine() -> (Arc<MemoryStore>, UpsertEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = UpsertEngine::new(Arc::clone(&store) as Arc<dyn TelemetryStore>);
        (store, engine)
    }

    #[tokio::test]
    async fn device_upsert_keeps_id_and_takes_latest_title() {
        let (store, engine) = engine();
        let Ok(first) = engine.upsert_device(1, 2, "Aquarium").await else {
            panic!("create");
        };
        let Ok(second) = engine.upsert_device(1, 2, "Reef tank").await else {
            panic!("update");
        };
        assert_eq!(first.id, second.id);
        assert!(first.created && !second.created);

        let Ok(devices) = store.devices_of_hub(1).await else {
            panic!("list");
        };
        assert_eq!(devices.len(), 1);
        assert!(devices.iter().all(|d| d.title == "Reef tank"));
        assert!(devices.iter().all(|d| d.description == "Description of the Aquarium"));
    }

    #[tokio::test]
    async fn sensor_requires_known_device() {
        let (_, engine) = engine();
        assert!(matches!(
            engine.upsert_sensor(1, 4, 1, "").await,
            Err(IngestError::NoIdentityMatch(_))
        ));
    }

    #[tokio::test]
    async fn placeholder_title_never_replaces_reported_one() {
        let (store, engine) = engine();
        let Ok(device) = engine.upsert_device(1, 4, "Sump").await else {
            panic!("device");
        };

        let Ok(created) = engine.upsert_sensor(1, 4, 2, "").await else {
            panic!("register");
        };
        assert!(created.created);
        let Ok(sensors) = store.sensors_of_device(device.id).await else {
            panic!("list");
        };
        assert!(sensors.iter().all(|s| s.title == "Sensor 2"));
        assert!(sensors.iter().all(|s| s.description == "Description of the sensor 2"));

        assert!(engine.upsert_sensor(1, 4, 2, "Temperature").await.is_ok());
        assert!(engine.upsert_sensor(1, 4, 2, "").await.is_ok());
        let Ok(sensors) = store.sensors_of_device(device.id).await else {
            panic!("list");
        };
        assert_eq!(sensors.len(), 1);
        assert!(sensors.iter().all(|s| s.title == "Temperature"));
    }
}
