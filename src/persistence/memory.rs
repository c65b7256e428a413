//! In-process implementation of the persistence layer.
//!
//! Used when `PERSISTENCE_ENABLED=false` and as the store behind the test
//! suite. Uniqueness of `(hub_id, local_id)` and `(device_id, local_id)` is
//! enforced under a single write lock, so find-or-create is atomic just as
//! with the `ON CONFLICT` statements of the Postgres store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::TelemetryStore;
use super::models::{
    Device, DeviceUpsert, NewReading, Reading, Sensor, SensorUpsert, UpsertOutcome,
};
use crate::domain::{HardwareCredential, HubRef, IdentityTuple};
use crate::error::IngestError;

#[derive(Debug, Clone)]
struct AccountRow {
    id: i64,
    user_token: String,
}

#[derive(Debug, Clone)]
struct HubRow {
    id: i64,
    account_id: i64,
    hardware_token: String,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: Vec<AccountRow>,
    hubs: Vec<HubRow>,
    devices: Vec<Device>,
    sensors: Vec<Sensor>,
    readings: Vec<Reading>,
}

impl Tables {
    fn hub_for(&self, credential: &HardwareCredential) -> Option<HubRef> {
        let hub = self
            .hubs
            .iter()
            .find(|h| h.hardware_token == credential.hardware_token())?;
        self.accounts
            .iter()
            .find(|a| a.id == hub.account_id && a.user_token == credential.user_token())
            .map(|_| HubRef {
                account_id: hub.account_id,
                hub_id: hub.id,
            })
    }
}

fn next_id(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX).saturating_add(1)
}

/// Store keeping all tables in memory behind a [`RwLock`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provisions an account owning `user_token`, returning its id.
    pub async fn register_account(&self, user_token: &str) -> i64 {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.accounts.iter().find(|a| a.user_token == user_token) {
            return existing.id;
        }
        let id = next_id(tables.accounts.len());
        tables.accounts.push(AccountRow {
            id,
            user_token: user_token.to_string(),
        });
        id
    }

    /// Provisions a hub for an account, returning its id.
    pub async fn register_hub(&self, account_id: i64, hardware_token: &str) -> i64 {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .hubs
            .iter()
            .find(|h| h.hardware_token == hardware_token)
        {
            return existing.id;
        }
        let id = next_id(tables.hubs.len());
        tables.hubs.push(HubRow {
            id,
            account_id,
            hardware_token: hardware_token.to_string(),
        });
        id
    }

    /// Returns every stored reading in insertion order.
    pub async fn readings(&self) -> Vec<Reading> {
        self.tables.read().await.readings.clone()
    }

    /// Returns the number of stored devices across all hubs.
    pub async fn device_count(&self) -> usize {
        self.tables.read().await.devices.len()
    }

    /// Returns the number of stored sensors across all devices.
    pub async fn sensor_count(&self) -> usize {
        self.tables.read().await.sensors.len()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn identities_for(
        &self,
        credential: &HardwareCredential,
    ) -> Result<Vec<IdentityTuple>, IngestError> {
        let tables = self.tables.read().await;
        let Some(hub) = tables.hub_for(credential) else {
            return Ok(Vec::new());
        };

        let mut tuples = Vec::new();
        for device in tables.devices.iter().filter(|d| d.hub_id == hub.hub_id) {
            for sensor in tables.sensors.iter().filter(|s| s.device_id == device.id) {
                tuples.push(IdentityTuple {
                    account_id: hub.account_id,
                    hub_id: hub.hub_id,
                    device_id: device.id,
                    sensor_id: sensor.id,
                    local_device_id: device.local_id,
                    local_sensor_id: sensor.local_id,
                });
            }
        }
        Ok(tuples)
    }

    async fn hub_for(
        &self,
        credential: &HardwareCredential,
    ) -> Result<Option<HubRef>, IngestError> {
        Ok(self.tables.read().await.hub_for(credential))
    }

    async fn upsert_device(&self, upsert: &DeviceUpsert) -> Result<UpsertOutcome, IngestError> {
        let mut tables = self.tables.write().await;
        if let Some(device) = tables
            .devices
            .iter_mut()
            .find(|d| d.hub_id == upsert.hub_id && d.local_id == upsert.local_id)
        {
            device.title.clone_from(&upsert.title);
            return Ok(UpsertOutcome {
                id: device.id,
                created: false,
            });
        }

        let id = next_id(tables.devices.len());
        tables.devices.push(Device {
            id,
            hub_id: upsert.hub_id,
            local_id: upsert.local_id,
            title: upsert.title.clone(),
            description: upsert.description.clone(),
        });
        Ok(UpsertOutcome { id, created: true })
    }

    async fn find_device(&self, hub_id: i64, local_id: i64) -> Result<Option<i64>, IngestError> {
        Ok(self
            .tables
            .read()
            .await
            .devices
            .iter()
            .find(|d| d.hub_id == hub_id && d.local_id == local_id)
            .map(|d| d.id))
    }

    async fn upsert_sensor(&self, upsert: &SensorUpsert) -> Result<UpsertOutcome, IngestError> {
        let mut tables = self.tables.write().await;
        if let Some(sensor) = tables
            .sensors
            .iter_mut()
            .find(|s| s.device_id == upsert.device_id && s.local_id == upsert.local_id)
        {
            if upsert.overwrite_title {
                sensor.title.clone_from(&upsert.title);
            }
            return Ok(UpsertOutcome {
                id: sensor.id,
                created: false,
            });
        }

        let id = next_id(tables.sensors.len());
        tables.sensors.push(Sensor {
            id,
            device_id: upsert.device_id,
            local_id: upsert.local_id,
            title: upsert.title.clone(),
            description: upsert.description.clone(),
        });
        Ok(UpsertOutcome { id, created: true })
    }

    async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64, IngestError> {
        let mut tables = self.tables.write().await;
        for reading in readings {
            let id = next_id(tables.readings.len());
            tables.readings.push(Reading {
                id,
                account_id: reading.ids.account_id,
                hub_id: reading.ids.hub_id,
                device_id: reading.ids.device_id,
                sensor_id: reading.ids.sensor_id,
                local_device_id: reading.local_device_id,
                local_sensor_id: reading.local_sensor_id,
                value: reading.value.clone(),
                created_at: reading.created_at,
                user_time: reading.user_time,
            });
        }
        Ok(u64::try_from(readings.len()).unwrap_or(u64::MAX))
    }

    async fn devices_of_hub(&self, hub_id: i64) -> Result<Vec<Device>, IngestError> {
        let tables = self.tables.read().await;
        let mut devices: Vec<Device> = tables
            .devices
            .iter()
            .filter(|d| d.hub_id == hub_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(devices)
    }

    async fn sensors_of_device(&self, device_id: i64) -> Result<Vec<Sensor>, IngestError> {
        let tables = self.tables.read().await;
        let mut sensors: Vec<Sensor> = tables
            .sensors
            .iter()
            .filter(|s| s.device_id == device_id)
            .cloned()
            .collect();
        sensors.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(sensors)
    }

    async fn latest_readings(
        &self,
        sensor_id: i64,
        limit: i64,
    ) -> Result<Vec<Reading>, IngestError> {
        let tables = self.tables.read().await;
        let mut readings: Vec<Reading> = tables
            .readings
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .cloned()
            .collect();
        readings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        readings.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(readings)
    }
}
