//! Persistence layer: identity lookups, device/sensor upserts, readings.
//!
//! Provides the [`TelemetryStore`] trait, the single gateway the ingestion
//! pipeline uses to reach storage. [`postgres::PostgresStore`] backs it with
//! `sqlx::PgPool`; [`memory::MemoryStore`] keeps everything in process and
//! is used when persistence is disabled and in tests.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

use crate::domain::{HardwareCredential, HubRef, IdentityTuple};
use crate::error::IngestError;
use models::{Device, DeviceUpsert, NewReading, Reading, Sensor, SensorUpsert, UpsertOutcome};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Storage gateway consumed by the ingestion services.
///
/// Every method maps backend failures to
/// [`IngestError::PersistenceFailure`].
#[async_trait]
pub trait TelemetryStore: Send + Sync + fmt::Debug {
    /// Short backend name for health reporting.
    fn backend(&self) -> &'static str;

    /// Returns every identity tuple known for the credential pair.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] on backend failure.
    async fn identities_for(
        &self,
        credential: &HardwareCredential,
    ) -> Result<Vec<IdentityTuple>, IngestError>;

    /// Returns the hub owned by the credential pair, if any.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] on backend failure.
    async fn hub_for(&self, credential: &HardwareCredential)
    -> Result<Option<HubRef>, IngestError>;

    /// Atomically finds or creates a device, overwriting its title.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] on backend failure.
    async fn upsert_device(&self, upsert: &DeviceUpsert) -> Result<UpsertOutcome, IngestError>;

    /// Returns the persistent id of a device by its local id.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] on backend failure.
    async fn find_device(&self, hub_id: i64, local_id: i64) -> Result<Option<i64>, IngestError>;

    /// Atomically finds or creates a sensor.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] on backend failure.
    async fn upsert_sensor(&self, upsert: &SensorUpsert) -> Result<UpsertOutcome, IngestError>;

    /// Appends readings in one batch, returning the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] on backend failure; no
    /// reading of the batch is stored in that case.
    async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64, IngestError>;

    /// Lists the devices of a hub ordered by title.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] on backend failure.
    async fn devices_of_hub(&self, hub_id: i64) -> Result<Vec<Device>, IngestError>;

    /// Lists the sensors of a device ordered by title.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] on backend failure.
    async fn sensors_of_device(&self, device_id: i64) -> Result<Vec<Sensor>, IngestError>;

    /// Returns the newest `limit` readings of a sensor, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] on backend failure.
    async fn latest_readings(&self, sensor_id: i64, limit: i64)
    -> Result<Vec<Reading>, IngestError>;
}
