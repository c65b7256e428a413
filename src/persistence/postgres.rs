//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::TelemetryStore;
use super::models::{
    Device, DeviceUpsert, NewReading, Reading, Sensor, SensorUpsert, UpsertOutcome,
};
use crate::config::IngestConfig;
use crate::domain::{HardwareCredential, HubRef, IdentityTuple};
use crate::error::IngestError;

/// Rows per multi-row `INSERT`; 9 binds each keeps well under the 65 535
/// parameter limit of the Postgres wire protocol.
const READING_BATCH_ROWS: usize = 1_000;

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] if the database cannot
    /// be reached.
    pub async fn connect(config: &IngestConfig) -> Result<Self, IngestError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies pending migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), IngestError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| IngestError::PersistenceFailure(e.to_string()))
    }
}

#[async_trait]
impl TelemetryStore for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn identities_for(
        &self,
        credential: &HardwareCredential,
    ) -> Result<Vec<IdentityTuple>, IngestError> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64)>(
            "SELECT h.account_id, h.id, d.id, s.id, d.local_id, s.local_id \
             FROM hubs h \
             INNER JOIN accounts a ON h.account_id = a.id \
             INNER JOIN devices d ON d.hub_id = h.id \
             INNER JOIN sensors s ON s.device_id = d.id \
             WHERE h.hardware_token = $1 AND a.user_token = $2 \
             ORDER BY h.id, d.id, s.id",
        )
        .bind(credential.hardware_token())
        .bind(credential.user_token())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(account_id, hub_id, device_id, sensor_id, local_device_id, local_sensor_id)| {
                    IdentityTuple {
                        account_id,
                        hub_id,
                        device_id,
                        sensor_id,
                        local_device_id,
                        local_sensor_id,
                    }
                },
            )
            .collect())
    }

    async fn hub_for(
        &self,
        credential: &HardwareCredential,
    ) -> Result<Option<HubRef>, IngestError> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT h.account_id, h.id FROM hubs h \
             INNER JOIN accounts a ON h.account_id = a.id \
             WHERE h.hardware_token = $1 AND a.user_token = $2",
        )
        .bind(credential.hardware_token())
        .bind(credential.user_token())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(account_id, hub_id)| HubRef { account_id, hub_id }))
    }

    async fn upsert_device(&self, upsert: &DeviceUpsert) -> Result<UpsertOutcome, IngestError> {
        let (id, created) = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO devices (hub_id, local_id, title, description) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (hub_id, local_id) \
             DO UPDATE SET title = EXCLUDED.title, updated_at = now() \
             RETURNING id, (xmax = 0) AS created",
        )
        .bind(upsert.hub_id)
        .bind(upsert.local_id)
        .bind(&upsert.title)
        .bind(&upsert.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(UpsertOutcome { id, created })
    }

    async fn find_device(&self, hub_id: i64, local_id: i64) -> Result<Option<i64>, IngestError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM devices WHERE hub_id = $1 AND local_id = $2",
        )
        .bind(hub_id)
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn upsert_sensor(&self, upsert: &SensorUpsert) -> Result<UpsertOutcome, IngestError> {
        let (id, created) = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO sensors (device_id, local_id, title, description) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (device_id, local_id) \
             DO UPDATE SET title = CASE WHEN $5 THEN EXCLUDED.title ELSE sensors.title END, \
                           updated_at = now() \
             RETURNING id, (xmax = 0) AS created",
        )
        .bind(upsert.device_id)
        .bind(upsert.local_id)
        .bind(&upsert.title)
        .bind(&upsert.description)
        .bind(upsert.overwrite_title)
        .fetch_one(&self.pool)
        .await?;

        Ok(UpsertOutcome { id, created })
    }

    async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64, IngestError> {
        if readings.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for chunk in readings.chunks(READING_BATCH_ROWS) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO sensor_readings \
                 (account_id, hub_id, device_id, sensor_id, local_device_id, local_sensor_id, \
                  value, created_at, user_time) ",
            );
            builder.push_values(chunk, |mut row, reading| {
                row.push_bind(reading.ids.account_id)
                    .push_bind(reading.ids.hub_id)
                    .push_bind(reading.ids.device_id)
                    .push_bind(reading.ids.sensor_id)
                    .push_bind(reading.local_device_id)
                    .push_bind(reading.local_sensor_id)
                    .push_bind(reading.value.clone())
                    .push_bind(reading.created_at)
                    .push_bind(reading.user_time);
            });
            let result = builder.build().execute(&mut *tx).await?;
            written += result.rows_affected();
        }
        tx.commit().await?;

        Ok(written)
    }

    async fn devices_of_hub(&self, hub_id: i64) -> Result<Vec<Device>, IngestError> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, String, String)>(
            "SELECT id, hub_id, local_id, title, description FROM devices \
             WHERE hub_id = $1 ORDER BY title",
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, hub_id, local_id, title, description)| Device {
                id,
                hub_id,
                local_id,
                title,
                description,
            })
            .collect())
    }

    async fn sensors_of_device(&self, device_id: i64) -> Result<Vec<Sensor>, IngestError> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, String, String)>(
            "SELECT id, device_id, local_id, title, description FROM sensors \
             WHERE device_id = $1 ORDER BY title",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, device_id, local_id, title, description)| Sensor {
                id,
                device_id,
                local_id,
                title,
                description,
            })
            .collect())
    }

    async fn latest_readings(
        &self,
        sensor_id: i64,
        limit: i64,
    ) -> Result<Vec<Reading>, IngestError> {
        type Row = (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
            String,
            DateTime<Utc>,
            Option<DateTime<Utc>>,
        );
        let rows = sqlx::query_as::<_, Row>(
            "SELECT id, account_id, hub_id, device_id, sensor_id, local_device_id, \
                    local_sensor_id, value, created_at, user_time \
             FROM sensor_readings WHERE sensor_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(sensor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    account_id,
                    hub_id,
                    device_id,
                    sensor_id,
                    local_device_id,
                    local_sensor_id,
                    value,
                    created_at,
                    user_time,
                )| Reading {
                    id,
                    account_id,
                    hub_id,
                    device_id,
                    sensor_id,
                    local_device_id,
                    local_sensor_id,
                    value,
                    created_at,
                    user_time,
                },
            )
            .collect())
    }
}
