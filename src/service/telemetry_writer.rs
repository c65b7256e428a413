//! Reconciles decoded telemetry with resolved identities and persists it.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{DecodedPayload, IdentityTuple, ResolvedIds};
use crate::error::IngestError;
use crate::persistence::TelemetryStore;
use crate::persistence::models::NewReading;

/// Builds one reading per payload entry, in payload order.
///
/// Entries whose local coordinate matches no tuple are attributed to
/// [`ResolvedIds::FALLBACK`].
#[must_use]
pub fn build_batch(
    payload: &DecodedPayload,
    identities: &[IdentityTuple],
    now: DateTime<Utc>,
) -> Vec<NewReading> {
    payload
        .entries()
        .map(|(device, sensor, value)| {
            let ids = identities
                .iter()
                .find(|tuple| tuple.matches(device, sensor))
                .map_or_else(
                    || {
                        tracing::warn!(
                            local_device_id = device,
                            local_sensor_id = sensor,
                            "reading matches no registered sensor, using fallback ids"
                        );
                        ResolvedIds::FALLBACK
                    },
                    IdentityTuple::resolved,
                );
            NewReading {
                ids,
                local_device_id: device,
                local_sensor_id: sensor,
                value: value.to_string(),
                created_at: now,
                user_time: None,
            }
        })
        .collect()
}

/// Writes telemetry batches through the store.
#[derive(Debug, Clone)]
pub struct TelemetryWriter {
    store: Arc<dyn TelemetryStore>,
}

impl TelemetryWriter {
    /// Creates a writer over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Reconciles `payload` against `identities` and persists the batch in
    /// one bulk insert, returning the number of stored readings.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceFailure`] if the insert fails; no
    /// reading of the batch is stored in that case.
    pub async fn write(
        &self,
        payload: &DecodedPayload,
        identities: &[IdentityTuple],
    ) -> Result<u64, IngestError> {
        let batch = build_batch(payload, identities, Utc::now());
        self.store.insert_readings(&batch).await
    }
}
