//! Identity gate: resolves hub credentials to persistent identities.

use std::sync::Arc;

use crate::domain::{DecodedPayload, HardwareCredential, HubRef, IdentityCache, IdentityTuple};
use crate::error::IngestError;
use crate::persistence::TelemetryStore;

/// Resolves a [`HardwareCredential`] against the store.
///
/// Telemetry resolution optionally goes through an [`IdentityCache`];
/// hub-only resolution always reads the store.
#[derive(Debug, Clone)]
pub struct IdentityGate {
    store: Arc<dyn TelemetryStore>,
    cache: Option<Arc<IdentityCache>>,
}

impl IdentityGate {
    /// Creates a gate over `store`, with an optional identity cache.
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryStore>, cache: Option<Arc<IdentityCache>>) -> Self {
        Self { store, cache }
    }

    /// Resolves every identity tuple known for the credential pair.
    ///
    /// A cached set is only used when it covers every coordinate of
    /// `payload`. Otherwise the store is read again, since a sensor may have
    /// been registered after the set was cached (possibly by another
    /// instance sharing the store).
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::NoIdentityMatch`] when the credential resolves
    /// to no tuple, or [`IngestError::PersistenceFailure`] on store failure.
    pub async fn resolve_identities(
        &self,
        credential: &HardwareCredential,
        payload: &DecodedPayload,
    ) -> Result<Arc<[IdentityTuple]>, IngestError> {
        let key = credential.cache_key();
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key).await
        {
            if covers(&hit, payload) {
                tracing::debug!(%credential, tuples = hit.len(), "identity cache hit");
                return Ok(hit);
            }
            tracing::debug!(%credential, "cached identities incomplete, reloading");
        }

        let tuples: Arc<[IdentityTuple]> = self.store.identities_for(credential).await?.into();
        if tuples.is_empty() {
            return Err(IngestError::NoIdentityMatch(format!(
                "no device/sensor identities for hub {}",
                credential.hardware_token()
            )));
        }

        if let Some(cache) = &self.cache {
            let purged = cache.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "expired identity cache entries dropped");
            }
            tracing::debug!(
                %credential,
                tuples = tuples.len(),
                ttl_secs = cache.ttl().as_secs(),
                "identities cached"
            );
            cache.insert(key, Arc::clone(&tuples)).await;
        }
        Ok(tuples)
    }

    /// Resolves the hub owned by the credential pair.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::NoIdentityMatch`] when no hub matches, or
    /// [`IngestError::PersistenceFailure`] on store failure.
    pub async fn resolve_hub(
        &self,
        credential: &HardwareCredential,
    ) -> Result<HubRef, IngestError> {
        self.store.hub_for(credential).await?.ok_or_else(|| {
            IngestError::NoIdentityMatch(format!(
                "no hub for hardware token {}",
                credential.hardware_token()
            ))
        })
    }

    /// Drops cached identities for the credential after a registration.
    pub async fn forget(&self, credential: &HardwareCredential) {
        if let Some(cache) = &self.cache
            && cache.invalidate(&credential.cache_key()).await
        {
            tracing::debug!(%credential, "identity cache invalidated");
        }
    }
}

fn covers(tuples: &[IdentityTuple], payload: &DecodedPayload) -> bool {
    payload
        .entries()
        .all(|(device, sensor, _)| tuples.iter().any(|t| t.matches(device, sensor)))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::persistence::MemoryStore;
    use crate::persistence::models::{DeviceUpsert, SensorUpsert};

    const HW: &str = "aqen104Ur2zNX1Ykwv4";
    const USER: &str = "a39831d103eb4c0d";

    fn credential() -> HardwareCredential {
        let Ok(cred) = HardwareCredential::parse(&format!("{HW}:{USER}")) else {
            panic!("valid credential");
        };
        cred
    }

    async fn seeded() -> (Arc<MemoryStore>, i64) {
        let store = Arc::new(MemoryStore::new());
        let account = store.register_account(USER).await;
        let hub = store.register_hub(account, HW).await;
        (store, hub)
    }

    async fn add_sensor(store: &MemoryStore, hub: i64, device: i64, sensor: i64) {
        let Ok(dev) = store
            .upsert_device(&DeviceUpsert {
                hub_id: hub,
                local_id: device,
                title: "Tank".to_string(),
                description: String::new(),
            })
            .await
        else {
            panic!("device upsert");
        };
        let upsert = SensorUpsert {
            device_id: dev.id,
            local_id: sensor,
            title: format!("Sensor {sensor}"),
            overwrite_title: false,
            description: String::new(),
        };
        assert!(store.upsert_sensor(&upsert).await.is_ok());
    }

    fn readings(coordinates: &[(i64, i64)]) -> DecodedPayload {
        let mut payload = DecodedPayload::new();
        for &(device, sensor) in coordinates {
            payload.insert(device, sensor, "1");
        }
        payload
    }

    #[tokio::test]
    async fn unknown_credential_has_no_identity() {
        let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());
        let gate = IdentityGate::new(store, None);
        assert!(matches!(
            gate.resolve_identities(&credential(), &readings(&[(1, 0)])).await,
            Err(IngestError::NoIdentityMatch(_))
        ));
        assert!(matches!(
            gate.resolve_hub(&credential()).await,
            Err(IngestError::NoIdentityMatch(_))
        ));
    }

    #[tokio::test]
    async fn hub_without_sensors_is_no_match_for_telemetry() {
        let (store, hub) = seeded().await;
        let gate = IdentityGate::new(store, None);
        let Ok(found) = gate.resolve_hub(&credential()).await else {
            panic!("hub should resolve");
        };
        assert_eq!(found.hub_id, hub);
        assert!(
            gate.resolve_identities(&credential(), &readings(&[(1, 0)]))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn covered_payload_is_served_from_cache() {
        let (store, hub) = seeded().await;
        add_sensor(&store, hub, 1, 0).await;
        let cache = Arc::new(IdentityCache::new(Duration::from_secs(60)));
        let gate = IdentityGate::new(Arc::clone(&store) as Arc<dyn TelemetryStore>, Some(cache));

        let Ok(first) = gate.resolve_identities(&credential(), &readings(&[(1, 0)])).await else {
            panic!("resolve");
        };
        assert_eq!(first.len(), 1);

        // The new sensor is not needed by this payload, so the cached set stands.
        add_sensor(&store, hub, 1, 1).await;
        let Ok(cached) = gate.resolve_identities(&credential(), &readings(&[(1, 0)])).await else {
            panic!("resolve");
        };
        assert_eq!(cached.len(), 1);

        gate.forget(&credential()).await;
        let Ok(fresh) = gate.resolve_identities(&credential(), &readings(&[(1, 0)])).await else {
            panic!("resolve");
        };
        assert_eq!(fresh.len(), 2);
    }

    #[tokio::test]
    async fn uncovered_coordinate_reloads_stale_cache() {
        let (store, hub) = seeded().await;
        add_sensor(&store, hub, 1, 0).await;
        let cache = Arc::new(IdentityCache::new(Duration::from_secs(3_600)));
        let gate = IdentityGate::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Some(Arc::clone(&cache)),
        );
        assert!(
            gate.resolve_identities(&credential(), &readings(&[(1, 0)]))
                .await
                .is_ok()
        );

        // Registered without going through this gate, so nothing invalidates.
        add_sensor(&store, hub, 1, 1).await;
        let Ok(tuples) = gate
            .resolve_identities(&credential(), &readings(&[(1, 0), (1, 1)]))
            .await
        else {
            panic!("resolve");
        };
        assert!(tuples.iter().any(|t| t.matches(1, 1)));

        let Some(recached) = cache.get(&credential().cache_key()).await else {
            panic!("reloaded set must be cached");
        };
        assert_eq!(recached.len(), 2);
    }

    #[tokio::test]
    async fn unregistered_coordinate_still_resolves_known_tuples() {
        let (store, hub) = seeded().await;
        add_sensor(&store, hub, 1, 0).await;
        let cache = Arc::new(IdentityCache::new(Duration::from_secs(3_600)));
        let gate = IdentityGate::new(Arc::clone(&store) as Arc<dyn TelemetryStore>, Some(cache));

        for _ in 0..2 {
            let Ok(tuples) = gate
                .resolve_identities(&credential(), &readings(&[(1, 0), (9, 9)]))
                .await
            else {
                panic!("resolve");
            };
            assert_eq!(tuples.len(), 1);
        }
    }
}
