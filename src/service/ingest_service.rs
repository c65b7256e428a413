//! Ingestion pipeline: split → dispatch → decode → identify → persist.
//!
//! [`IngestService::handle`] never fails. Whatever goes wrong is logged with
//! its [`IngestError::error_code`] and reported back in the
//! [`IngestReport`]; the HTTP layer acknowledges the hub either way.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use super::identity_gate::IdentityGate;
use super::telemetry_writer::TelemetryWriter;
use super::upsert::UpsertEngine;
use crate::domain::request::{redact_target, split_request};
use crate::domain::route::{self, DEVICE_TITLE_SLOT};
use crate::domain::{DecodedPayload, IdentityCache, IngestRequest, Route};
use crate::error::IngestError;
use crate::persistence::TelemetryStore;

/// Outcome of one ingestion request.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Correlation id attached to every log line of the request.
    pub request_id: Uuid,
    /// Route the request was dispatched to, once known.
    pub route: Option<Route>,
    /// Readings written by a telemetry request.
    pub readings_stored: u64,
    /// Devices created or renamed.
    pub devices_upserted: usize,
    /// Sensors created or updated.
    pub sensors_upserted: usize,
    /// Device meta entries accepted.
    pub meta_entries: usize,
    /// Tolerantly skipped sub-segments of the payload.
    pub skipped_segments: usize,
    /// Items that failed while the rest of the request went through.
    pub item_failures: usize,
    /// Error that stopped the whole request, if any.
    pub rejected: Option<IngestError>,
}

impl IngestReport {
    fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            route: None,
            readings_stored: 0,
            devices_upserted: 0,
            sensors_upserted: 0,
            meta_entries: 0,
            skipped_segments: 0,
            item_failures: 0,
            rejected: None,
        }
    }

    /// Returns `true` if the request went through without any failure.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.rejected.is_none() && self.item_failures == 0
    }
}

/// Entry point of the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestService {
    store: Arc<dyn TelemetryStore>,
    gate: IdentityGate,
    upserts: UpsertEngine,
    writer: TelemetryWriter,
}

impl IngestService {
    /// Builds the pipeline over `store`. A `cache_ttl` of `None` disables
    /// the identity cache.
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryStore>, cache_ttl: Option<Duration>) -> Self {
        let cache = cache_ttl.map(|ttl| Arc::new(IdentityCache::new(ttl)));
        Self {
            gate: IdentityGate::new(Arc::clone(&store), cache),
            upserts: UpsertEngine::new(Arc::clone(&store)),
            writer: TelemetryWriter::new(Arc::clone(&store)),
            store,
        }
    }

    /// Returns the store the pipeline writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    /// Processes one raw request target (path plus query string).
    pub async fn handle(&self, target: &str) -> IngestReport {
        let mut report = IngestReport::new();
        let span = tracing::info_span!("ingest", request_id = %report.request_id);

        async {
            match self.process(target, &mut report).await {
                Ok(()) => tracing::info!(
                    route = report.route.map(Route::path),
                    readings = report.readings_stored,
                    devices = report.devices_upserted,
                    sensors = report.sensors_upserted,
                    meta = report.meta_entries,
                    skipped = report.skipped_segments,
                    item_failures = report.item_failures,
                    "request ingested"
                ),
                Err(err) => {
                    log_rejection(&err, target);
                    report.rejected = Some(err);
                }
            }
        }
        .instrument(span)
        .await;

        report
    }

    async fn process(&self, target: &str, report: &mut IngestReport) -> Result<(), IngestError> {
        let request = split_request(target)?;
        let entry = route::lookup(&request.route)?;
        report.route = Some(entry.route);

        let payload = entry.decoder.decode(&request.pairs)?;
        report.skipped_segments = payload.skipped();
        if payload.is_empty() {
            return Err(IngestError::ParseFailure(format!(
                "no entries decoded from {}",
                request.raw_payload
            )));
        }

        match entry.route {
            Route::SensorData => self.ingest_telemetry(&request, &payload, report).await,
            Route::DeviceAdd => self.register_devices(&request, &payload, report).await,
            Route::DeviceMeta => self.record_device_meta(&request, &payload, report).await,
            Route::SensorAdd | Route::SensorMeta => {
                self.register_sensors(&request, &payload, report).await
            }
        }
    }

    async fn ingest_telemetry(
        &self,
        request: &IngestRequest,
        payload: &DecodedPayload,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let identities = self.gate.resolve_identities(&request.credential, payload).await?;
        report.readings_stored = self.writer.write(payload, &identities).await?;
        Ok(())
    }

    async fn register_devices(
        &self,
        request: &IngestRequest,
        payload: &DecodedPayload,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let hub = self.gate.resolve_hub(&request.credential).await?;
        for (local_id, slot, title) in payload.entries() {
            if slot != DEVICE_TITLE_SLOT {
                continue;
            }
            match self.upserts.upsert_device(hub.hub_id, local_id, title).await {
                Ok(_) => report.devices_upserted += 1,
                Err(err) => {
                    log_item_failure(&err, local_id, None);
                    report.item_failures += 1;
                }
            }
        }
        if report.devices_upserted > 0 {
            self.gate.forget(&request.credential).await;
        }
        Ok(())
    }

    async fn record_device_meta(
        &self,
        request: &IngestRequest,
        payload: &DecodedPayload,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let hub = self.gate.resolve_hub(&request.credential).await?;
        for local_id in payload.device_ids() {
            let device_id = match self.store.find_device(hub.hub_id, local_id).await {
                Ok(Some(device_id)) => device_id,
                Ok(None) => {
                    let err = IngestError::NoIdentityMatch(format!(
                        "hub {} has no device {local_id}",
                        hub.hub_id
                    ));
                    log_item_failure(&err, local_id, None);
                    report.item_failures += 1;
                    continue;
                }
                Err(err) => {
                    log_item_failure(&err, local_id, None);
                    report.item_failures += 1;
                    continue;
                }
            };
            if let Some(meta) = payload.device(local_id) {
                for (meta_type, value) in meta {
                    tracing::info!(device_id, meta_type, value = value.as_str(), "device meta");
                }
                report.meta_entries += meta.len();
            }
        }
        Ok(())
    }

    async fn register_sensors(
        &self,
        request: &IngestRequest,
        payload: &DecodedPayload,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let hub = self.gate.resolve_hub(&request.credential).await?;
        for (local_device_id, local_sensor_id, reported) in payload.entries() {
            match self
                .upserts
                .upsert_sensor(hub.hub_id, local_device_id, local_sensor_id, reported)
                .await
            {
                Ok(_) => report.sensors_upserted += 1,
                Err(err) => {
                    log_item_failure(&err, local_device_id, Some(local_sensor_id));
                    report.item_failures += 1;
                }
            }
        }
        if report.sensors_upserted > 0 {
            self.gate.forget(&request.credential).await;
        }
        Ok(())
    }
}

fn log_rejection(err: &IngestError, target: &str) {
    let target = redact_target(target);
    if matches!(err, IngestError::PersistenceFailure(_)) {
        tracing::error!(
            code = err.error_code(),
            kind = err.kind(),
            %target,
            error = %err,
            "request dropped"
        );
    } else {
        tracing::warn!(
            code = err.error_code(),
            kind = err.kind(),
            %target,
            error = %err,
            "request rejected"
        );
    }
}

fn log_item_failure(err: &IngestError, local_device_id: i64, local_sensor_id: Option<i64>) {
    tracing::warn!(
        code = err.error_code(),
        kind = err.kind(),
        local_device_id,
        local_sensor_id,
        error = %err,
        "item skipped"
    );
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::domain::{HardwareCredential, HubRef, IdentityTuple, ResolvedIds};
    use crate::persistence::MemoryStore;
    use crate::persistence::models::{
        Device, DeviceUpsert, NewReading, Reading, Sensor, SensorUpsert, UpsertOutcome,
    };

    const HW: &str = "aqen104Ur2zNX1Ykwv4";
    const USER: &str = "a39831d103eb4c0d";

    async fn seeded() -> (Arc<MemoryStore>, IngestService, i64) {
        let store = Arc::new(MemoryStore::new());
        let account = store.register_account(USER).await;
        let hub = store.register_hub(account, HW).await;
        let service = IngestService::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Some(Duration::from_secs(3_600)),
        );
        (store, service, hub)
    }

    fn target(route: &str, payload: &str) -> String {
        format!("{route}?api_key={HW}:{USER}&{payload}")
    }

    #[tokio::test]
    async fn registration_then_telemetry_is_attributed() {
        let (store, service, hub) = seeded().await;

        let report = service.handle(&target("/v1/device/add", "id=1&title=Tank")).await;
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.devices_upserted, 1);

        let report = service
            .handle(&target("/v1/sensor/add", "device_id=1&ids=f100,f101"))
            .await;
        assert_eq!(report.sensors_upserted, 2);

        let report = service
            .handle(&target("/v1/sensor", "f100=0.01&f101=28&f505=3"))
            .await;
        assert_eq!(report.route, Some(Route::SensorData));
        assert_eq!(report.readings_stored, 3);

        let readings = store.readings().await;
        assert_eq!(readings.len(), 3);
        assert!(
            readings
                .iter()
                .filter(|r| r.local_device_id == 1)
                .all(|r| r.hub_id == hub && r.device_id != 0)
        );
        let Some(stray) = readings.iter().find(|r| r.local_device_id == 5) else {
            panic!("unmatched reading must still be stored");
        };
        assert_eq!(stray.account_id, ResolvedIds::FALLBACK.account_id);
        assert_eq!(stray.sensor_id, ResolvedIds::FALLBACK.sensor_id);
    }

    #[tokio::test]
    async fn telemetry_without_registered_sensors_is_rejected() {
        let (store, service, _) = seeded().await;
        let report = service.handle(&target("/v1/sensor", "f100=1")).await;
        assert!(matches!(report.rejected, Some(IngestError::NoIdentityMatch(_))));
        assert!(store.readings().await.is_empty());
    }

    #[tokio::test]
    async fn sensor_on_unknown_device_fails_only_that_item() {
        let (store, service, _) = seeded().await;
        assert!(service.handle(&target("/v1/device/add", "id=4&t=Sump")).await.is_clean());

        let report = service
            .handle(&target("/v1/sensor/add", "device_id=4&a=f401&device_id=8&b=f801"))
            .await;
        assert_eq!(report.sensors_upserted, 1);
        assert_eq!(report.item_failures, 1);
        assert!(report.rejected.is_none());
        assert_eq!(store.sensor_count().await, 1);
    }

    #[tokio::test]
    async fn sensor_meta_renames_registered_sensor() {
        let (store, service, hub) = seeded().await;
        assert!(service.handle(&target("/v1/device/add", "id=2&t=Reef")).await.is_clean());
        assert!(service.handle(&target("/v1/sensor/add", "device_id=2&ids=f203")).await.is_clean());
        let report = service
            .handle(&target("/v1/sensor/meta", "device_id=2&f3=Salinity"))
            .await;
        assert!(report.is_clean(), "{report:?}");

        let Ok(Some(device_id)) = store.find_device(hub, 2).await else {
            panic!("device must exist");
        };
        let Ok(sensors) = store.sensors_of_device(device_id).await else {
            panic!("list");
        };
        assert_eq!(
            sensors.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
            vec!["Salinity"]
        );
    }

    #[tokio::test]
    async fn device_meta_counts_entries_of_known_devices() {
        let (_, service, _) = seeded().await;
        assert!(service.handle(&target("/v1/device/add", "id=1&t=Tank")).await.is_clean());
        let report = service
            .handle(&target("/v1/device/meta", "id=1&devdata=1:3.2;2:abc;bad&id=6&devdata=1:x"))
            .await;
        assert_eq!(report.meta_entries, 2);
        assert_eq!(report.skipped_segments, 1);
        assert_eq!(report.item_failures, 1);
    }

    #[tokio::test]
    async fn malformed_requests_touch_nothing() {
        let (store, service, _) = seeded().await;
        let cases = [
            (
                "/v1/sensor?api_key=short:token&f100=1".to_string(),
                "invalid_request_shape",
            ),
            ("/v1/sensor&f100=1".to_string(), "invalid_request_shape"),
            (target("/v1/nope", "f100=1"), "unknown_route"),
            (target("/v1/sensor", "x100=1"), "parse_failure"),
            (target("/v1/sensor", "f100"), "invalid_pair"),
        ];
        for (raw, kind) in &cases {
            let report = service.handle(raw).await;
            assert_eq!(report.rejected.as_ref().map(IngestError::kind), Some(*kind), "{raw}");
        }
        assert_eq!(store.device_count().await, 0);
        assert!(store.readings().await.is_empty());
    }

    /// Store that fails every statement touching one local id.
    #[derive(Debug)]
    struct FlakyStore {
        inner: MemoryStore,
        failing_local_id: i64,
    }

    impl FlakyStore {
        fn fail(&self, local_id: i64) -> Result<(), IngestError> {
            if local_id == self.failing_local_id {
                return Err(IngestError::PersistenceFailure(format!(
                    "statement for local id {local_id} failed"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TelemetryStore for FlakyStore {
        fn backend(&self) -> &'static str {
            "flaky"
        }

        async fn identities_for(
            &self,
            credential: &HardwareCredential,
        ) -> Result<Vec<IdentityTuple>, IngestError> {
            self.inner.identities_for(credential).await
        }

        async fn hub_for(
            &self,
            credential: &HardwareCredential,
        ) -> Result<Option<HubRef>, IngestError> {
            self.inner.hub_for(credential).await
        }

        async fn upsert_device(&self, upsert: &DeviceUpsert) -> Result<UpsertOutcome, IngestError> {
            self.fail(upsert.local_id)?;
            self.inner.upsert_device(upsert).await
        }

        async fn find_device(
            &self,
            hub_id: i64,
            local_id: i64,
        ) -> Result<Option<i64>, IngestError> {
            self.fail(local_id)?;
            self.inner.find_device(hub_id, local_id).await
        }

        async fn upsert_sensor(&self, upsert: &SensorUpsert) -> Result<UpsertOutcome, IngestError> {
            self.fail(upsert.local_id)?;
            self.inner.upsert_sensor(upsert).await
        }

        async fn insert_readings(&self, readings: &[NewReading]) -> Result<u64, IngestError> {
            self.inner.insert_readings(readings).await
        }

        async fn devices_of_hub(&self, hub_id: i64) -> Result<Vec<Device>, IngestError> {
            self.inner.devices_of_hub(hub_id).await
        }

        async fn sensors_of_device(&self, device_id: i64) -> Result<Vec<Sensor>, IngestError> {
            self.inner.sensors_of_device(device_id).await
        }

        async fn latest_readings(
            &self,
            sensor_id: i64,
            limit: i64,
        ) -> Result<Vec<Reading>, IngestError> {
            self.inner.latest_readings(sensor_id, limit).await
        }
    }

    async fn flaky(failing_local_id: i64) -> (Arc<FlakyStore>, IngestService) {
        let inner = MemoryStore::new();
        let account = inner.register_account(USER).await;
        inner.register_hub(account, HW).await;
        let store = Arc::new(FlakyStore {
            inner,
            failing_local_id,
        });
        let service = IngestService::new(Arc::clone(&store) as Arc<dyn TelemetryStore>, None);
        (store, service)
    }

    #[tokio::test]
    async fn store_failure_on_one_device_spares_the_rest() {
        let (store, service) = flaky(13).await;

        let report = service
            .handle(&target("/v1/device/add", "id=12&t=A&id=13&t=B&id=14&t=C"))
            .await;
        assert_eq!(report.devices_upserted, 2);
        assert_eq!(report.item_failures, 1);
        assert!(report.rejected.is_none(), "{report:?}");
        assert_eq!(store.inner.device_count().await, 2);

        let report = service
            .handle(&target(
                "/v1/device/meta",
                "id=12&devdata=1:a&id=13&devdata=1:b&id=14&devdata=1:c",
            ))
            .await;
        assert!(report.rejected.is_none(), "{report:?}");
        assert_eq!(report.meta_entries, 2);
        assert_eq!(report.item_failures, 1);
    }

    #[tokio::test]
    async fn store_failure_on_one_sensor_spares_the_rest() {
        let (store, service) = flaky(13).await;
        assert!(service.handle(&target("/v1/device/add", "id=12&t=A")).await.is_clean());

        let report = service
            .handle(&target("/v1/sensor/add", "device_id=12&ids=f1213,f1214,f1215"))
            .await;
        assert!(report.rejected.is_none(), "{report:?}");
        assert_eq!(report.sensors_upserted, 2);
        assert_eq!(report.item_failures, 1);
        assert_eq!(store.inner.sensor_count().await, 2);
    }

    /// Registers sensor 1 through one instance and sensor 2 through a second
    /// instance sharing the store, then sends telemetry for both through the
    /// first. Returns `(local device, local sensor, sensor id, value)` rows.
    async fn telemetry_after_registration_elsewhere(
        cache_ttl: Option<Duration>,
    ) -> Vec<(i64, i64, i64, String)> {
        let store = Arc::new(MemoryStore::new());
        let account = store.register_account(USER).await;
        store.register_hub(account, HW).await;
        let shared = Arc::clone(&store) as Arc<dyn TelemetryStore>;
        let primary = IngestService::new(Arc::clone(&shared), cache_ttl);
        let replica = IngestService::new(shared, cache_ttl);

        assert!(primary.handle(&target("/v1/device/add", "id=1&t=Tank")).await.is_clean());
        assert!(primary.handle(&target("/v1/sensor/add", "device_id=1&ids=f101")).await.is_clean());
        assert!(primary.handle(&target("/v1/sensor", "f101=1")).await.is_clean());
        assert!(replica.handle(&target("/v1/sensor/add", "device_id=1&ids=f102")).await.is_clean());
        let report = primary.handle(&target("/v1/sensor", "f101=2&f102=5")).await;
        assert_eq!(report.readings_stored, 2);

        let mut rows: Vec<_> = store
            .readings()
            .await
            .into_iter()
            .map(|r| (r.local_device_id, r.local_sensor_id, r.sensor_id, r.value))
            .collect();
        rows.sort();
        rows
    }

    #[tokio::test]
    async fn identity_cache_never_changes_attribution() {
        let cached = telemetry_after_registration_elsewhere(Some(Duration::from_secs(3_600))).await;
        let uncached = telemetry_after_registration_elsewhere(None).await;
        assert_eq!(cached, uncached);

        let Some(late) = cached.iter().find(|row| row.1 == 2) else {
            panic!("reading of the late sensor must be stored");
        };
        assert_ne!(late.2, ResolvedIds::FALLBACK.sensor_id);
    }
}
