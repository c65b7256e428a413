//! Ingestion routes and their payload decoders.
//!
//! Every route owns a [`RouteDecoder`] that folds the ordered pair sequence
//! into a [`DecodedPayload`]. Dispatch goes through the immutable
//! [`ROUTE_TABLE`]; nothing is registered at runtime.
//!
//! All decoders except the telemetry one carry a device context: control
//! keys (`id`, `device_id`) switch the device that subsequent pairs attach
//! to. Before any control key is seen the context is device `1`.

use std::fmt;

use super::key_codec::{decode_key, decode_meta, decode_sensor_id, decode_sensor_list};
use super::payload::DecodedPayload;
use super::request::KeyValuePair;
use crate::error::IngestError;

/// Device context in effect before any control key is seen.
pub const DEFAULT_DEVICE_LOCAL_ID: i64 = 1;

/// Sensor slot under which `device/add` records the device title.
pub const DEVICE_TITLE_SLOT: i64 = 1;

/// Ingestion route selected by the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/v1/sensor`: telemetry readings.
    SensorData,
    /// `/v1/device/add`: device registration.
    DeviceAdd,
    /// `/v1/device/meta`: device meta data.
    DeviceMeta,
    /// `/v1/sensor/add`: sensor registration.
    SensorAdd,
    /// `/v1/sensor/meta`: sensor titles.
    SensorMeta,
}

impl Route {
    /// Returns the request path served by this route.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::SensorData => "/v1/sensor",
            Self::DeviceAdd => "/v1/device/add",
            Self::DeviceMeta => "/v1/device/meta",
            Self::SensorAdd => "/v1/sensor/add",
            Self::SensorMeta => "/v1/sensor/meta",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Decoding strategy for one route.
pub trait RouteDecoder: Send + Sync + fmt::Debug {
    /// Decodes ordered pairs into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ParseFailure`] when a pair cannot be decoded
    /// under the route's rules.
    fn decode(&self, pairs: &[KeyValuePair]) -> Result<DecodedPayload, IngestError>;
}

/// One row of the static dispatch table.
#[derive(Debug)]
pub struct RouteEntry {
    /// Exact request path.
    pub path: &'static str,
    /// Route identity.
    pub route: Route,
    /// Decoder bound to the route.
    pub decoder: &'static dyn RouteDecoder,
}

/// Immutable route → decoder dispatch table.
pub static ROUTE_TABLE: [RouteEntry; 5] = [
    RouteEntry {
        path: "/v1/sensor",
        route: Route::SensorData,
        decoder: &SensorDataDecoder,
    },
    RouteEntry {
        path: "/v1/device/add",
        route: Route::DeviceAdd,
        decoder: &DeviceAddDecoder,
    },
    RouteEntry {
        path: "/v1/device/meta",
        route: Route::DeviceMeta,
        decoder: &DeviceMetaDecoder,
    },
    RouteEntry {
        path: "/v1/sensor/add",
        route: Route::SensorAdd,
        decoder: &SensorAddDecoder,
    },
    RouteEntry {
        path: "/v1/sensor/meta",
        route: Route::SensorMeta,
        decoder: &SensorMetaDecoder,
    },
];

/// Finds the dispatch entry for a request path.
///
/// # Errors
///
/// Returns [`IngestError::UnknownRoute`] if no entry matches `path` exactly.
pub fn lookup(path: &str) -> Result<&'static RouteEntry, IngestError> {
    ROUTE_TABLE
        .iter()
        .find(|entry| entry.path == path)
        .ok_or_else(|| IngestError::UnknownRoute(path.to_string()))
}

/// Current device while folding over the pairs.
#[derive(Debug, Clone, Copy)]
struct DeviceContext {
    current: i64,
}

impl DeviceContext {
    const fn new() -> Self {
        Self {
            current: DEFAULT_DEVICE_LOCAL_ID,
        }
    }

    fn switch_to(&mut self, pair: &KeyValuePair) -> Result<(), IngestError> {
        self.current = pair.value.parse::<i64>().map_err(|_| {
            IngestError::ParseFailure(format!(
                "{} is not an integer device id: {}",
                pair.key, pair.value
            ))
        })?;
        Ok(())
    }
}

fn strict(err: IngestError) -> IngestError {
    match err {
        IngestError::MalformedKey(key) => IngestError::ParseFailure(format!("malformed key: {key}")),
        other => other,
    }
}

/// `/v1/sensor`: every key is a packed `f<digits>` coordinate.
#[derive(Debug, Clone, Copy)]
pub struct SensorDataDecoder;

impl RouteDecoder for SensorDataDecoder {
    fn decode(&self, pairs: &[KeyValuePair]) -> Result<DecodedPayload, IngestError> {
        let mut payload = DecodedPayload::new();
        for pair in pairs {
            let key = decode_key(&pair.key).map_err(strict)?;
            payload.insert(key.device, key.sensor, pair.value.as_str());
        }
        Ok(payload)
    }
}

/// `/v1/device/add`: `id` switches the device, any other value is its title.
#[derive(Debug, Clone, Copy)]
pub struct DeviceAddDecoder;

impl RouteDecoder for DeviceAddDecoder {
    fn decode(&self, pairs: &[KeyValuePair]) -> Result<DecodedPayload, IngestError> {
        let mut ctx = DeviceContext::new();
        let mut payload = DecodedPayload::new();
        for pair in pairs {
            if pair.key == "id" {
                ctx.switch_to(pair)?;
            } else {
                payload.insert(ctx.current, DEVICE_TITLE_SLOT, pair.value.as_str());
            }
        }
        Ok(payload)
    }
}

/// `/v1/device/meta`: `devdata` carries a `<type>:<value>;...` list.
#[derive(Debug, Clone, Copy)]
pub struct DeviceMetaDecoder;

impl RouteDecoder for DeviceMetaDecoder {
    fn decode(&self, pairs: &[KeyValuePair]) -> Result<DecodedPayload, IngestError> {
        let mut ctx = DeviceContext::new();
        let mut payload = DecodedPayload::new();
        for pair in pairs {
            match pair.key.as_str() {
                "id" | "device_id" => ctx.switch_to(pair)?,
                "devdata" => {
                    let meta = decode_meta(&pair.value);
                    for (meta_type, value) in meta.entries {
                        payload.insert(ctx.current, meta_type, value);
                    }
                    payload.record_skipped(meta.skipped);
                }
                _ => {}
            }
        }
        Ok(payload)
    }
}

/// `/v1/sensor/add`: values are `f<id>,f<id>,...` lists of sensors.
#[derive(Debug, Clone, Copy)]
pub struct SensorAddDecoder;

impl RouteDecoder for SensorAddDecoder {
    fn decode(&self, pairs: &[KeyValuePair]) -> Result<DecodedPayload, IngestError> {
        let mut ctx = DeviceContext::new();
        let mut payload = DecodedPayload::new();
        for pair in pairs {
            if pair.key == "device_id" {
                ctx.switch_to(pair)?;
                continue;
            }
            let ids = decode_sensor_list(&pair.value).map_err(strict)?;
            for sensor in ids.entries {
                payload.insert(ctx.current, sensor, "");
            }
            payload.record_skipped(ids.skipped);
        }
        Ok(payload)
    }
}

/// `/v1/sensor/meta`: keys are sensor-only `f<id>` names, values titles.
#[derive(Debug, Clone, Copy)]
pub struct SensorMetaDecoder;

impl RouteDecoder for SensorMetaDecoder {
    fn decode(&self, pairs: &[KeyValuePair]) -> Result<DecodedPayload, IngestError> {
        let mut ctx = DeviceContext::new();
        let mut payload = DecodedPayload::new();
        for pair in pairs {
            if pair.key == "device_id" {
                ctx.switch_to(pair)?;
                continue;
            }
            let sensor = decode_sensor_id(&pair.key).map_err(strict)?;
            payload.insert(ctx.current, sensor, pair.value.as_str());
        }
        Ok(payload)
    }
}
