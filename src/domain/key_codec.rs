//! Compact key encoding used by hub firmware.
//!
//! Hubs pack a (device, sensor) coordinate into a single query parameter
//! name `f<digits>`, where `digits = device * 100 + sensor`. A device
//! therefore owns at most [`SENSOR_SLOTS`] sensor slots (0–99).
//!
//! Two auxiliary sub-formats are also decoded here:
//!
//! - meta lists `"<type>:<value>;<type>:<value>;..."`
//! - sensor id lists `"f<id>,f<id>,..."`
//!
//! Both are decoded tolerantly: malformed segments are dropped and counted
//! in [`TolerantDecode::skipped`] instead of failing the whole request.

use crate::error::IngestError;

/// Number of sensor slots addressable on a single device.
pub const SENSOR_SLOTS: i64 = 100;

/// A decoded (device, sensor) coordinate in hardware-local ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorKey {
    /// Device-local id within the hub.
    pub device: i64,
    /// Sensor-local id within the device (`0..SENSOR_SLOTS`).
    pub sensor: i64,
}

/// Partial decode result carrying the number of dropped segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TolerantDecode<T> {
    /// Successfully decoded entries, in input order.
    pub entries: Vec<T>,
    /// Non-empty segments that were malformed and dropped.
    pub skipped: usize,
}

impl<T> Default for TolerantDecode<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            skipped: 0,
        }
    }
}

/// Decodes a packed `f<digits>` parameter name.
///
/// # Errors
///
/// Returns [`IngestError::MalformedKey`] if `name` does not match
/// `^f[0-9]+$` or the number does not fit in an `i64`.
pub fn decode_key(name: &str) -> Result<SensorKey, IngestError> {
    let packed = parse_f_number(name)?;
    Ok(SensorKey {
        device: packed / SENSOR_SLOTS,
        sensor: packed % SENSOR_SLOTS,
    })
}

/// Encodes a (device, sensor) coordinate as an `f<digits>` parameter name.
///
/// Returns `None` when either id is negative, the sensor does not fit in a
/// slot, or the packed value overflows.
#[must_use]
pub fn encode_key(key: SensorKey) -> Option<String> {
    if key.device < 0 || !(0..SENSOR_SLOTS).contains(&key.sensor) {
        return None;
    }
    let packed = key
        .device
        .checked_mul(SENSOR_SLOTS)?
        .checked_add(key.sensor)?;
    Some(format!("f{packed}"))
}

/// Decodes a sensor-only `f<digits>` key into its slot (`digits mod 100`).
///
/// # Errors
///
/// Returns [`IngestError::MalformedKey`] under the same rules as
/// [`decode_key`].
pub fn decode_sensor_id(name: &str) -> Result<i64, IngestError> {
    Ok(parse_f_number(name)? % SENSOR_SLOTS)
}

/// Decodes a `;`-separated list of `<type>:<value>` meta entries.
///
/// Empty segments are ignored. Segments without a `:`, with an empty side,
/// or with a non-integer type are skipped and counted.
#[must_use]
pub fn decode_meta(raw: &str) -> TolerantDecode<(i64, String)> {
    let mut out = TolerantDecode::default();
    for segment in raw.split(';').filter(|s| !s.is_empty()) {
        let parsed = segment
            .split_once(':')
            .filter(|(kind, value)| !kind.is_empty() && !value.is_empty())
            .and_then(|(kind, value)| {
                kind.parse::<i64>()
                    .ok()
                    .map(|kind| (kind, value.to_string()))
            });
        match parsed {
            Some(entry) => out.entries.push(entry),
            None => out.skipped += 1,
        }
    }
    out
}

/// Decodes a `,`-separated list of `f<id>` sensor ids into sensor slots.
///
/// Empty items are ignored. Items without the `f` prefix or with nothing
/// after it are skipped and counted.
///
/// # Errors
///
/// Returns [`IngestError::MalformedKey`] for an item that carries the `f`
/// prefix but a non-numeric remainder.
pub fn decode_sensor_list(raw: &str) -> Result<TolerantDecode<i64>, IngestError> {
    let mut out = TolerantDecode::default();
    for item in raw.split(',').filter(|s| !s.is_empty()) {
        match item.strip_prefix('f') {
            Some(digits) if !digits.is_empty() => out.entries.push(decode_sensor_id(item)?),
            _ => out.skipped += 1,
        }
    }
    Ok(out)
}

fn parse_f_number(name: &str) -> Result<i64, IngestError> {
    let malformed = || IngestError::MalformedKey(name.to_string());
    let digits = name.strip_prefix('f').ok_or_else(malformed)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    digits.parse::<i64>().map_err(|_| malformed())
}
