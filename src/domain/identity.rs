//! Persistent identities resolved from a hub credential.

use serde::{Deserialize, Serialize};

/// Maps a hardware-local (device, sensor) pair to its persistent ids.
///
/// `(hub_id, local_device_id)` determines `device_id` and
/// `(device_id, local_sensor_id)` determines `sensor_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityTuple {
    /// Owning account.
    pub account_id: i64,
    /// Hub the device is attached to.
    pub hub_id: i64,
    /// Persistent device id.
    pub device_id: i64,
    /// Persistent sensor id.
    pub sensor_id: i64,
    /// Hardware-assigned device id, unique within the hub.
    pub local_device_id: i64,
    /// Hardware-assigned sensor id, unique within the device.
    pub local_sensor_id: i64,
}

impl IdentityTuple {
    /// Returns `true` if this tuple describes the given local coordinate.
    #[must_use]
    pub const fn matches(&self, local_device_id: i64, local_sensor_id: i64) -> bool {
        self.local_device_id == local_device_id && self.local_sensor_id == local_sensor_id
    }

    /// Persistent ids carried by this tuple.
    #[must_use]
    pub const fn resolved(&self) -> ResolvedIds {
        ResolvedIds {
            account_id: self.account_id,
            hub_id: self.hub_id,
            device_id: self.device_id,
            sensor_id: self.sensor_id,
        }
    }
}

/// The four persistent ids a reading is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedIds {
    /// Owning account.
    pub account_id: i64,
    /// Hub.
    pub hub_id: i64,
    /// Device.
    pub device_id: i64,
    /// Sensor.
    pub sensor_id: i64,
}

impl ResolvedIds {
    /// Attribution used for readings whose local ids match no tuple.
    ///
    /// Every unmatched reading lands on account/hub/device/sensor `1`,
    /// whichever tenant sent it. Kept as observed hub behaviour until the
    /// owners decide between this and rejecting the reading.
    pub const FALLBACK: Self = Self {
        account_id: 1,
        hub_id: 1,
        device_id: 1,
        sensor_id: 1,
    };
}

/// Hub resolved from a credential, used by registration routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HubRef {
    /// Owning account.
    pub account_id: i64,
    /// Hub id.
    pub hub_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_compares_local_coordinates_only() {
        let tuple = IdentityTuple {
            account_id: 10,
            hub_id: 20,
            device_id: 55,
            sensor_id: 91,
            local_device_id: 3,
            local_sensor_id: 7,
        };
        assert!(tuple.matches(3, 7));
        assert!(!tuple.matches(7, 3));
        assert_eq!(
            tuple.resolved(),
            ResolvedIds {
                account_id: 10,
                hub_id: 20,
                device_id: 55,
                sensor_id: 91
            }
        );
    }
}
