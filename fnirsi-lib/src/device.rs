use crate::error::MeterError;
use serde::Serialize;
use std::time::Duration;
use strum_macros::Display;

/// Hardware variants that share the FNIRSI HID protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum DeviceKind {
    #[strum(to_string = "FNB48")]
    #[serde(rename = "FNB48")]
    Fnb48,
    #[strum(to_string = "C1")]
    #[serde(rename = "C1")]
    C1,
    #[strum(to_string = "FNB58")]
    #[serde(rename = "FNB58")]
    Fnb58,
    #[strum(to_string = "FNB48S")]
    #[serde(rename = "FNB48S")]
    Fnb48s,
}

/// A supported (vendor id, product id) pair and how often the meter must be
/// poked to keep streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub kind: DeviceKind,
    pub refresh_interval: Duration,
}

pub const STM_VID: u16 = 0x0483;
pub const FNIRSI_VID: u16 = 0x2E3C;

pub const IDENTITIES: [DeviceIdentity; 4] = [
    // ID 0483:003a STMicroelectronics FNB-48
    DeviceIdentity {
        vendor_id: STM_VID,
        product_id: 0x003A,
        kind: DeviceKind::Fnb48,
        refresh_interval: Duration::from_millis(3),
    },
    // ID 0483:003b STMicroelectronics USB Tester
    DeviceIdentity {
        vendor_id: STM_VID,
        product_id: 0x003B,
        kind: DeviceKind::C1,
        refresh_interval: Duration::from_millis(3),
    },
    DeviceIdentity {
        vendor_id: FNIRSI_VID,
        product_id: 0x5558,
        kind: DeviceKind::Fnb58,
        refresh_interval: Duration::from_secs(1),
    },
    // ID 2e3c:0049 FNIRSI USB Tester
    DeviceIdentity {
        vendor_id: FNIRSI_VID,
        product_id: 0x0049,
        kind: DeviceKind::Fnb48s,
        refresh_interval: Duration::from_secs(1),
    },
];

/// Classify an already-selected USB device.
pub fn identify(vendor_id: u16, product_id: u16) -> Result<&'static DeviceIdentity, MeterError> {
    IDENTITIES
        .iter()
        .find(|id| id.vendor_id == vendor_id && id.product_id == product_id)
        .ok_or(MeterError::UnknownDevice { vendor_id, product_id })
}

/// Whether the pair belongs to one of the supported meters.
pub fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    identify(vendor_id, product_id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identify_known_pairs() {
        assert_eq!(identify(0x0483, 0x003A).unwrap().kind, DeviceKind::Fnb48);
        assert_eq!(identify(0x0483, 0x003B).unwrap().kind, DeviceKind::C1);
        assert_eq!(identify(0x2E3C, 0x5558).unwrap().kind, DeviceKind::Fnb58);
        assert_eq!(identify(0x2E3C, 0x0049).unwrap().kind, DeviceKind::Fnb48s);
    }

    #[test]
    fn identify_unknown_pair() {
        match identify(0x2E3C, 0x0001) {
            Err(MeterError::UnknownDevice { vendor_id, product_id }) => {
                assert_eq!(vendor_id, 0x2E3C);
                assert_eq!(product_id, 0x0001);
            }
            other => panic!("Expected UnknownDevice, got {:?}", other),
        }
        assert!(!is_supported(0x5FC9, 0x0063));
    }

    #[test]
    fn pairs_are_unique() {
        let pairs: HashSet<_> = IDENTITIES.iter().map(|id| (id.vendor_id, id.product_id)).collect();
        assert_eq!(pairs.len(), IDENTITIES.len());
    }

    #[test]
    fn refresh_intervals() {
        assert_eq!(identify(0x0483, 0x003A).unwrap().refresh_interval, Duration::from_millis(3));
        assert_eq!(identify(0x2E3C, 0x0049).unwrap().refresh_interval, Duration::from_secs(1));
    }

    #[test]
    fn kind_names() {
        assert_eq!(DeviceKind::Fnb48s.to_string(), "FNB48S");
        assert_eq!(DeviceKind::C1.to_string(), "C1");
    }
}
