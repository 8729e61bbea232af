//! Enumerating supported meters and picking one.

use crate::device::{DeviceIdentity, DeviceKind, identify};
use crate::error::MeterError;
use nusb::DeviceInfo;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Anything `select` can choose between.
pub trait MeterCandidate {
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn serial_number(&self) -> Option<&str>;
}

/// A connected USB device whose ids are in the identity table.
#[derive(Debug, Clone)]
pub struct MeterDevice {
    pub info: DeviceInfo,
    pub identity: DeviceIdentity,
}

impl MeterDevice {
    pub fn listing(&self) -> DeviceListing {
        DeviceListing {
            vendor_id: format!("{:04x}", self.identity.vendor_id),
            product_id: format!("{:04x}", self.identity.product_id),
            kind: self.identity.kind,
            serial: self.info.serial_number().map(str::to_string),
            product: self.info.product_string().map(str::to_string),
            bus: self.info.bus_number(),
            address: self.info.device_address(),
        }
    }
}

impl MeterCandidate for MeterDevice {
    fn vendor_id(&self) -> u16 {
        self.info.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.info.product_id()
    }

    fn serial_number(&self) -> Option<&str> {
        self.info.serial_number()
    }
}

/// Printable summary of one connected meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceListing {
    pub vendor_id: String,
    pub product_id: String,
    pub kind: DeviceKind,
    pub serial: Option<String>,
    pub product: Option<String>,
    pub bus: u8,
    pub address: u8,
}

impl fmt::Display for DeviceListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<6} {}:{} bus {:03} addr {:03} serial {}",
            self.kind,
            self.vendor_id,
            self.product_id,
            self.bus,
            self.address,
            self.serial.as_deref().unwrap_or("-")
        )
    }
}

/// All connected devices with a known (vendor id, product id) pair.
pub fn list_meters() -> Result<Vec<MeterDevice>, MeterError> {
    let meters: Vec<_> = nusb::list_devices()?
        .filter_map(|info| {
            let identity = *identify(info.vendor_id(), info.product_id()).ok()?;
            Some(MeterDevice { info, identity })
        })
        .collect();
    debug!("Found {} supported meter(s)", meters.len());
    Ok(meters)
}

/// Enumerate and pick in one step.
pub fn find_meter(selector: &DeviceSelector) -> Result<MeterDevice, MeterError> {
    select(list_meters()?, selector)
}

/// How the user names the meter to open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// The first supported meter found
    #[default]
    First,
    /// Serial number as normalized hex digits: lowercase, no leading zeros
    Serial(String),
    VidPid { vendor_id: u16, product_id: u16 },
}

impl DeviceSelector {
    pub fn serial(value: &str) -> Result<Self, MeterError> {
        parse_hex_serial(value)
            .map(DeviceSelector::Serial)
            .ok_or_else(|| MeterError::MalformedIdentifier {
                kind: "serial number",
                value: value.to_string(),
            })
    }

    /// Parse `VID:PID` in hex, e.g. `2e3c:5558`.
    pub fn vid_pid(value: &str) -> Result<Self, MeterError> {
        let malformed = || MeterError::MalformedIdentifier {
            kind: "VID:PID",
            value: value.to_string(),
        };
        let (vid, pid) = value.split_once(':').ok_or_else(malformed)?;
        let parse = |s: &str| u16::from_str_radix(strip_hex_prefix(s.trim()), 16).map_err(|_| malformed());
        Ok(DeviceSelector::VidPid {
            vendor_id: parse(vid)?,
            product_id: parse(pid)?,
        })
    }

    pub fn matches(&self, candidate: &impl MeterCandidate) -> bool {
        match self {
            DeviceSelector::First => true,
            DeviceSelector::Serial(wanted) => {
                candidate.serial_number().and_then(parse_hex_serial).as_ref() == Some(wanted)
            }
            DeviceSelector::VidPid { vendor_id, product_id } => {
                candidate.vendor_id() == *vendor_id && candidate.product_id() == *product_id
            }
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = MeterError;

    /// `VID:PID` when the string has a colon, a hex serial number otherwise.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            Self::vid_pid(s)
        } else {
            Self::serial(s)
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::First => write!(f, "any supported meter"),
            DeviceSelector::Serial(sn) => write!(f, "serial number {}", sn.to_uppercase()),
            DeviceSelector::VidPid { vendor_id, product_id } => write!(f, "{vendor_id:04x}:{product_id:04x}"),
        }
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

/// Hex digits of any length, normalized so equal values compare equal.
fn parse_hex_serial(s: &str) -> Option<String> {
    let digits = strip_hex_prefix(s.trim());
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Some("0".to_string());
    }
    Some(significant.to_ascii_lowercase())
}

/// Pick the candidate named by `selector`.
///
/// `First` takes the first candidate. The other selectors must match exactly
/// one.
pub fn select<T: MeterCandidate>(candidates: Vec<T>, selector: &DeviceSelector) -> Result<T, MeterError> {
    if candidates.is_empty() {
        return Err(MeterError::DeviceNotFound);
    }

    if *selector == DeviceSelector::First {
        if candidates.len() > 1 {
            warn!("{} meters connected, using the first one", candidates.len());
        }
        return candidates.into_iter().next().ok_or(MeterError::DeviceNotFound);
    }

    let mut matching: Vec<T> = candidates.into_iter().filter(|c| selector.matches(c)).collect();
    match matching.len() {
        0 => Err(MeterError::NoMatchingDevice {
            selector: selector.to_string(),
        }),
        1 => matching.pop().ok_or(MeterError::DeviceNotFound),
        count => Err(MeterError::AmbiguousSelector {
            selector: selector.to_string(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_is_hex() {
        let expected = DeviceSelector::Serial("1f".to_string());
        assert_eq!(DeviceSelector::serial("0x1F").unwrap(), expected);
        assert_eq!(DeviceSelector::serial("001f").unwrap(), expected);
        assert_eq!(DeviceSelector::serial("0000").unwrap(), DeviceSelector::Serial("0".to_string()));
        assert!(matches!(
            DeviceSelector::serial("xyz"),
            Err(MeterError::MalformedIdentifier { kind: "serial number", .. })
        ));
        assert!(DeviceSelector::serial("").is_err());
    }

    #[test]
    fn vid_pid_parsing() {
        assert_eq!(
            "2e3c:5558".parse::<DeviceSelector>().unwrap(),
            DeviceSelector::VidPid {
                vendor_id: 0x2E3C,
                product_id: 0x5558
            }
        );
        assert!(DeviceSelector::vid_pid("2e3c").is_err());
        assert!(DeviceSelector::vid_pid("2e3c:zz").is_err());
        assert!(DeviceSelector::vid_pid("12345:0001").is_err());
    }

    #[test]
    fn display() {
        let sel = DeviceSelector::VidPid {
            vendor_id: 0x0483,
            product_id: 0x003A,
        };
        assert_eq!(sel.to_string(), "0483:003a");
        assert_eq!(DeviceSelector::Serial("ab".to_string()).to_string(), "serial number AB");
    }
}
