// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed projection of devlink device-info messages.

use netlink_packet_utils::DecodeError;

use crate::message::{DevlinkAttr, InfoVersionAttr};

/// One name/value pair from a devlink version report, e.g.
/// `fw.psid = MT_0000000224`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoVersion {
    /// The version identifier.
    pub name: String,
    /// The reported value.
    pub value: String,
}

impl InfoVersion {
    fn from_nested(nested: &[InfoVersionAttr]) -> Option<InfoVersion> {
        let mut name = None;
        let mut value = None;
        for attr in nested {
            match attr {
                InfoVersionAttr::Name(s) => name = Some(s.clone()),
                InfoVersionAttr::Value(s) => value = Some(s.clone()),
                InfoVersionAttr::Other(_) => {}
            }
        }
        Some(InfoVersion {
            name: name?,
            value: value?,
        })
    }
}

/// Driver and firmware information for one devlink device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevlinkInfo {
    /// Name of the bus the device sits on.
    pub bus_name: Option<String>,
    /// Bus-specific device name.
    pub dev_name: Option<String>,
    /// Name of the device driver.
    pub driver_name: String,
    /// Device serial number.
    pub serial_number: Option<String>,
    /// Board serial number.
    pub board_serial_number: Option<String>,
    /// Versions fixed to the board (never change).
    pub versions_fixed: Vec<InfoVersion>,
    /// Versions of the software currently running.
    pub versions_running: Vec<InfoVersion>,
    /// Versions of the software stored in flash.
    pub versions_stored: Vec<InfoVersion>,
}

impl DevlinkInfo {
    pub(crate) fn from_attrs(attrs: &[DevlinkAttr]) -> Result<Self, DecodeError> {
        let mut bus_name = None;
        let mut dev_name = None;
        let mut driver_name = None;
        let mut serial_number = None;
        let mut board_serial_number = None;
        let mut versions_fixed = Vec::new();
        let mut versions_running = Vec::new();
        let mut versions_stored = Vec::new();

        for attr in attrs {
            match attr {
                DevlinkAttr::BusName(s) => bus_name = Some(s.clone()),
                DevlinkAttr::DevName(s) => dev_name = Some(s.clone()),
                DevlinkAttr::InfoDriverName(s) => driver_name = Some(s.clone()),
                DevlinkAttr::InfoSerialNumber(s) => serial_number = Some(s.clone()),
                DevlinkAttr::InfoBoardSerialNumber(s) => board_serial_number = Some(s.clone()),
                DevlinkAttr::InfoVersionFixed(nested) => {
                    versions_fixed.extend(InfoVersion::from_nested(nested));
                }
                DevlinkAttr::InfoVersionRunning(nested) => {
                    versions_running.extend(InfoVersion::from_nested(nested));
                }
                DevlinkAttr::InfoVersionStored(nested) => {
                    versions_stored.extend(InfoVersion::from_nested(nested));
                }
                _ => {}
            }
        }

        Ok(DevlinkInfo {
            bus_name,
            dev_name,
            driver_name: driver_name
                .ok_or_else(|| DecodeError::from("info without driver name"))?,
            serial_number,
            board_serial_number,
            versions_fixed,
            versions_running,
            versions_stored,
        })
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]

    use super::DevlinkInfo;
    use crate::message::{DevlinkAttr, InfoVersionAttr};

    #[test]
    fn project_info() {
        let info = DevlinkInfo::from_attrs(&[
            DevlinkAttr::BusName("pci".to_string()),
            DevlinkAttr::DevName("0000:03:00.0".to_string()),
            DevlinkAttr::InfoDriverName("mlx5_core".to_string()),
            DevlinkAttr::InfoSerialNumber("MT2042X07126".to_string()),
            DevlinkAttr::InfoVersionRunning(vec![
                InfoVersionAttr::Name("fw.version".to_string()),
                InfoVersionAttr::Value("24.29.2002".to_string()),
            ]),
        ])
        .unwrap();
        assert_eq!(info.driver_name, "mlx5_core");
        assert_eq!(info.serial_number.as_deref(), Some("MT2042X07126"));
        assert_eq!(info.versions_running.len(), 1);
        assert_eq!(info.versions_running[0].name, "fw.version");
        assert_eq!(info.versions_running[0].value, "24.29.2002");
        assert!(info.versions_fixed.is_empty());
    }

    #[test]
    fn driver_name_is_mandatory() {
        assert!(DevlinkInfo::from_attrs(&[DevlinkAttr::BusName("pci".to_string())]).is_err());
    }
}
