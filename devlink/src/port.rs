// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed projection of devlink port messages.

use core::fmt::{Display, Formatter};

use net::eth::mac::Mac;
use net::interface::InterfaceIndex;
use netlink_packet_utils::DecodeError;

use crate::message::{DevlinkAttr, PortFunctionAttr};

/// The flavour of a devlink port, i.e. which kind of function the port
/// represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortFlavour {
    /// A physical front-panel port.
    Physical,
    /// A port facing the embedded CPU of the device.
    Cpu,
    /// A distributed switch architecture port.
    Dsa,
    /// The representor of a PCI physical function.
    PciPf,
    /// The representor of a PCI virtual function.
    PciVf,
    /// A virtual port of a PCI function, no representor involved.
    Virtual,
    /// A port which is not currently used by the driver.
    Unused,
    /// The representor of a PCI sub-function.
    PciSf,
    /// A flavour this crate does not recognise.
    Unknown(u16),
}

impl From<u16> for PortFlavour {
    fn from(raw: u16) -> Self {
        match raw {
            0 => PortFlavour::Physical,
            1 => PortFlavour::Cpu,
            2 => PortFlavour::Dsa,
            3 => PortFlavour::PciPf,
            4 => PortFlavour::PciVf,
            5 => PortFlavour::Virtual,
            6 => PortFlavour::Unused,
            7 => PortFlavour::PciSf,
            other => PortFlavour::Unknown(other),
        }
    }
}

impl Display for PortFlavour {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            PortFlavour::Physical => write!(f, "physical"),
            PortFlavour::Cpu => write!(f, "cpu"),
            PortFlavour::Dsa => write!(f, "dsa"),
            PortFlavour::PciPf => write!(f, "pcipf"),
            PortFlavour::PciVf => write!(f, "pcivf"),
            PortFlavour::Virtual => write!(f, "virtual"),
            PortFlavour::Unused => write!(f, "unused"),
            PortFlavour::PciSf => write!(f, "pcisf"),
            PortFlavour::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// The type of a devlink port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    /// The port type has not been set.
    NotSet,
    /// The driver selects the port type.
    Auto,
    /// The port is backed by an Ethernet netdev.
    Eth,
    /// The port is backed by an InfiniBand device.
    Ib,
    /// A type this crate does not recognise.
    Unknown(u16),
}

impl From<u16> for PortType {
    fn from(raw: u16) -> Self {
        match raw {
            0 => PortType::NotSet,
            1 => PortType::Auto,
            2 => PortType::Eth,
            3 => PortType::Ib,
            other => PortType::Unknown(other),
        }
    }
}

impl Display for PortType {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            PortType::NotSet => write!(f, "notset"),
            PortType::Auto => write!(f, "auto"),
            PortType::Eth => write!(f, "eth"),
            PortType::Ib => write!(f, "ib"),
            PortType::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// One devlink port, as reported by a dump reply or a multicast
/// notification.
///
/// Attributes the kernel or driver did not supply are `None`; in
/// particular the `PORT_NEW` notification emitted just before a
/// `PORT_DEL` carries no netdev ifindex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevlinkPort {
    /// Name of the bus the device sits on, e.g. `pci`.
    pub bus_name: String,
    /// Bus-specific device name, e.g. `0000:03:00.0`.
    pub dev_name: String,
    /// The devlink-internal index of the port within its device.
    pub index: u32,
    /// The port type, selecting which backing device name applies.
    pub port_type: Option<PortType>,
    /// The port flavour; absent on kernels before 4.18.
    pub flavour: Option<PortFlavour>,
    /// The flavour-specific port number (physical port number).
    pub number: Option<u32>,
    /// The PCI PF number backing this port.
    pub pci_pf_number: Option<u16>,
    /// The PCI VF number backing this port.
    pub pci_vf_number: Option<u16>,
    /// The PCI SF number backing this port.
    pub pci_sf_number: Option<u32>,
    /// The kernel ifindex of the backing netdev.
    pub netdev_ifindex: Option<InterfaceIndex>,
    /// The name of the backing netdev (Ethernet-typed ports only).
    pub netdev_name: Option<String>,
    /// The name of the backing InfiniBand device (IB-typed ports only).
    pub ibdev_name: Option<String>,
    /// The host-visible hardware address of the backed function.
    pub hw_addr: Option<Mac>,
    /// Admin state of the backed function.
    pub fn_state: Option<u8>,
    /// Operational state of the backed function.
    pub fn_opstate: Option<u8>,
}

impl DevlinkPort {
    pub(crate) fn from_attrs(attrs: &[DevlinkAttr]) -> Result<Self, DecodeError> {
        let mut bus_name = None;
        let mut dev_name = None;
        let mut index = None;
        let mut port_type = None;
        let mut flavour = None;
        let mut number = None;
        let mut pci_pf_number = None;
        let mut pci_vf_number = None;
        let mut pci_sf_number = None;
        let mut netdev_ifindex = None;
        let mut netdev_name = None;
        let mut ibdev_name = None;
        let mut hw_addr = None;
        let mut fn_state = None;
        let mut fn_opstate = None;

        for attr in attrs {
            match attr {
                DevlinkAttr::BusName(s) => bus_name = Some(s.clone()),
                DevlinkAttr::DevName(s) => dev_name = Some(s.clone()),
                DevlinkAttr::PortIndex(v) => index = Some(*v),
                DevlinkAttr::PortType(v) => port_type = Some(PortType::from(*v)),
                DevlinkAttr::PortFlavour(v) => flavour = Some(PortFlavour::from(*v)),
                DevlinkAttr::PortNumber(v) => number = Some(*v),
                DevlinkAttr::PortPciPfNumber(v) => pci_pf_number = Some(*v),
                DevlinkAttr::PortPciVfNumber(v) => pci_vf_number = Some(*v),
                DevlinkAttr::PortPciSfNumber(v) => pci_sf_number = Some(*v),
                DevlinkAttr::PortNetdevIfindex(v) => {
                    netdev_ifindex = InterfaceIndex::try_new(*v).ok();
                }
                DevlinkAttr::PortNetdevName(s) => netdev_name = Some(s.clone()),
                DevlinkAttr::PortIbdevName(s) => ibdev_name = Some(s.clone()),
                DevlinkAttr::PortFunction(nested) => {
                    for fn_attr in nested {
                        match fn_attr {
                            PortFunctionAttr::HwAddr(mac) => hw_addr = Some(*mac),
                            PortFunctionAttr::State(v) => fn_state = Some(*v),
                            PortFunctionAttr::OpState(v) => fn_opstate = Some(*v),
                            PortFunctionAttr::Other(_) => {}
                        }
                    }
                }
                _ => {}
            }
        }

        let bus_name = bus_name.ok_or_else(|| DecodeError::from("port without bus name"))?;
        let dev_name = dev_name.ok_or_else(|| DecodeError::from("port without device name"))?;
        let index = index.ok_or_else(|| DecodeError::from("port without port index"))?;

        // The netdev/ibdev name union resolves through the port type.
        let netdev_name = match port_type {
            Some(PortType::Eth) => netdev_name,
            _ => None,
        };
        let ibdev_name = match port_type {
            Some(PortType::Ib) => ibdev_name,
            _ => None,
        };

        Ok(DevlinkPort {
            bus_name,
            dev_name,
            index,
            port_type,
            flavour,
            number,
            pci_pf_number,
            pci_vf_number,
            pci_sf_number,
            netdev_ifindex,
            netdev_name,
            ibdev_name,
            hw_addr,
            fn_state,
            fn_opstate,
        })
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]

    use super::{DevlinkPort, PortFlavour, PortType};
    use crate::message::{DevlinkAttr, PortFunctionAttr};
    use net::eth::mac::Mac;

    fn pf_attrs() -> Vec<DevlinkAttr> {
        vec![
            DevlinkAttr::BusName("pci".to_string()),
            DevlinkAttr::DevName("0000:03:00.0".to_string()),
            DevlinkAttr::PortIndex(1),
            DevlinkAttr::PortType(2),
            DevlinkAttr::PortFlavour(3),
            DevlinkAttr::PortNetdevIfindex(100),
            DevlinkAttr::PortNetdevName("p0hpf".to_string()),
            DevlinkAttr::PortPciPfNumber(0),
            DevlinkAttr::PortFunction(vec![
                PortFunctionAttr::HwAddr(Mac([0x00, 0x53, 0x00, 0x00, 0x00, 0x42])),
                PortFunctionAttr::State(1),
            ]),
        ]
    }

    #[test]
    fn project_pf_port() {
        let port = DevlinkPort::from_attrs(&pf_attrs()).unwrap();
        assert_eq!(port.bus_name, "pci");
        assert_eq!(port.dev_name, "0000:03:00.0");
        assert_eq!(port.port_type, Some(PortType::Eth));
        assert_eq!(port.flavour, Some(PortFlavour::PciPf));
        assert_eq!(port.pci_pf_number, Some(0));
        assert_eq!(port.pci_vf_number, None);
        assert_eq!(port.netdev_ifindex.map(net::interface::InterfaceIndex::to_u32), Some(100));
        assert_eq!(port.netdev_name.as_deref(), Some("p0hpf"));
        assert_eq!(port.hw_addr, Some(Mac([0x00, 0x53, 0x00, 0x00, 0x00, 0x42])));
        assert_eq!(port.fn_state, Some(1));
        assert_eq!(port.fn_opstate, None);
    }

    #[test]
    fn netdev_name_requires_eth_type() {
        let mut attrs = pf_attrs();
        attrs.retain(|a| !matches!(a, DevlinkAttr::PortType(_)));
        attrs.push(DevlinkAttr::PortType(3)); // IB
        let port = DevlinkPort::from_attrs(&attrs).unwrap();
        assert_eq!(port.netdev_name, None);
    }

    #[test]
    fn mandatory_attrs_enforced() {
        let mut attrs = pf_attrs();
        attrs.retain(|a| !matches!(a, DevlinkAttr::BusName(_)));
        assert!(DevlinkPort::from_attrs(&attrs).is_err());
    }

    #[test]
    fn zero_ifindex_surfaces_as_absent() {
        let mut attrs = pf_attrs();
        attrs.retain(|a| !matches!(a, DevlinkAttr::PortNetdevIfindex(_)));
        attrs.push(DevlinkAttr::PortNetdevIfindex(0));
        let port = DevlinkPort::from_attrs(&attrs).unwrap();
        assert_eq!(port.netdev_ifindex, None);
    }

    #[test]
    fn flavour_mapping() {
        assert_eq!(PortFlavour::from(0), PortFlavour::Physical);
        assert_eq!(PortFlavour::from(4), PortFlavour::PciVf);
        assert_eq!(PortFlavour::from(7), PortFlavour::PciSf);
        assert_eq!(PortFlavour::from(250), PortFlavour::Unknown(250));
    }
}
