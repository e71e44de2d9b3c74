// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Wire representation of devlink generic-netlink messages.

use byteorder::{ByteOrder, NativeEndian};
use net::eth::mac::Mac;
use netlink_packet_generic::{GenlFamily, GenlHeader};
use netlink_packet_utils::nla::{DefaultNla, Nla, NlaBuffer, NlasIterator};
use netlink_packet_utils::parsers::{parse_string, parse_u16, parse_u32, parse_u8};
use netlink_packet_utils::{DecodeError, Emitable, Parseable, ParseableParametrized};

use crate::DEVLINK_FAMILY_NAME;

pub(crate) const DEVLINK_GENL_VERSION: u8 = 1;

pub(crate) const DEVLINK_CMD_PORT_GET: u8 = 5;
pub(crate) const DEVLINK_CMD_PORT_NEW: u8 = 7;
pub(crate) const DEVLINK_CMD_PORT_DEL: u8 = 8;
pub(crate) const DEVLINK_CMD_INFO_GET: u8 = 51;

const DEVLINK_ATTR_BUS_NAME: u16 = 1;
const DEVLINK_ATTR_DEV_NAME: u16 = 2;
const DEVLINK_ATTR_PORT_INDEX: u16 = 3;
const DEVLINK_ATTR_PORT_TYPE: u16 = 4;
const DEVLINK_ATTR_PORT_NETDEV_IFINDEX: u16 = 6;
const DEVLINK_ATTR_PORT_NETDEV_NAME: u16 = 7;
const DEVLINK_ATTR_PORT_IBDEV_NAME: u16 = 8;
const DEVLINK_ATTR_PORT_FLAVOUR: u16 = 77;
const DEVLINK_ATTR_PORT_NUMBER: u16 = 78;
const DEVLINK_ATTR_INFO_DRIVER_NAME: u16 = 98;
const DEVLINK_ATTR_INFO_SERIAL_NUMBER: u16 = 99;
const DEVLINK_ATTR_INFO_VERSION_FIXED: u16 = 100;
const DEVLINK_ATTR_INFO_VERSION_RUNNING: u16 = 101;
const DEVLINK_ATTR_INFO_VERSION_STORED: u16 = 102;
const DEVLINK_ATTR_INFO_VERSION_NAME: u16 = 103;
const DEVLINK_ATTR_INFO_VERSION_VALUE: u16 = 104;
const DEVLINK_ATTR_PORT_PCI_PF_NUMBER: u16 = 118;
const DEVLINK_ATTR_PORT_PCI_VF_NUMBER: u16 = 119;
const DEVLINK_ATTR_PORT_FUNCTION: u16 = 136;
const DEVLINK_ATTR_INFO_BOARD_SERIAL_NUMBER: u16 = 137;
const DEVLINK_ATTR_PORT_PCI_SF_NUMBER: u16 = 155;

const DEVLINK_PORT_FUNCTION_ATTR_HW_ADDR: u16 = 1;
const DEVLINK_PORT_FN_ATTR_STATE: u16 = 2;
const DEVLINK_PORT_FN_ATTR_OPSTATE: u16 = 3;

/// One devlink message: the generic-netlink command plus its attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Devlink {
    pub(crate) cmd: u8,
    pub(crate) attrs: Vec<DevlinkAttr>,
}

impl GenlFamily for Devlink {
    fn family_name() -> &'static str {
        DEVLINK_FAMILY_NAME
    }

    fn command(&self) -> u8 {
        self.cmd
    }

    fn version(&self) -> u8 {
        DEVLINK_GENL_VERSION
    }
}

impl Emitable for Devlink {
    fn buffer_len(&self) -> usize {
        self.attrs.as_slice().buffer_len()
    }

    fn emit(&self, buffer: &mut [u8]) {
        self.attrs.as_slice().emit(buffer);
    }
}

impl ParseableParametrized<[u8], GenlHeader> for Devlink {
    fn parse_with_param(buf: &[u8], header: GenlHeader) -> Result<Self, DecodeError> {
        let mut attrs = Vec::new();
        for nla in NlasIterator::new(buf) {
            attrs.push(DevlinkAttr::parse(&nla?)?);
        }
        Ok(Devlink {
            cmd: header.cmd,
            attrs,
        })
    }
}

/// The subset of devlink attributes this crate decodes, plus a passthrough
/// for everything else.  Attribute numbering is global to the family, so
/// the same kinds appear in port and info messages alike.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DevlinkAttr {
    BusName(String),
    DevName(String),
    PortIndex(u32),
    PortType(u16),
    PortNetdevIfindex(u32),
    PortNetdevName(String),
    PortIbdevName(String),
    PortFlavour(u16),
    PortNumber(u32),
    PortPciPfNumber(u16),
    PortPciVfNumber(u16),
    PortPciSfNumber(u32),
    PortFunction(Vec<PortFunctionAttr>),
    InfoDriverName(String),
    InfoSerialNumber(String),
    InfoBoardSerialNumber(String),
    InfoVersionFixed(Vec<InfoVersionAttr>),
    InfoVersionRunning(Vec<InfoVersionAttr>),
    InfoVersionStored(Vec<InfoVersionAttr>),
    Other(DefaultNla),
}

impl Nla for DevlinkAttr {
    fn value_len(&self) -> usize {
        match self {
            DevlinkAttr::BusName(s)
            | DevlinkAttr::DevName(s)
            | DevlinkAttr::PortNetdevName(s)
            | DevlinkAttr::PortIbdevName(s)
            | DevlinkAttr::InfoDriverName(s)
            | DevlinkAttr::InfoSerialNumber(s)
            | DevlinkAttr::InfoBoardSerialNumber(s) => s.len() + 1,
            DevlinkAttr::PortIndex(_)
            | DevlinkAttr::PortNetdevIfindex(_)
            | DevlinkAttr::PortNumber(_)
            | DevlinkAttr::PortPciSfNumber(_) => 4,
            DevlinkAttr::PortType(_)
            | DevlinkAttr::PortFlavour(_)
            | DevlinkAttr::PortPciPfNumber(_)
            | DevlinkAttr::PortPciVfNumber(_) => 2,
            DevlinkAttr::PortFunction(nested) => nested.as_slice().buffer_len(),
            DevlinkAttr::InfoVersionFixed(nested)
            | DevlinkAttr::InfoVersionRunning(nested)
            | DevlinkAttr::InfoVersionStored(nested) => nested.as_slice().buffer_len(),
            DevlinkAttr::Other(nla) => nla.value_len(),
        }
    }

    fn kind(&self) -> u16 {
        match self {
            DevlinkAttr::BusName(_) => DEVLINK_ATTR_BUS_NAME,
            DevlinkAttr::DevName(_) => DEVLINK_ATTR_DEV_NAME,
            DevlinkAttr::PortIndex(_) => DEVLINK_ATTR_PORT_INDEX,
            DevlinkAttr::PortType(_) => DEVLINK_ATTR_PORT_TYPE,
            DevlinkAttr::PortNetdevIfindex(_) => DEVLINK_ATTR_PORT_NETDEV_IFINDEX,
            DevlinkAttr::PortNetdevName(_) => DEVLINK_ATTR_PORT_NETDEV_NAME,
            DevlinkAttr::PortIbdevName(_) => DEVLINK_ATTR_PORT_IBDEV_NAME,
            DevlinkAttr::PortFlavour(_) => DEVLINK_ATTR_PORT_FLAVOUR,
            DevlinkAttr::PortNumber(_) => DEVLINK_ATTR_PORT_NUMBER,
            DevlinkAttr::PortPciPfNumber(_) => DEVLINK_ATTR_PORT_PCI_PF_NUMBER,
            DevlinkAttr::PortPciVfNumber(_) => DEVLINK_ATTR_PORT_PCI_VF_NUMBER,
            DevlinkAttr::PortPciSfNumber(_) => DEVLINK_ATTR_PORT_PCI_SF_NUMBER,
            DevlinkAttr::PortFunction(_) => DEVLINK_ATTR_PORT_FUNCTION,
            DevlinkAttr::InfoDriverName(_) => DEVLINK_ATTR_INFO_DRIVER_NAME,
            DevlinkAttr::InfoSerialNumber(_) => DEVLINK_ATTR_INFO_SERIAL_NUMBER,
            DevlinkAttr::InfoBoardSerialNumber(_) => DEVLINK_ATTR_INFO_BOARD_SERIAL_NUMBER,
            DevlinkAttr::InfoVersionFixed(_) => DEVLINK_ATTR_INFO_VERSION_FIXED,
            DevlinkAttr::InfoVersionRunning(_) => DEVLINK_ATTR_INFO_VERSION_RUNNING,
            DevlinkAttr::InfoVersionStored(_) => DEVLINK_ATTR_INFO_VERSION_STORED,
            DevlinkAttr::Other(nla) => nla.kind(),
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            DevlinkAttr::BusName(s)
            | DevlinkAttr::DevName(s)
            | DevlinkAttr::PortNetdevName(s)
            | DevlinkAttr::PortIbdevName(s)
            | DevlinkAttr::InfoDriverName(s)
            | DevlinkAttr::InfoSerialNumber(s)
            | DevlinkAttr::InfoBoardSerialNumber(s) => {
                buffer[..s.len()].copy_from_slice(s.as_bytes());
                buffer[s.len()] = 0;
            }
            DevlinkAttr::PortIndex(v)
            | DevlinkAttr::PortNetdevIfindex(v)
            | DevlinkAttr::PortNumber(v)
            | DevlinkAttr::PortPciSfNumber(v) => NativeEndian::write_u32(buffer, *v),
            DevlinkAttr::PortType(v)
            | DevlinkAttr::PortFlavour(v)
            | DevlinkAttr::PortPciPfNumber(v)
            | DevlinkAttr::PortPciVfNumber(v) => NativeEndian::write_u16(buffer, *v),
            DevlinkAttr::PortFunction(nested) => nested.as_slice().emit(buffer),
            DevlinkAttr::InfoVersionFixed(nested)
            | DevlinkAttr::InfoVersionRunning(nested)
            | DevlinkAttr::InfoVersionStored(nested) => nested.as_slice().emit(buffer),
            DevlinkAttr::Other(nla) => nla.emit_value(buffer),
        }
    }

    fn is_nested(&self) -> bool {
        matches!(
            self,
            DevlinkAttr::PortFunction(_)
                | DevlinkAttr::InfoVersionFixed(_)
                | DevlinkAttr::InfoVersionRunning(_)
                | DevlinkAttr::InfoVersionStored(_)
        )
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Parseable<NlaBuffer<&'a T>> for DevlinkAttr {
    fn parse(buf: &NlaBuffer<&'a T>) -> Result<Self, DecodeError> {
        let payload = buf.value();
        Ok(match buf.kind() {
            DEVLINK_ATTR_BUS_NAME => DevlinkAttr::BusName(parse_string(payload)?),
            DEVLINK_ATTR_DEV_NAME => DevlinkAttr::DevName(parse_string(payload)?),
            DEVLINK_ATTR_PORT_INDEX => DevlinkAttr::PortIndex(parse_u32(payload)?),
            DEVLINK_ATTR_PORT_TYPE => DevlinkAttr::PortType(parse_u16(payload)?),
            DEVLINK_ATTR_PORT_NETDEV_IFINDEX => {
                DevlinkAttr::PortNetdevIfindex(parse_u32(payload)?)
            }
            DEVLINK_ATTR_PORT_NETDEV_NAME => DevlinkAttr::PortNetdevName(parse_string(payload)?),
            DEVLINK_ATTR_PORT_IBDEV_NAME => DevlinkAttr::PortIbdevName(parse_string(payload)?),
            DEVLINK_ATTR_PORT_FLAVOUR => DevlinkAttr::PortFlavour(parse_u16(payload)?),
            DEVLINK_ATTR_PORT_NUMBER => DevlinkAttr::PortNumber(parse_u32(payload)?),
            DEVLINK_ATTR_PORT_PCI_PF_NUMBER => DevlinkAttr::PortPciPfNumber(parse_u16(payload)?),
            DEVLINK_ATTR_PORT_PCI_VF_NUMBER => DevlinkAttr::PortPciVfNumber(parse_u16(payload)?),
            DEVLINK_ATTR_PORT_PCI_SF_NUMBER => DevlinkAttr::PortPciSfNumber(parse_u32(payload)?),
            DEVLINK_ATTR_PORT_FUNCTION => {
                let mut nested = Vec::new();
                for nla in NlasIterator::new(payload) {
                    nested.push(PortFunctionAttr::parse(&nla?)?);
                }
                DevlinkAttr::PortFunction(nested)
            }
            DEVLINK_ATTR_INFO_DRIVER_NAME => DevlinkAttr::InfoDriverName(parse_string(payload)?),
            DEVLINK_ATTR_INFO_SERIAL_NUMBER => {
                DevlinkAttr::InfoSerialNumber(parse_string(payload)?)
            }
            DEVLINK_ATTR_INFO_BOARD_SERIAL_NUMBER => {
                DevlinkAttr::InfoBoardSerialNumber(parse_string(payload)?)
            }
            kind @ (DEVLINK_ATTR_INFO_VERSION_FIXED
            | DEVLINK_ATTR_INFO_VERSION_RUNNING
            | DEVLINK_ATTR_INFO_VERSION_STORED) => {
                let mut nested = Vec::new();
                for nla in NlasIterator::new(payload) {
                    nested.push(InfoVersionAttr::parse(&nla?)?);
                }
                match kind {
                    DEVLINK_ATTR_INFO_VERSION_FIXED => DevlinkAttr::InfoVersionFixed(nested),
                    DEVLINK_ATTR_INFO_VERSION_RUNNING => DevlinkAttr::InfoVersionRunning(nested),
                    _ => DevlinkAttr::InfoVersionStored(nested),
                }
            }
            _ => DevlinkAttr::Other(DefaultNla::parse(buf)?),
        })
    }
}

/// Attributes nested under `DEVLINK_ATTR_PORT_FUNCTION`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PortFunctionAttr {
    /// The host-visible hardware address of the function.
    HwAddr(Mac),
    State(u8),
    OpState(u8),
    Other(DefaultNla),
}

impl Nla for PortFunctionAttr {
    fn value_len(&self) -> usize {
        match self {
            PortFunctionAttr::HwAddr(_) => 6,
            PortFunctionAttr::State(_) | PortFunctionAttr::OpState(_) => 1,
            PortFunctionAttr::Other(nla) => nla.value_len(),
        }
    }

    fn kind(&self) -> u16 {
        match self {
            PortFunctionAttr::HwAddr(_) => DEVLINK_PORT_FUNCTION_ATTR_HW_ADDR,
            PortFunctionAttr::State(_) => DEVLINK_PORT_FN_ATTR_STATE,
            PortFunctionAttr::OpState(_) => DEVLINK_PORT_FN_ATTR_OPSTATE,
            PortFunctionAttr::Other(nla) => nla.kind(),
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            PortFunctionAttr::HwAddr(mac) => buffer[..6].copy_from_slice(mac.as_ref()),
            PortFunctionAttr::State(v) | PortFunctionAttr::OpState(v) => buffer[0] = *v,
            PortFunctionAttr::Other(nla) => nla.emit_value(buffer),
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Parseable<NlaBuffer<&'a T>> for PortFunctionAttr {
    fn parse(buf: &NlaBuffer<&'a T>) -> Result<Self, DecodeError> {
        let payload = buf.value();
        Ok(match buf.kind() {
            DEVLINK_PORT_FUNCTION_ATTR_HW_ADDR => {
                // Ethernet addresses only.  An InfiniBand GID (or anything
                // else) makes the whole message undecodable.
                if payload.len() != 6 {
                    return Err(DecodeError::from(format!(
                        "port function hardware address is {} bytes, expected 6",
                        payload.len()
                    )));
                }
                let mut mac = [0u8; 6];
                mac.copy_from_slice(payload);
                PortFunctionAttr::HwAddr(Mac::from(mac))
            }
            DEVLINK_PORT_FN_ATTR_STATE => PortFunctionAttr::State(parse_u8(payload)?),
            DEVLINK_PORT_FN_ATTR_OPSTATE => PortFunctionAttr::OpState(parse_u8(payload)?),
            _ => PortFunctionAttr::Other(DefaultNla::parse(buf)?),
        })
    }
}

/// Attributes nested under the `DEVLINK_ATTR_INFO_VERSION_*` containers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum InfoVersionAttr {
    Name(String),
    Value(String),
    Other(DefaultNla),
}

impl Nla for InfoVersionAttr {
    fn value_len(&self) -> usize {
        match self {
            InfoVersionAttr::Name(s) | InfoVersionAttr::Value(s) => s.len() + 1,
            InfoVersionAttr::Other(nla) => nla.value_len(),
        }
    }

    fn kind(&self) -> u16 {
        match self {
            InfoVersionAttr::Name(_) => DEVLINK_ATTR_INFO_VERSION_NAME,
            InfoVersionAttr::Value(_) => DEVLINK_ATTR_INFO_VERSION_VALUE,
            InfoVersionAttr::Other(nla) => nla.kind(),
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            InfoVersionAttr::Name(s) | InfoVersionAttr::Value(s) => {
                buffer[..s.len()].copy_from_slice(s.as_bytes());
                buffer[s.len()] = 0;
            }
            InfoVersionAttr::Other(nla) => nla.emit_value(buffer),
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Parseable<NlaBuffer<&'a T>> for InfoVersionAttr {
    fn parse(buf: &NlaBuffer<&'a T>) -> Result<Self, DecodeError> {
        let payload = buf.value();
        Ok(match buf.kind() {
            DEVLINK_ATTR_INFO_VERSION_NAME => InfoVersionAttr::Name(parse_string(payload)?),
            DEVLINK_ATTR_INFO_VERSION_VALUE => InfoVersionAttr::Value(parse_string(payload)?),
            _ => InfoVersionAttr::Other(DefaultNla::parse(buf)?),
        })
    }
}

const NETLINK_HEADER_LEN: usize = 16;

/// Splits a receive buffer into the individual netlink messages it holds.
///
/// Netlink aligns each message in a datagram to four bytes; the final
/// message may omit the trailing padding.
pub(crate) struct NetlinkChunks<'a> {
    buf: &'a [u8],
}

impl<'a> NetlinkChunks<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl<'a> Iterator for NetlinkChunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.buf.len() < NETLINK_HEADER_LEN {
            return None;
        }
        let len = NativeEndian::read_u32(&self.buf[..4]) as usize;
        if len < NETLINK_HEADER_LEN || len > self.buf.len() {
            return None;
        }
        let chunk = &self.buf[..len];
        let aligned = (len + 3) & !3;
        self.buf = &self.buf[aligned.min(self.buf.len())..];
        Some(chunk)
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]

    use super::{Devlink, DevlinkAttr, NetlinkChunks, PortFunctionAttr};
    use net::eth::mac::Mac;
    use netlink_packet_generic::GenlHeader;
    use netlink_packet_utils::nla::NlaBuffer;
    use netlink_packet_utils::{Emitable, Parseable, ParseableParametrized};

    fn emit(attrs: &[DevlinkAttr]) -> Vec<u8> {
        let mut buf = vec![0u8; attrs.buffer_len()];
        attrs.emit(&mut buf);
        buf
    }

    #[test]
    fn parse_port_message_attrs() {
        let wire = emit(&[
            DevlinkAttr::BusName("pci".to_string()),
            DevlinkAttr::DevName("0000:03:00.0".to_string()),
            DevlinkAttr::PortIndex(1),
            DevlinkAttr::PortFlavour(3),
            DevlinkAttr::PortNetdevIfindex(100),
            DevlinkAttr::PortNetdevName("p0hpf".to_string()),
            DevlinkAttr::PortPciPfNumber(0),
            DevlinkAttr::PortFunction(vec![PortFunctionAttr::HwAddr(Mac([
                0x00, 0x53, 0x00, 0x00, 0x00, 0x42,
            ]))]),
        ]);
        let msg = Devlink::parse_with_param(&wire, GenlHeader { cmd: 7, version: 1 }).unwrap();
        assert_eq!(msg.cmd, 7);
        assert!(msg
            .attrs
            .contains(&DevlinkAttr::DevName("0000:03:00.0".to_string())));
        assert!(msg.attrs.contains(&DevlinkAttr::PortFunction(vec![
            PortFunctionAttr::HwAddr(Mac([0x00, 0x53, 0x00, 0x00, 0x00, 0x42]))
        ])));
    }

    #[test]
    fn reject_odd_sized_hardware_address() {
        // A 20 byte InfiniBand GID in the hw_addr slot must make the parse
        // fail rather than truncate.
        let mut nla = vec![0u8; 4 + 20];
        nla[0] = 24; // length
        nla[1] = 0;
        nla[2] = 1; // DEVLINK_PORT_FUNCTION_ATTR_HW_ADDR
        nla[3] = 0;
        let buf = NlaBuffer::new(&nla[..]);
        assert!(PortFunctionAttr::parse(&buf).is_err());
    }

    #[test]
    fn chunking_walks_aligned_messages() {
        // Two minimal messages: 17 bytes (padded to 20) then 16 bytes.
        let mut buf = vec![0u8; 36];
        buf[0] = 17;
        buf[20] = 16;
        let chunks: Vec<&[u8]> = NetlinkChunks::new(&buf).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 17);
        assert_eq!(chunks[1].len(), 16);
    }

    #[test]
    fn chunking_stops_on_truncated_message() {
        let mut buf = vec![0u8; 16];
        buf[0] = 64; // claims more than the buffer holds
        assert_eq!(NetlinkChunks::new(&buf).count(), 0);
    }
}
