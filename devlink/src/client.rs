// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bulk dump requests against the devlink family.

use netlink_packet_core::{NetlinkMessage, NetlinkPayload, NLM_F_DUMP, NLM_F_REQUEST};
use netlink_packet_generic::GenlMessage;
use netlink_packet_utils::DecodeError;
use netlink_sys::{protocols::NETLINK_GENERIC, Socket};

use crate::family;
use crate::info::DevlinkInfo;
use crate::message::{
    Devlink, DevlinkAttr, NetlinkChunks, DEVLINK_CMD_INFO_GET, DEVLINK_CMD_PORT_GET,
};
use crate::port::DevlinkPort;
use crate::DevlinkError;

const RECV_BUF_LEN: usize = 32 * 1024;

/// A handle on the devlink family.
///
/// Construction resolves the family id once; each dump opens a dedicated
/// socket which is closed when the dump completes.
#[derive(Debug, Clone, Copy)]
pub struct DevlinkClient {
    family: u16,
}

impl DevlinkClient {
    /// Resolve the devlink family.
    ///
    /// Fails with [`DevlinkError::FamilyNotFound`] on kernels without
    /// devlink support, in which case the feature is unavailable.
    pub fn new() -> Result<Self, DevlinkError> {
        let family = family::resolve_family()?;
        Ok(DevlinkClient { family })
    }

    /// Dump every devlink port known to the kernel.
    ///
    /// Ports of one device arrive contiguously in the kernel's enumeration
    /// order, but callers must not rely on that: consumers of this crate
    /// tolerate arbitrary interleaving.
    pub fn dump_ports(&self) -> Result<Vec<DevlinkPort>, DevlinkError> {
        self.dump(DEVLINK_CMD_PORT_GET, DevlinkPort::from_attrs)
    }

    /// Dump driver and firmware version information for every devlink
    /// device.
    pub fn dump_info(&self) -> Result<Vec<DevlinkInfo>, DevlinkError> {
        self.dump(DEVLINK_CMD_INFO_GET, DevlinkInfo::from_attrs)
    }

    /// Run one dump request to completion, projecting each reply message.
    ///
    /// A reply that fails to decode fails the whole dump: the table built
    /// from a partial dump would be silently wrong.
    fn dump<T>(
        &self,
        cmd: u8,
        project: fn(&[DevlinkAttr]) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DevlinkError> {
        let mut socket = Socket::new(NETLINK_GENERIC)?;
        socket.bind_auto()?;

        let mut genlmsg = GenlMessage::from_payload(Devlink {
            cmd,
            attrs: Vec::new(),
        });
        genlmsg.set_resolved_family_id(self.family);
        let mut msg = NetlinkMessage::from(genlmsg);
        msg.header.flags = NLM_F_REQUEST | NLM_F_DUMP;
        msg.header.sequence_number = 1;
        msg.finalize();

        let mut tx = vec![0u8; msg.buffer_len()];
        msg.serialize(&mut tx);
        socket.send(&tx, 0)?;

        let mut entries = Vec::new();
        let mut rx: Vec<u8> = Vec::with_capacity(RECV_BUF_LEN);
        loop {
            rx.clear();
            let n = socket.recv(&mut rx, 0)?;
            if n == 0 {
                return Ok(entries);
            }
            for chunk in NetlinkChunks::new(&rx[..n]) {
                let reply = NetlinkMessage::<GenlMessage<Devlink>>::deserialize(chunk)
                    .map_err(DevlinkError::Proto)?;
                match reply.payload {
                    NetlinkPayload::Done(_) => return Ok(entries),
                    NetlinkPayload::Error(err) if err.code.is_some() => {
                        return Err(DevlinkError::Io(err.to_io()));
                    }
                    NetlinkPayload::Error(_) => return Ok(entries),
                    NetlinkPayload::InnerMessage(genl) => {
                        entries.push(project(&genl.payload.attrs).map_err(DevlinkError::Proto)?);
                    }
                    _ => {}
                }
            }
        }
    }
}
