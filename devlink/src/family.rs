// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resolution of the dynamically numbered devlink family and its
//! multicast groups through the generic-netlink controller.

use netlink_packet_core::{NetlinkMessage, NetlinkPayload, NLM_F_REQUEST};
use netlink_packet_generic::ctrl::nlas::{GenlCtrlAttrs, McastGrpAttrs};
use netlink_packet_generic::ctrl::{GenlCtrl, GenlCtrlCmd};
use netlink_packet_generic::GenlMessage;
use netlink_sys::{protocols::NETLINK_GENERIC, Socket};

use crate::message::NetlinkChunks;
use crate::{DevlinkError, DEVLINK_FAMILY_NAME};

const RECV_BUF_LEN: usize = 32 * 1024;

/// Ask the generic-netlink controller about the devlink family.
///
/// Returns the family's control attributes, from which callers pick the
/// family id or a multicast group id.  A kernel without devlink answers
/// `ENOENT`, surfaced as [`DevlinkError::FamilyNotFound`].
fn query_family() -> Result<Vec<GenlCtrlAttrs>, DevlinkError> {
    let mut socket = Socket::new(NETLINK_GENERIC)?;
    socket.bind_auto()?;

    let genlmsg = GenlMessage::from_payload(GenlCtrl {
        cmd: GenlCtrlCmd::GetFamily,
        nlas: vec![GenlCtrlAttrs::FamilyName(DEVLINK_FAMILY_NAME.to_string())],
    });
    let mut msg = NetlinkMessage::from(genlmsg);
    msg.header.flags = NLM_F_REQUEST;
    msg.header.sequence_number = 1;
    msg.finalize();

    let mut tx = vec![0u8; msg.buffer_len()];
    msg.serialize(&mut tx);
    socket.send(&tx, 0)?;

    let mut rx: Vec<u8> = Vec::with_capacity(RECV_BUF_LEN);
    let n = socket.recv(&mut rx, 0)?;
    for chunk in NetlinkChunks::new(&rx[..n]) {
        let reply = NetlinkMessage::<GenlMessage<GenlCtrl>>::deserialize(chunk)
            .map_err(DevlinkError::Proto)?;
        match reply.payload {
            NetlinkPayload::InnerMessage(genl) => return Ok(genl.payload.nlas),
            NetlinkPayload::Error(err) if err.code.is_some() => {
                return Err(if err.raw_code() == -libc::ENOENT {
                    DevlinkError::FamilyNotFound
                } else {
                    DevlinkError::Io(err.to_io())
                });
            }
            _ => {}
        }
    }
    Err(DevlinkError::FamilyNotFound)
}

/// Resolve the generic-netlink id of the devlink family.
pub(crate) fn resolve_family() -> Result<u16, DevlinkError> {
    for nla in query_family()? {
        if let GenlCtrlAttrs::FamilyId(id) = nla {
            return Ok(id);
        }
    }
    Err(DevlinkError::FamilyNotFound)
}

/// Resolve the id of a devlink multicast group by name.
pub(crate) fn resolve_mcast_group(group: &str) -> Result<u32, DevlinkError> {
    for nla in query_family()? {
        let GenlCtrlAttrs::McastGroups(groups) = nla else {
            continue;
        };
        for grp in groups {
            let mut id = None;
            let mut matched = false;
            for attr in grp {
                match attr {
                    McastGrpAttrs::Id(grp_id) => id = Some(grp_id),
                    McastGrpAttrs::Name(name) => matched = name == group,
                }
            }
            if matched {
                if let Some(id) = id {
                    return Ok(id);
                }
            }
        }
    }
    Err(DevlinkError::McastGroupNotFound(group.to_string()))
}
