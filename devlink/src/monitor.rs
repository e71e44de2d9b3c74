// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Non-blocking subscription to devlink port notifications.

use std::collections::VecDeque;
use std::io;

use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_generic::GenlMessage;
use netlink_sys::{protocols::NETLINK_GENERIC, Socket};

use crate::family;
use crate::message::{Devlink, NetlinkChunks, DEVLINK_CMD_PORT_DEL, DEVLINK_CMD_PORT_NEW};
use crate::port::DevlinkPort;
use crate::{DevlinkError, DEVLINK_MCGRP_CONFIG};

#[allow(unused)]
use tracing::{debug, error, trace, warn};

const RECV_BUF_LEN: usize = 32 * 1024;

/// A port add/remove notification from the devlink `config` multicast
/// group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    /// A port appeared or changed.
    New(DevlinkPort),
    /// A port went away.
    Del(DevlinkPort),
}

/// A non-blocking subscription to the devlink `config` multicast group.
///
/// The socket is held for the lifetime of the monitor and drained with
/// [`DevlinkMonitor::try_next`].
#[derive(Debug)]
pub struct DevlinkMonitor {
    socket: Socket,
    pending: VecDeque<PortEvent>,
    rx: Vec<u8>,
}

impl DevlinkMonitor {
    /// Resolve the `config` multicast group, open a generic-netlink
    /// socket and join the group.
    pub fn new() -> Result<Self, DevlinkError> {
        let group = family::resolve_mcast_group(DEVLINK_MCGRP_CONFIG)?;
        let mut socket = Socket::new(NETLINK_GENERIC)?;
        socket.bind_auto()?;
        socket.add_membership(group)?;
        socket.set_non_blocking(true)?;
        Ok(DevlinkMonitor {
            socket,
            pending: VecDeque::new(),
            rx: Vec::with_capacity(RECV_BUF_LEN),
        })
    }

    /// Pop the next pending port event, receiving from the socket as
    /// needed.  Returns `None` once the socket reports it would block.
    ///
    /// A socket overflow (`ENOBUFS`) is logged and drained past: events
    /// were lost, and the caller's next full dump will resynchronise.
    pub fn try_next(&mut self) -> Option<PortEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            self.rx.clear();
            let n = match self.socket.recv(&mut self.rx, 0) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    warn!("devlink monitor socket overflowed: {e}");
                    continue;
                }
                Err(e) => {
                    error!("error on devlink monitor socket: {e}");
                    return None;
                }
            };
            if n == 0 {
                return None;
            }
            for chunk in NetlinkChunks::new(&self.rx[..n]) {
                if let Some(event) = decode_event(chunk) {
                    self.pending.push_back(event);
                }
            }
        }
    }
}

/// Decode one netlink message into a port event, or `None` for anything
/// the monitor does not care about.
fn decode_event(chunk: &[u8]) -> Option<PortEvent> {
    let msg = match NetlinkMessage::<GenlMessage<Devlink>>::deserialize(chunk) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("could not parse devlink notification: {e}");
            return None;
        }
    };
    let NetlinkPayload::InnerMessage(genl) = msg.payload else {
        return None;
    };
    match genl.payload.cmd {
        DEVLINK_CMD_PORT_NEW => {
            let port = match DevlinkPort::from_attrs(&genl.payload.attrs) {
                Ok(port) => port,
                Err(e) => {
                    warn!("could not parse devlink port entry: {e}");
                    return None;
                }
            };
            if port.netdev_ifindex.is_none() {
                // When a port is removed the kernel first emits a NEW
                // notification without payload, followed by the DEL.
                debug!(
                    "ignoring devlink port notification without ifindex for {}/{} port {}",
                    port.bus_name, port.dev_name, port.index
                );
                return None;
            }
            Some(PortEvent::New(port))
        }
        DEVLINK_CMD_PORT_DEL => match DevlinkPort::from_attrs(&genl.payload.attrs) {
            Ok(port) => Some(PortEvent::Del(port)),
            Err(e) => {
                warn!("could not parse devlink port entry: {e}");
                None
            }
        },
        cmd => {
            trace!("ignoring devlink notification cmd={cmd}");
            None
        }
    }
}
