// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Monitor for kernel netdev `move` uevents.
//!
//! Devlink reports the netdev name a port had when the notification was
//! assembled, which for freshly created ports is the kernel's temporary
//! name; udev renames the netdev moments later.  The kernel broadcasts a
//! `move` uevent for every rename, carrying the ifindex and the new name.
//!
//! If this monitor cannot be brought up the provider still functions, it
//! merely keeps stale netdev names for renamed ports until a later
//! devlink update refreshes them.

use std::io;
use std::str;

use net::interface::{InterfaceIndex, InterfaceName};
use netlink_sys::{protocols::NETLINK_KOBJECT_UEVENT, Socket, SocketAddr};

#[allow(unused)]
use tracing::{debug, error, warn};

/// The netlink multicast group on which the kernel broadcasts uevents.
const UEVENT_GROUP_KERNEL: u32 = 1;

/// Uevent bursts during VF creation are large, and the table is only
/// resynchronised by a full dump on restart.
const UEVENT_RCVBUF: usize = 128 * 1024 * 1024;

const RECV_BUF_LEN: usize = 8 * 1024;

/// A netdev rename notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetdevMove {
    /// The ifindex of the renamed netdev.
    pub ifindex: InterfaceIndex,
    /// Its new name.
    pub name: InterfaceName,
}

/// A non-blocking subscription to kernel uevents, filtered down to
/// netdev `move` events.
#[derive(Debug)]
pub struct UeventMonitor {
    socket: Socket,
    rx: Vec<u8>,
}

impl UeventMonitor {
    /// Open the uevent socket and join the kernel multicast group.
    pub fn new() -> io::Result<Self> {
        let mut socket = Socket::new(NETLINK_KOBJECT_UEVENT)?;
        socket.bind(&SocketAddr::new(0, UEVENT_GROUP_KERNEL))?;
        socket.set_non_blocking(true)?;
        if let Err(e) = socket.set_rx_buf_sz(UEVENT_RCVBUF) {
            debug!("unable to set uevent receive buffer size: {e}");
        }
        Ok(UeventMonitor {
            socket,
            rx: Vec::with_capacity(RECV_BUF_LEN),
        })
    }

    /// Receive datagrams until a netdev `move` event shows up or the
    /// socket reports it would block.
    pub fn try_next(&mut self) -> Option<NetdevMove> {
        loop {
            self.rx.clear();
            let n = match self.socket.recv(&mut self.rx, 0) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    warn!("uevent socket overflowed: {e}");
                    continue;
                }
                Err(e) => {
                    error!("error on uevent socket: {e}");
                    return None;
                }
            };
            if let Some(event) = parse_move(&self.rx[..n]) {
                return Some(event);
            }
        }
    }
}

/// Decode one uevent datagram, returning the rename it describes, if
/// any.
///
/// Kernel uevents are laid out as `action@devpath` followed by
/// nul-separated `KEY=VALUE` properties.  Anything which is not a
/// well-formed netdev `move` event is ignored; this includes the
/// `libudev`-tagged datagrams udevd broadcasts on its own group.
fn parse_move(datagram: &[u8]) -> Option<NetdevMove> {
    let mut segments = datagram.split(|byte| *byte == 0);
    let header = segments.next()?;
    if !header.contains(&b'@') {
        return None;
    }

    let mut action = None;
    let mut subsystem = None;
    let mut ifindex = None;
    let mut interface = None;
    for segment in segments {
        let Ok(segment) = str::from_utf8(segment) else {
            continue;
        };
        match segment.split_once('=') {
            Some(("ACTION", value)) => action = Some(value),
            Some(("SUBSYSTEM", value)) => subsystem = Some(value),
            Some(("IFINDEX", value)) => ifindex = Some(value),
            Some(("INTERFACE", value)) => interface = Some(value),
            _ => {}
        }
    }

    if action != Some("move") || subsystem != Some("net") {
        return None;
    }
    let ifindex_str = ifindex?;
    let name = interface?;
    let Ok(raw) = ifindex_str.parse::<u32>() else {
        debug!("uevent provided malformed ifindex: '{ifindex_str}'");
        return None;
    };
    let Ok(ifindex) = InterfaceIndex::try_new(raw) else {
        debug!("uevent provided zero ifindex");
        return None;
    };
    let Ok(name) = InterfaceName::try_from(name) else {
        debug!("uevent provided illegal netdev name: '{name}'");
        return None;
    };
    Some(NetdevMove { ifindex, name })
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]

    use super::{parse_move, NetdevMove};
    use net::interface::{InterfaceIndex, InterfaceName};

    fn datagram(parts: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        for part in parts {
            buf.extend_from_slice(part.as_bytes());
            buf.push(0);
        }
        buf
    }

    #[test]
    fn parses_move_event() {
        let buf = datagram(&[
            "move@/devices/virtual/net/pf0vf0",
            "ACTION=move",
            "DEVPATH=/devices/virtual/net/pf0vf0",
            "SUBSYSTEM=net",
            "INTERFACE=pf0vf0",
            "IFINDEX=1000",
            "SEQNUM=4711",
        ]);
        assert_eq!(
            parse_move(&buf),
            Some(NetdevMove {
                ifindex: InterfaceIndex::try_new(1000).unwrap(),
                name: InterfaceName::try_from("pf0vf0").unwrap(),
            })
        );
    }

    #[test]
    fn ignores_other_actions() {
        let buf = datagram(&[
            "add@/devices/virtual/net/pf0vf0",
            "ACTION=add",
            "SUBSYSTEM=net",
            "INTERFACE=pf0vf0",
            "IFINDEX=1000",
        ]);
        assert_eq!(parse_move(&buf), None);
    }

    #[test]
    fn ignores_foreign_subsystems() {
        let buf = datagram(&[
            "move@/devices/pci0000:00/0000:03:00.0",
            "ACTION=move",
            "SUBSYSTEM=pci",
            "IFINDEX=1000",
            "INTERFACE=pf0vf0",
        ]);
        assert_eq!(parse_move(&buf), None);
    }

    #[test]
    fn ignores_malformed_ifindex() {
        let buf = datagram(&[
            "move@/devices/virtual/net/pf0vf0",
            "ACTION=move",
            "SUBSYSTEM=net",
            "INTERFACE=pf0vf0",
            "IFINDEX=12a3",
        ]);
        assert_eq!(parse_move(&buf), None);
    }

    #[test]
    fn ignores_udevd_datagrams() {
        let mut buf = b"libudev".to_vec();
        buf.push(0);
        buf.extend_from_slice(&datagram(&["ACTION=move", "SUBSYSTEM=net"]));
        assert_eq!(parse_move(&buf), None);
    }

    #[test]
    fn requires_ifindex_and_interface() {
        let buf = datagram(&[
            "move@/devices/virtual/net/pf0vf0",
            "ACTION=move",
            "SUBSYSTEM=net",
        ]);
        assert_eq!(parse_move(&buf), None);
    }
}
