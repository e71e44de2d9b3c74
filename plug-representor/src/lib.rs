// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Representor plug provider.
//!
//! In a smart-NIC deployment the network interfaces of guests on the host
//! are realised as PCI virtual functions.  On the SoC side each of those
//! host-visible functions has a corresponding *representor* netdev through
//! which the software switch steers the function's traffic.  Given a
//! logical port described by host PF MAC address and VF number, this crate
//! answers which local representor netdev to attach to the switch bridge,
//! and keeps that answer correct while the kernel hot-adds, renames, and
//! removes ports.
//!
//! The provider is driven cooperatively from the switch controller's main
//! loop: all state lives in one [`RepresentorPlug`] value, and
//! [`RepresentorPlug::run`] drains the devlink and uevent sockets without
//! ever blocking the caller.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

mod compat;
mod provider;
mod table;
mod uevent;

pub use compat::{CompatError, HostPfMacSource, SysfsPfMac};
pub use provider::{PlugOp, PrepareOutcome, RepresentorPlug, OPT_PF_MAC, OPT_VF_NUM};
pub use table::{PfRef, PortRecord, PortSource, PortTable};
pub use uevent::{NetdevMove, UeventMonitor};

use std::collections::HashMap;

/// Errors which may occur while bringing up the plug provider.
#[derive(Debug, thiserror::Error)]
pub enum PlugError {
    /// The devlink family or its config multicast group is unavailable.
    #[error(transparent)]
    Devlink(#[from] devlink::DevlinkError),
}

/// The contract between a plug provider and the switch controller.
///
/// The controller holds one provider per plug type, calls [`run`] once per
/// main-loop iteration, and consults [`prepare`] for every logical port
/// that names this provider.
///
/// [`run`]: PlugProvider::run
/// [`prepare`]: PlugProvider::prepare
pub trait PlugProvider {
    /// The plug type this provider registers under.
    const TYPE: &'static str;

    /// Drain pending updates.  Returns whether any lookup table changed,
    /// so callers can skip redundant reconciliation work.
    fn run(&mut self) -> bool;

    /// Resolve the representor netdev for one logical port.
    fn prepare(
        &mut self,
        op: PlugOp,
        lport_name: &str,
        options: &HashMap<String, String>,
    ) -> PrepareOutcome;
}
