// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Client for the Linux `devlink` generic-netlink family.
//!
//! The kernel's devlink-port interface is the vendor-neutral way for a
//! program running on a smart-NIC SoC to discover host-visible resources
//! such as the representor netdev and the host facing MAC address of each
//! PCI function.  This crate resolves the dynamically numbered `devlink`
//! family, performs bulk port and device-info dumps, and subscribes to the
//! `config` multicast group over which port add/remove notifications are
//! broadcast.
//!
//! Presence of each attribute in a devlink message depends on the kernel
//! version and on the driver filling in the information, so the typed
//! records in this crate surface optional attributes as `Option` rather
//! than the max-value wire sentinel.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used)]
#![allow(
    clippy::match_same_arms,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

mod client;
mod family;
mod info;
mod message;
mod monitor;
mod port;

pub use client::DevlinkClient;
pub use info::{DevlinkInfo, InfoVersion};
pub use monitor::{DevlinkMonitor, PortEvent};
pub use port::{DevlinkPort, PortFlavour, PortType};

use netlink_packet_utils::DecodeError;
use std::io;

/// The name under which the devlink family registers with generic netlink.
pub const DEVLINK_FAMILY_NAME: &str = "devlink";
/// The devlink multicast group carrying configuration change notifications.
pub const DEVLINK_MCGRP_CONFIG: &str = "config";

/// Errors which may occur while talking to the devlink family.
#[derive(Debug, thiserror::Error)]
pub enum DevlinkError {
    /// The running kernel does not register the `devlink` family.
    #[error("generic netlink family 'devlink' does not exist, Linux 4.6 or newer required")]
    FamilyNotFound,
    /// The family exists but lacks the requested multicast group.
    #[error("devlink multicast group '{0}' does not exist")]
    McastGroupNotFound(String),
    /// A reply in a dump stream could not be decoded.
    #[error("devlink message could not be decoded")]
    Proto(#[source] DecodeError),
    /// The kernel answered with a netlink-level error, or socket I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
