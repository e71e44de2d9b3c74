// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The plug-provider facade consumed by the switch controller.

use std::collections::HashMap;

use devlink::{DevlinkClient, DevlinkMonitor, DevlinkPort, PortEvent, PortFlavour};
use net::eth::mac::Mac;

use crate::compat::{HostPfMacSource, SysfsPfMac};
use crate::table::{PortSource, PortTable};
use crate::uevent::UeventMonitor;
use crate::{PlugError, PlugProvider};

#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Logical-port option naming the host PF MAC, `xx:xx:xx:xx:xx:xx`.
pub const OPT_PF_MAC: &str = "vif-plug:representor:pf-mac";
/// Logical-port option naming the VF number, base 10.
pub const OPT_VF_NUM: &str = "vif-plug:representor:vf-num";

/// What the controller is about to do with the logical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugOp {
    /// The port is being created or updated.
    Add,
    /// The port is being removed.
    Remove,
}

/// The provider's answer for one logical port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Plug this netdev into the bridge.  The name is an owned copy; the
    /// record it came from may change on the next drain.
    Plug {
        /// Name of the representor netdev.
        name: String,
    },
    /// No representor answers to the given options; the caller retries
    /// on its next reconciliation pass.
    NotFound,
    /// Nothing for the provider to do (removals are handled by the
    /// caller).
    Skip,
}

/// The representor plug provider.
///
/// One value of this type owns all provider state: the port table, the
/// devlink monitor socket, and the uevent monitor socket.  Dropping it
/// closes both sockets and discards the table.
#[derive(Debug)]
pub struct RepresentorPlug {
    monitor: DevlinkMonitor,
    uevent: Option<UeventMonitor>,
    table: PortTable,
    compat: SysfsPfMac,
}

impl RepresentorPlug {
    /// Bring the provider up: subscribe to devlink port notifications,
    /// populate the table with one bulk dump, and start the uevent
    /// monitor.
    ///
    /// The subscription is opened before the dump so that no port event
    /// can fall between them.  Failure of either devlink step is fatal
    /// for the provider; a failed uevent monitor only degrades rename
    /// tracking.
    pub fn init() -> Result<Self, PlugError> {
        let monitor = DevlinkMonitor::new()?;
        let client = DevlinkClient::new()?;
        let compat = SysfsPfMac::default();

        let mut table = PortTable::new();
        for port in client.dump_ports()? {
            apply_port_new(&mut table, &port, PortSource::Dump, &compat);
        }
        info!("representor port table populated with {} ports", table.len());

        let uevent = match UeventMonitor::new() {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                warn!("unable to monitor netdev renames, names may go stale: {e}");
                None
            }
        };

        Ok(RepresentorPlug {
            monitor,
            uevent,
            table,
            compat,
        })
    }

    /// Drain pending devlink and uevent messages.  Never blocks; returns
    /// whether the table changed.
    pub fn run(&mut self) -> bool {
        let mut changed = false;
        while let Some(event) = self.monitor.try_next() {
            changed |= match event {
                PortEvent::New(port) => {
                    apply_port_new(&mut self.table, &port, PortSource::Runtime, &self.compat)
                }
                PortEvent::Del(port) => apply_port_del(&mut self.table, &port),
            };
        }
        if let Some(uevent) = self.uevent.as_mut() {
            while let Some(event) = uevent.try_next() {
                changed |= self
                    .table
                    .rename(event.ifindex, event.name.as_ref());
            }
        }
        changed
    }

    /// Resolve the representor netdev for one logical port.
    ///
    /// Pending updates are drained first so the lookup sees the freshest
    /// state.
    pub fn prepare(
        &mut self,
        op: PlugOp,
        lport_name: &str,
        options: &HashMap<String, String>,
    ) -> PrepareOutcome {
        if op == PlugOp::Remove {
            return PrepareOutcome::Skip;
        }
        if !options.contains_key(OPT_PF_MAC) || !options.contains_key(OPT_VF_NUM) {
            return PrepareOutcome::NotFound;
        }
        self.run();
        prepare_in_table(&self.table, lport_name, options)
    }

    /// The port table, for diagnostics.
    #[must_use]
    pub fn table(&self) -> &PortTable {
        &self.table
    }
}

impl PlugProvider for RepresentorPlug {
    const TYPE: &'static str = "representor";

    fn run(&mut self) -> bool {
        RepresentorPlug::run(self)
    }

    fn prepare(
        &mut self,
        op: PlugOp,
        lport_name: &str,
        options: &HashMap<String, String>,
    ) -> PrepareOutcome {
        RepresentorPlug::prepare(self, op, lport_name, options)
    }
}

/// Look up the representor for the PF MAC and VF number named in the
/// logical port's options.
fn prepare_in_table(
    table: &PortTable,
    lport_name: &str,
    options: &HashMap<String, String>,
) -> PrepareOutcome {
    let (Some(opt_pf_mac), Some(opt_vf_num)) = (options.get(OPT_PF_MAC), options.get(OPT_VF_NUM))
    else {
        return PrepareOutcome::NotFound;
    };
    let Ok(pf_mac) = opt_pf_mac.parse::<Mac>() else {
        warn!(
            "unable to parse option as Ethernet address for lport: {lport_name} \
             pf-mac: '{opt_pf_mac}' vf-num: '{opt_vf_num}'"
        );
        return PrepareOutcome::NotFound;
    };
    let Ok(vf_num) = opt_vf_num.parse::<u16>() else {
        warn!(
            "unable to parse option as VF number for lport: {lport_name} \
             pf-mac: '{opt_pf_mac}' vf-num: '{opt_vf_num}'"
        );
        return PrepareOutcome::NotFound;
    };
    match table.lookup_pf_mac_vf(pf_mac, vf_num) {
        Some(record) => {
            if record.rename_expected() {
                debug!(
                    "representor for lport {lport_name} still awaits its rename, \
                     current netdev_name: {}",
                    record.netdev_name
                );
            }
            PrepareOutcome::Plug {
                name: record.netdev_name.clone(),
            }
        }
        None => {
            info!("no representor port found for lport: {lport_name}");
            PrepareOutcome::NotFound
        }
    }
}

/// Fold one devlink port into the table.
///
/// A `PciPf` port arriving with a zero function MAC has the MAC
/// recovered through the sysfs interface, relative to the netdev name of
/// the `Physical` port on the same bus/dev.  Devlink itself does not
/// associate the two ports, but they are observed to correlate on the
/// devices where the fallback is needed, with the PF number matching the
/// physical port number.  If recovery fails the update is dropped: a PF
/// without MAC cannot anchor VF lookups, and a later message may supply
/// the address.
pub(crate) fn apply_port_new(
    table: &mut PortTable,
    port: &DevlinkPort,
    source: PortSource,
    compat: &dyn HostPfMacSource,
) -> bool {
    let Some(flavour) = port.flavour else {
        debug!("dropping devlink port without flavour");
        return false;
    };
    if !matches!(
        flavour,
        PortFlavour::Physical | PortFlavour::PciPf | PortFlavour::PciVf
    ) {
        debug!(
            "dropping port '{}' of unsupported flavour {flavour}",
            port.netdev_name.as_deref().unwrap_or("")
        );
        return false;
    }
    let Some(netdev_ifindex) = port.netdev_ifindex else {
        debug!(
            "dropping devlink port {}/{} port {} without netdev ifindex",
            port.bus_name, port.dev_name, port.index
        );
        return false;
    };

    let mut mac = port.hw_addr.unwrap_or(Mac::ZERO);
    if flavour == PortFlavour::PciPf && mac.is_zero() {
        let Some(phy) = table.lookup_phy_bus_dev(
            &port.bus_name,
            &port.dev_name,
            PortFlavour::Physical,
            u32::from(port.pci_pf_number.unwrap_or(u16::MAX)),
        ) else {
            warn!("unable to find PHYSICAL representor for fallback lookup of host PF MAC address");
            return false;
        };
        match compat.host_pf_mac(&phy.netdev_name) {
            Ok(fallback) => mac = fallback,
            Err(e) => {
                warn!("fallback lookup of host PF MAC address failed: {e}");
                return false;
            }
        }
    }

    table
        .update_entry(
            &port.bus_name,
            &port.dev_name,
            netdev_ifindex,
            port.netdev_name.as_deref().unwrap_or(""),
            port.number.unwrap_or(u32::MAX),
            port.pci_pf_number.unwrap_or(u16::MAX),
            port.pci_vf_number.unwrap_or(u16::MAX),
            flavour,
            mac,
            source,
        )
        .is_some()
}

/// Remove one devlink port from the table.
pub(crate) fn apply_port_del(table: &mut PortTable, port: &DevlinkPort) -> bool {
    let Some(flavour) = port.flavour else {
        debug!("dropping devlink port delete without flavour");
        return false;
    };
    if !matches!(
        flavour,
        PortFlavour::Physical | PortFlavour::PciPf | PortFlavour::PciVf
    ) {
        return false;
    }
    table.delete_entry(
        &port.bus_name,
        &port.dev_name,
        port.number.unwrap_or(u32::MAX),
        port.pci_pf_number.unwrap_or(u16::MAX),
        port.pci_vf_number.unwrap_or(u16::MAX),
        flavour,
    )
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]

    use super::{apply_port_del, apply_port_new, prepare_in_table, OPT_PF_MAC, OPT_VF_NUM};
    use crate::compat::{CompatError, HostPfMacSource};
    use crate::table::{PortSource, PortTable};
    use crate::PrepareOutcome;
    use devlink::{DevlinkPort, PortFlavour, PortType};
    use net::eth::mac::Mac;
    use net::interface::InterfaceIndex;
    use std::collections::HashMap;

    fn ifx(raw: u32) -> InterfaceIndex {
        InterfaceIndex::try_new(raw).unwrap()
    }

    fn mac(s: &str) -> Mac {
        s.parse().unwrap()
    }

    /// The compat interface of the device under test: physical port `p0`
    /// with a fixed host PF MAC.
    struct FakeCompat;

    impl HostPfMacSource for FakeCompat {
        fn host_pf_mac(&self, netdev_name: &str) -> Result<Mac, CompatError> {
            assert_eq!(netdev_name, "p0");
            Ok(mac("00:53:00:00:00:51"))
        }
    }

    /// A compat interface which never answers.
    struct NoCompat;

    impl HostPfMacSource for NoCompat {
        fn host_pf_mac(&self, _netdev_name: &str) -> Result<Mac, CompatError> {
            Err(CompatError::NotFound {
                path: "/nonexistent".into(),
            })
        }
    }

    fn devlink_port(
        flavour: PortFlavour,
        ifindex: u32,
        name: &str,
        pf_num: Option<u16>,
        vf_num: Option<u16>,
        hw_addr: Option<Mac>,
    ) -> DevlinkPort {
        DevlinkPort {
            bus_name: "pci".to_string(),
            dev_name: "0000:03:00.0".to_string(),
            index: 1,
            port_type: Some(PortType::Eth),
            flavour: Some(flavour),
            number: if flavour == PortFlavour::Physical {
                Some(0)
            } else {
                None
            },
            pci_pf_number: pf_num,
            pci_vf_number: vf_num,
            pci_sf_number: None,
            netdev_ifindex: InterfaceIndex::try_new(ifindex).ok(),
            netdev_name: Some(name.to_string()),
            ibdev_name: None,
            hw_addr,
            fn_state: None,
            fn_opstate: None,
        }
    }

    fn init_store() -> PortTable {
        let mut table = PortTable::new();
        table.update_entry(
            "pci",
            "0000:03:00.0",
            ifx(10),
            "p0",
            0,
            u16::MAX,
            u16::MAX,
            PortFlavour::Physical,
            mac("00:53:00:00:00:00"),
            PortSource::Dump,
        );
        table.update_entry(
            "pci",
            "0000:03:00.0",
            ifx(100),
            "p0hpf",
            u32::MAX,
            0,
            u16::MAX,
            PortFlavour::PciPf,
            mac("00:53:00:00:00:42"),
            PortSource::Dump,
        );
        table
    }

    #[test]
    fn devlink_vf_update_is_applied() {
        let mut table = init_store();
        let port = devlink_port(
            PortFlavour::PciVf,
            1000,
            "pf0vf0",
            Some(0),
            Some(0),
            None,
        );
        assert!(apply_port_new(&mut table, &port, PortSource::Runtime, &NoCompat));

        let record = table.lookup_ifindex(ifx(1000)).unwrap();
        assert_eq!(record.source, PortSource::Runtime);
        assert_eq!(table.pf_record(record).unwrap().mac, mac("00:53:00:00:00:42"));
        assert_eq!(
            table
                .lookup_pf_mac_vf(mac("00:53:00:00:00:42"), 0)
                .unwrap()
                .netdev_ifindex,
            ifx(1000)
        );
    }

    #[test]
    fn devlink_port_delete_is_applied() {
        let mut table = init_store();
        let port = devlink_port(
            PortFlavour::PciVf,
            1000,
            "pf0vf0",
            Some(0),
            Some(0),
            None,
        );
        apply_port_new(&mut table, &port, PortSource::Dump, &NoCompat);
        assert!(table.lookup_ifindex(ifx(1000)).is_some());

        assert!(apply_port_del(&mut table, &port));
        assert!(table.lookup_ifindex(ifx(1000)).is_none());
    }

    #[test]
    fn pf_with_zero_mac_uses_compat_interface() {
        let mut table = PortTable::new();
        table.update_entry(
            "pci",
            "0000:03:00.0",
            ifx(10),
            "p0",
            0,
            u16::MAX,
            u16::MAX,
            PortFlavour::Physical,
            Mac::ZERO,
            PortSource::Dump,
        );

        let port = devlink_port(
            PortFlavour::PciPf,
            100,
            "pf0hpf",
            Some(0),
            None,
            Some(Mac::ZERO),
        );
        assert!(apply_port_new(&mut table, &port, PortSource::Dump, &FakeCompat));

        let record = table
            .lookup_phy_bus_dev("pci", "0000:03:00.0", PortFlavour::PciPf, 0)
            .unwrap();
        assert_eq!(record.mac, mac("00:53:00:00:00:51"));
        // The physical port's own MAC is not touched by the fallback.
        assert_eq!(
            table
                .lookup_phy_bus_dev("pci", "0000:03:00.0", PortFlavour::Physical, 0)
                .unwrap()
                .mac,
            Mac::ZERO
        );
    }

    #[test]
    fn pf_with_zero_mac_and_no_compat_is_dropped() {
        let mut table = PortTable::new();
        table.update_entry(
            "pci",
            "0000:03:00.0",
            ifx(10),
            "p0",
            0,
            u16::MAX,
            u16::MAX,
            PortFlavour::Physical,
            Mac::ZERO,
            PortSource::Dump,
        );
        let port = devlink_port(
            PortFlavour::PciPf,
            100,
            "pf0hpf",
            Some(0),
            None,
            Some(Mac::ZERO),
        );
        assert!(!apply_port_new(&mut table, &port, PortSource::Dump, &NoCompat));
        assert!(table
            .lookup_phy_bus_dev("pci", "0000:03:00.0", PortFlavour::PciPf, 0)
            .is_none());
    }

    #[test]
    fn pf_with_zero_mac_and_no_physical_peer_is_dropped() {
        let mut table = PortTable::new();
        let port = devlink_port(
            PortFlavour::PciPf,
            100,
            "pf0hpf",
            Some(0),
            None,
            Some(Mac::ZERO),
        );
        assert!(!apply_port_new(&mut table, &port, PortSource::Dump, &FakeCompat));
        assert!(table.is_empty());
    }

    #[test]
    fn unsupported_flavours_are_dropped() {
        let mut table = init_store();
        let mut port = devlink_port(PortFlavour::PciSf, 2000, "pf0sf0", Some(0), None, None);
        port.pci_sf_number = Some(0);
        assert!(!apply_port_new(&mut table, &port, PortSource::Runtime, &NoCompat));
        assert!(table.lookup_ifindex(ifx(2000)).is_none());
    }

    fn options(pf_mac: &str, vf_num: &str) -> HashMap<String, String> {
        HashMap::from([
            (OPT_PF_MAC.to_string(), pf_mac.to_string()),
            (OPT_VF_NUM.to_string(), vf_num.to_string()),
        ])
    }

    #[test]
    fn prepare_resolves_representor() {
        let mut table = init_store();
        let port = devlink_port(
            PortFlavour::PciVf,
            1000,
            "pf0vf0",
            Some(0),
            Some(0),
            None,
        );
        apply_port_new(&mut table, &port, PortSource::Dump, &NoCompat);

        assert_eq!(
            prepare_in_table(&table, "foo1", &options("00:53:00:00:00:42", "0")),
            PrepareOutcome::Plug {
                name: "pf0vf0".to_string()
            }
        );
        assert_eq!(
            prepare_in_table(&table, "foo1", &options("00:53:00:00:00:42", "1")),
            PrepareOutcome::NotFound
        );
    }

    #[test]
    fn prepare_rejects_malformed_options() {
        let table = init_store();
        assert_eq!(
            prepare_in_table(&table, "foo1", &options("not-a-mac", "0")),
            PrepareOutcome::NotFound
        );
        assert_eq!(
            prepare_in_table(&table, "foo1", &options("00:53:00:00:00:42", "banana")),
            PrepareOutcome::NotFound
        );
        assert_eq!(
            prepare_in_table(&table, "foo1", &options("00:53:00:00:00:42", "65536")),
            PrepareOutcome::NotFound
        );
        assert_eq!(
            prepare_in_table(&table, "foo1", &options("00:53:00:00:00:42", "-1")),
            PrepareOutcome::NotFound
        );
    }

    #[test]
    fn prepare_requires_both_options() {
        let table = init_store();
        let mut opts = HashMap::new();
        assert_eq!(
            prepare_in_table(&table, "foo1", &opts),
            PrepareOutcome::NotFound
        );
        opts.insert(OPT_PF_MAC.to_string(), "00:53:00:00:00:42".to_string());
        assert_eq!(
            prepare_in_table(&table, "foo1", &opts),
            PrepareOutcome::NotFound
        );
    }
}
