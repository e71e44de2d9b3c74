// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The port table.
//!
//! One record set, three indices:
//!
//! * by netdev ifindex, the primary identity of a record across renames;
//! * by bus/dev name for `Physical` and `PciPf` ports;
//! * by PF MAC address and VF number for `PciVf` ports.
//!
//! There is a small number of `Physical` and `PciPf` ports per device, and
//! every VF update refers back to them to maintain the PF MAC + VF number
//! index.  Note that devlink itself does not associate `Physical` and
//! `PciPf` ports; the association through the shared bus/dev name is a
//! property of the devices this provider targets (see the sysfs
//! compatibility reader).

use ahash::RandomState;
use std::collections::HashMap;

use devlink::PortFlavour;
use net::eth::mac::Mac;
use net::interface::InterfaceIndex;

#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Where a record was learned from.  Records learned from a live
/// notification are expected to be renamed by udev shortly after they
/// appear; records from the initial dump already carry their final name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    /// Learned from the initial bulk dump.
    Dump,
    /// Learned from a runtime notification.
    Runtime,
}

/// Identity of the PF record a VF is rooted at.
///
/// This is a lookup relation, not ownership: the PF is re-resolved
/// through the bus/dev index on every use so that a VF outliving its PF
/// turns into a lookup miss rather than a dangling reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfRef {
    bus_name: String,
    dev_name: String,
    pf_number: u32,
}

/// One devlink port of a flavour the provider cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRecord {
    /// Kernel ifindex of the representor netdev.
    pub netdev_ifindex: InterfaceIndex,
    /// Current name of the representor netdev.
    pub netdev_name: String,
    /// Whether the netdev was renamed after the record was created.
    pub renamed: bool,
    /// Flavour of the port.
    pub flavour: PortFlavour,
    /// The flavour-specific number: physical port number, PF number, or
    /// VF number.
    pub number: u32,
    /// For `PciPf` the host-visible PF MAC.  Stored but unused by lookup
    /// for the other flavours.
    pub mac: Mac,
    /// For `PciVf` the identity of the owning PF.
    pub pf: Option<PfRef>,
    /// Provenance of the record.
    pub source: PortSource,
}

impl PortRecord {
    /// True iff the record was learned from a live notification and has
    /// not yet seen its first rename, i.e. udev is still expected to move
    /// the netdev to its final name.  Diagnostic only.
    #[must_use]
    pub fn rename_expected(&self) -> bool {
        self.source == PortSource::Runtime && !self.renamed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BusDevKey {
    bus_name: String,
    dev_name: String,
    flavour: PortFlavour,
    number: u32,
}

impl BusDevKey {
    fn new(bus_name: &str, dev_name: &str, flavour: PortFlavour, number: u32) -> Self {
        BusDevKey {
            bus_name: bus_name.to_string(),
            dev_name: dev_name.to_string(),
            flavour,
            number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MacVfKey {
    mac: Mac,
    vf_number: u16,
}

/// The port table.
///
/// All three indices are updated together by the mutating operations, so
/// an external observer (the single-threaded controller loop) never sees
/// them disagree.  The MAC+VF index hashes the MAC bytes and the VF
/// number under a per-table random seed; correctness relies on the
/// byte-exact equality checks on retrieval, not on the hash.
#[derive(Debug, Clone, PartialEq)]
pub struct PortTable {
    by_ifindex: HashMap<InterfaceIndex, PortRecord, RandomState>,
    by_bus_dev: HashMap<BusDevKey, InterfaceIndex, RandomState>,
    by_mac_vf: HashMap<MacVfKey, InterfaceIndex, RandomState>,
}

impl Default for PortTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PortTable {
    /// Create an empty port table.
    #[must_use]
    pub fn new() -> Self {
        PortTable {
            by_ifindex: HashMap::with_hasher(RandomState::new()),
            by_bus_dev: HashMap::with_hasher(RandomState::new()),
            by_mac_vf: HashMap::with_hasher(RandomState::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ifindex.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_ifindex.is_empty()
    }

    /// Insert or update an entry.
    ///
    /// Integer arguments follow the devlink wire convention: a value the
    /// message did not carry is passed as the maximum of its width.
    /// `number` keys `Physical` ports, `pci_pf_number` keys `PciPf`
    /// ports, `pci_vf_number` keys `PciVf` ports.
    ///
    /// A `PciVf` update whose owning PF is unknown is rejected: without
    /// the PF there is no MAC to key the VF under.
    #[allow(clippy::too_many_arguments)]
    pub fn update_entry(
        &mut self,
        bus_name: &str,
        dev_name: &str,
        netdev_ifindex: InterfaceIndex,
        netdev_name: &str,
        number: u32,
        pci_pf_number: u16,
        pci_vf_number: u16,
        flavour: PortFlavour,
        mac: Mac,
        source: PortSource,
    ) -> Option<&PortRecord> {
        match flavour {
            PortFlavour::Physical | PortFlavour::PciPf => {
                let key_number = if flavour == PortFlavour::Physical {
                    number
                } else {
                    u32::from(pci_pf_number)
                };
                self.update_phy(
                    bus_name,
                    dev_name,
                    netdev_ifindex,
                    netdev_name,
                    key_number,
                    flavour,
                    mac,
                    source,
                )
            }
            PortFlavour::PciVf => self.update_function(
                bus_name,
                dev_name,
                netdev_ifindex,
                netdev_name,
                pci_pf_number,
                pci_vf_number,
                mac,
                source,
            ),
            other => {
                debug!("dropping port '{netdev_name}' of unsupported flavour {other}");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn update_phy(
        &mut self,
        bus_name: &str,
        dev_name: &str,
        netdev_ifindex: InterfaceIndex,
        netdev_name: &str,
        number: u32,
        flavour: PortFlavour,
        mac: Mac,
        source: PortSource,
    ) -> Option<&PortRecord> {
        let key = BusDevKey::new(bus_name, dev_name, flavour, number);
        if let Some(&ifindex) = self.by_bus_dev.get(&key) {
            let mut rekeyed = None;
            let record = self.by_ifindex.get_mut(&ifindex)?;
            if record.netdev_name != netdev_name {
                record.netdev_name = netdev_name.to_string();
                record.renamed = true;
            }
            if flavour == PortFlavour::PciPf && !mac.is_zero() && record.mac != mac {
                // The host PF MAC changed, e.g. the firmware re-provisioned
                // the function or an earlier update came from the sysfs
                // fallback.  VFs are keyed under the old MAC and move with
                // it.
                rekeyed = Some(record.mac);
                record.mac = mac;
            }
            if let Some(old_mac) = rekeyed {
                let pf = PfRef {
                    bus_name: bus_name.to_string(),
                    dev_name: dev_name.to_string(),
                    pf_number: number,
                };
                self.rekey_vfs(&pf, old_mac, mac);
            }
            self.by_ifindex.get(&ifindex)
        } else {
            self.evict_ifindex(netdev_ifindex);
            self.by_ifindex.insert(
                netdev_ifindex,
                PortRecord {
                    netdev_ifindex,
                    netdev_name: netdev_name.to_string(),
                    renamed: false,
                    flavour,
                    number,
                    mac,
                    pf: None,
                    source,
                },
            );
            self.by_bus_dev.insert(key, netdev_ifindex);
            self.by_ifindex.get(&netdev_ifindex)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn update_function(
        &mut self,
        bus_name: &str,
        dev_name: &str,
        netdev_ifindex: InterfaceIndex,
        netdev_name: &str,
        pci_pf_number: u16,
        pci_vf_number: u16,
        mac: Mac,
        source: PortSource,
    ) -> Option<&PortRecord> {
        let pf_key = BusDevKey::new(
            bus_name,
            dev_name,
            PortFlavour::PciPf,
            u32::from(pci_pf_number),
        );
        let Some(&pf_ifindex) = self.by_bus_dev.get(&pf_key) else {
            warn!(
                "attempt to add function before having knowledge about PF \
                 {bus_name}/{dev_name} pf {pci_pf_number}"
            );
            return None;
        };
        let pf_mac = self.by_ifindex.get(&pf_ifindex).map(|record| record.mac)?;
        let pf = PfRef {
            bus_name: bus_name.to_string(),
            dev_name: dev_name.to_string(),
            pf_number: u32::from(pci_pf_number),
        };

        // The kernel reuses ifindexes; whatever currently sits at this one
        // is only an update target if it is this very VF.
        let same_vf = self.by_ifindex.get(&netdev_ifindex).is_some_and(|record| {
            record.flavour == PortFlavour::PciVf
                && record.number == u32::from(pci_vf_number)
                && record.pf.as_ref() == Some(&pf)
        });
        if same_vf {
            let record = self.by_ifindex.get_mut(&netdev_ifindex)?;
            if record.netdev_name != netdev_name {
                record.netdev_name = netdev_name.to_string();
                record.renamed = true;
            }
        } else {
            self.evict_ifindex(netdev_ifindex);
            if !self.by_bus_dev.contains_key(&pf_key) {
                // The stale occupant was the owning PF itself; with it gone
                // there is no MAC left to key the VF under.
                warn!(
                    "stale PF record occupied ifindex {netdev_ifindex}, dropping function \
                     update for {bus_name}/{dev_name} pf {pci_pf_number}"
                );
                return None;
            }
            self.by_ifindex.insert(
                netdev_ifindex,
                PortRecord {
                    netdev_ifindex,
                    netdev_name: netdev_name.to_string(),
                    renamed: false,
                    flavour: PortFlavour::PciVf,
                    number: u32::from(pci_vf_number),
                    mac,
                    pf: Some(pf),
                    source,
                },
            );
            self.insert_mac_vf(
                MacVfKey {
                    mac: pf_mac,
                    vf_number: pci_vf_number,
                },
                netdev_ifindex,
            );
        }
        self.by_ifindex.get(&netdev_ifindex)
    }

    /// Remove an entry.  Removal of an unknown entry is a logged no-op.
    ///
    /// Removing a `PciPf` record also drops the VF records rooted at it:
    /// the kernel normally deletes VFs before their PF, but nothing
    /// guarantees the order, and a VF without its PF can no longer be
    /// found by any caller anyway.
    pub fn delete_entry(
        &mut self,
        bus_name: &str,
        dev_name: &str,
        number: u32,
        pci_pf_number: u16,
        pci_vf_number: u16,
        flavour: PortFlavour,
    ) -> bool {
        match flavour {
            PortFlavour::Physical | PortFlavour::PciPf => {
                let key_number = if flavour == PortFlavour::Physical {
                    number
                } else {
                    u32::from(pci_pf_number)
                };
                self.delete_phy(bus_name, dev_name, key_number, flavour)
            }
            PortFlavour::PciVf => {
                self.delete_function(bus_name, dev_name, pci_pf_number, pci_vf_number)
            }
            other => {
                debug!("dropping delete for port of unsupported flavour {other}");
                false
            }
        }
    }

    fn delete_phy(
        &mut self,
        bus_name: &str,
        dev_name: &str,
        number: u32,
        flavour: PortFlavour,
    ) -> bool {
        let key = BusDevKey::new(bus_name, dev_name, flavour, number);
        let Some(ifindex) = self.by_bus_dev.remove(&key) else {
            warn!("attempt to remove non-existing device {bus_name}/{dev_name} {number}");
            return false;
        };
        self.by_ifindex.remove(&ifindex);
        if flavour == PortFlavour::PciPf {
            self.drop_vfs_of(&PfRef {
                bus_name: bus_name.to_string(),
                dev_name: dev_name.to_string(),
                pf_number: number,
            });
        }
        true
    }

    fn delete_function(
        &mut self,
        bus_name: &str,
        dev_name: &str,
        pci_pf_number: u16,
        pci_vf_number: u16,
    ) -> bool {
        let pf_key = BusDevKey::new(
            bus_name,
            dev_name,
            PortFlavour::PciPf,
            u32::from(pci_pf_number),
        );
        let Some(&pf_ifindex) = self.by_bus_dev.get(&pf_key) else {
            warn!(
                "attempt to remove function with non-existing PF bus_dev \
                 {bus_name}/{dev_name} pci_pf_number {pci_pf_number}"
            );
            return false;
        };
        let Some(pf_mac) = self.by_ifindex.get(&pf_ifindex).map(|record| record.mac) else {
            return false;
        };
        let key = MacVfKey {
            mac: pf_mac,
            vf_number: pci_vf_number,
        };
        let Some(ifindex) = self.by_mac_vf.remove(&key) else {
            warn!("attempt to remove non-existing function {bus_name}/{dev_name}-{pci_vf_number}");
            return false;
        };
        self.by_ifindex.remove(&ifindex);
        true
    }

    /// Look up a record by the ifindex of its netdev.
    #[must_use]
    pub fn lookup_ifindex(&self, ifindex: InterfaceIndex) -> Option<&PortRecord> {
        self.by_ifindex.get(&ifindex)
    }

    /// Look up a VF record by its PF's MAC address and the VF number.
    ///
    /// The reference from the VF to its PF is revalidated here: the PF
    /// must still be present and its MAC must compare byte-equal.
    #[must_use]
    pub fn lookup_pf_mac_vf(&self, mac: Mac, vf_number: u16) -> Option<&PortRecord> {
        let ifindex = *self.by_mac_vf.get(&MacVfKey { mac, vf_number })?;
        let record = self.by_ifindex.get(&ifindex)?;
        if record.number != u32::from(vf_number) {
            return None;
        }
        let pf_record = self.pf_record(record)?;
        (pf_record.mac == mac).then_some(record)
    }

    /// Look up a `Physical` or `PciPf` record by bus/dev name, flavour,
    /// and flavour-specific number.
    #[must_use]
    pub fn lookup_phy_bus_dev(
        &self,
        bus_name: &str,
        dev_name: &str,
        flavour: PortFlavour,
        number: u32,
    ) -> Option<&PortRecord> {
        let key = BusDevKey::new(bus_name, dev_name, flavour, number);
        let ifindex = *self.by_bus_dev.get(&key)?;
        self.by_ifindex.get(&ifindex)
    }

    /// Resolve the PF record a VF record is rooted at.
    #[must_use]
    pub fn pf_record(&self, record: &PortRecord) -> Option<&PortRecord> {
        let pf = record.pf.as_ref()?;
        let key = BusDevKey::new(
            &pf.bus_name,
            &pf.dev_name,
            PortFlavour::PciPf,
            pf.pf_number,
        );
        let pf_ifindex = *self.by_bus_dev.get(&key)?;
        self.by_ifindex.get(&pf_ifindex)
    }

    /// Apply a netdev rename for `ifindex`.  Returns whether a record
    /// changed.
    pub fn rename(&mut self, ifindex: InterfaceIndex, netdev_name: &str) -> bool {
        let Some(record) = self.by_ifindex.get_mut(&ifindex) else {
            debug!("move event on port we do not know about ifindex={ifindex}");
            return false;
        };
        if record.netdev_name == netdev_name {
            return false;
        }
        record.netdev_name = netdev_name.to_string();
        record.renamed = true;
        true
    }

    /// Insert a MAC+VF index entry, displacing any record which already
    /// held the key.  On a PF-MAC collision the most recent update wins.
    fn insert_mac_vf(&mut self, key: MacVfKey, ifindex: InterfaceIndex) {
        if let Some(old_ifindex) = self.by_mac_vf.insert(key, ifindex) {
            if old_ifindex != ifindex {
                debug!(
                    "VF number {} under PF MAC {} displaces the record at ifindex {old_ifindex}",
                    key.vf_number, key.mac
                );
                self.by_ifindex.remove(&old_ifindex);
            }
        }
    }

    /// Drop any record which still occupies `ifindex`, along with its
    /// index entries.  The kernel can reuse an ifindex only after the old
    /// netdev is gone, so whatever we stored under it is stale.
    fn evict_ifindex(&mut self, ifindex: InterfaceIndex) {
        if let Some(old) = self.by_ifindex.remove(&ifindex) {
            debug!(
                "replacing stale record '{}' at ifindex {ifindex}",
                old.netdev_name
            );
            if old.flavour == PortFlavour::PciPf {
                let identity = self
                    .by_bus_dev
                    .iter()
                    .find(|(_, v)| **v == ifindex)
                    .map(|(key, _)| PfRef {
                        bus_name: key.bus_name.clone(),
                        dev_name: key.dev_name.clone(),
                        pf_number: key.number,
                    });
                if let Some(pf) = identity {
                    self.drop_vfs_of(&pf);
                }
            }
            self.by_bus_dev.retain(|_, v| *v != ifindex);
            self.by_mac_vf.retain(|_, v| *v != ifindex);
        }
    }

    /// Move the MAC+VF index entries of every VF rooted at `pf` from
    /// `old_mac` to `new_mac`.
    fn rekey_vfs(&mut self, pf: &PfRef, old_mac: Mac, new_mac: Mac) {
        let moved: Vec<(MacVfKey, InterfaceIndex)> = self
            .by_mac_vf
            .iter()
            .filter(|(key, ifindex)| {
                key.mac == old_mac
                    && self
                        .by_ifindex
                        .get(ifindex)
                        .is_some_and(|record| record.pf.as_ref() == Some(pf))
            })
            .map(|(key, ifindex)| (*key, *ifindex))
            .collect();
        for (key, ifindex) in moved {
            self.by_mac_vf.remove(&key);
            self.insert_mac_vf(
                MacVfKey {
                    mac: new_mac,
                    vf_number: key.vf_number,
                },
                ifindex,
            );
        }
    }

    /// Drop every VF record rooted at `pf`.
    fn drop_vfs_of(&mut self, pf: &PfRef) {
        let orphans: Vec<InterfaceIndex> = self
            .by_ifindex
            .iter()
            .filter(|(_, record)| record.pf.as_ref() == Some(pf))
            .map(|(ifindex, _)| *ifindex)
            .collect();
        for ifindex in orphans {
            debug!("dropping VF record at ifindex {ifindex} after removal of its PF");
            self.by_ifindex.remove(&ifindex);
            self.by_mac_vf.retain(|_, v| *v != ifindex);
        }
    }
}
