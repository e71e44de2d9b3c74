// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Recovery of the host-visible PF MAC address through sysfs.
//!
//! The kernel devlink-port interface provides a vendor neutral and
//! standard way of discovering host visible resources such as the MAC
//! address of interfaces from a program running on the NIC SoC side.
//! A fairly recent kernel is required for it to work though, so until
//! that is widely available this reader retrieves the same information
//! from the interim sysfs interface, which lives relative to a PHYSICAL
//! port's netdev name.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use net::eth::mac::{Mac, MacParseError};
use net::interface::{IllegalInterfaceName, InterfaceName};

#[allow(unused)]
use tracing::{debug, warn};

/// A source of host PF MAC addresses, keyed by the netdev name of the
/// physical port on the same device.
pub trait HostPfMacSource {
    /// Look up the host-visible PF MAC for physical port `netdev_name`.
    fn host_pf_mac(&self, netdev_name: &str) -> Result<Mac, CompatError>;
}

/// Errors from the sysfs PF-MAC reader.  All of them are definite: the
/// caller proceeds without the fallback rather than retrying.
#[derive(Debug, thiserror::Error)]
pub enum CompatError {
    /// The netdev name cannot be spliced into a sysfs path.
    #[error(transparent)]
    BadName(#[from] IllegalInterfaceName),
    /// The config file could not be opened or read.
    #[error("{}: {source}", .path.display())]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
    /// The config file has no `MAC` line.
    #[error("no MAC entry in {}", .path.display())]
    NotFound {
        /// Path of the config file.
        path: PathBuf,
    },
    /// The `MAC` line does not carry a parseable address.
    #[error("malformed MAC value in {}: {source}", .path.display())]
    Malformed {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying parse error.
        source: MacParseError,
    },
}

/// Reads `<root>/<netdev>/smart_nic/pf/config` and extracts the line
/// whose key begins with `MAC`.
#[derive(Debug, Clone)]
pub struct SysfsPfMac {
    root: PathBuf,
}

impl Default for SysfsPfMac {
    fn default() -> Self {
        SysfsPfMac {
            root: PathBuf::from("/sys/class/net"),
        }
    }
}

impl SysfsPfMac {
    /// Read below `root` instead of `/sys/class/net`.
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        SysfsPfMac {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn config_path(&self, netdev_name: &InterfaceName) -> PathBuf {
        self.root
            .join(netdev_name.as_ref())
            .join("smart_nic/pf/config")
    }
}

impl HostPfMacSource for SysfsPfMac {
    fn host_pf_mac(&self, netdev_name: &str) -> Result<Mac, CompatError> {
        let netdev_name = InterfaceName::try_from(netdev_name)?;
        let path = self.config_path(&netdev_name);
        let file = File::open(&path).map_err(|source| CompatError::Io {
            path: path.clone(),
            source,
        })?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| CompatError::Io {
                path: path.clone(),
                source,
            })?;
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            if !key.starts_with("MAC") {
                continue;
            }
            let Some(value) = rest.strip_prefix(' ') else {
                continue;
            };
            return value
                .trim_end()
                .parse::<Mac>()
                .map_err(|source| CompatError::Malformed {
                    path: path.clone(),
                    source,
                });
        }
        Err(CompatError::NotFound { path })
    }
}
