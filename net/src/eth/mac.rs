// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mac address type and logic.

use core::fmt::{Display, Formatter};
use core::str::FromStr;

/// A [MAC Address] type.
///
/// `Mac` is a transparent wrapper around `[u8; 6]` which provides a
/// small collection of methods and type safety.
///
/// [MAC Address]: https://en.wikipedia.org/wiki/MAC_address
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac(pub [u8; 6]);

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl From<Mac> for [u8; 6] {
    fn from(value: Mac) -> Self {
        value.0
    }
}

impl AsRef<[u8; 6]> for Mac {
    fn as_ref(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Mac {
    /// The zero `Mac`.
    ///
    /// Devlink reports an all-zero hardware address when the driver did not
    /// fill in the port function address.
    pub const ZERO: Mac = Mac([0; 6]);

    /// Returns true iff the binary representation of the [`Mac`] is
    /// exclusively zeros.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }

    /// Returns the raw octets of the [`Mac`].
    #[must_use]
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors which may occur when parsing a [`Mac`] from its colon-separated
/// string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacParseError {
    /// The string does not have six colon-separated parts.
    #[error("expected six colon-separated octets, found {0}")]
    WrongPartCount(usize),
    /// One of the parts is not a two-digit hexadecimal octet.
    #[error("'{0}' is not a valid hexadecimal octet")]
    IllegalOctet(String),
}

impl FromStr for Mac {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split(':') {
            if count == octets.len() {
                return Err(MacParseError::WrongPartCount(count + 1));
            }
            if part.len() != 2 {
                return Err(MacParseError::IllegalOctet(part.to_string()));
            }
            octets[count] = u8::from_str_radix(part, 16)
                .map_err(|_| MacParseError::IllegalOctet(part.to_string()))?;
            count += 1;
        }
        if count != octets.len() {
            return Err(MacParseError::WrongPartCount(count));
        }
        Ok(Mac(octets))
    }
}
