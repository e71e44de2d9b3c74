// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kernel network-interface identity types.

use core::fmt::{Display, Formatter};
use core::num::NonZeroU32;

/// The kernel's index for a network interface.
///
/// Zero is never a legal interface index.
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceIndex(NonZeroU32);

/// Errors which may occur when constructing an [`InterfaceIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InterfaceIndexError {
    /// Zero is reserved by the kernel to mean "no interface".
    #[error("zero is not a legal interface index")]
    Zero,
}

impl InterfaceIndex {
    /// Map a raw `u32` to an [`InterfaceIndex`].
    ///
    /// # Errors
    ///
    /// Returns [`InterfaceIndexError::Zero`] if the supplied index is zero.
    pub fn try_new(raw: u32) -> Result<Self, InterfaceIndexError> {
        NonZeroU32::new(raw)
            .map(InterfaceIndex)
            .ok_or(InterfaceIndexError::Zero)
    }

    /// Get the raw `u32` representation of this index.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        self.0.get()
    }
}

impl Display for InterfaceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated kernel network-interface name.
///
/// The kernel limits interface names to [`InterfaceName::MAX_LEN`] bytes
/// (one less than `IFNAMSIZ` to leave room for the nul terminator) and
/// refuses names containing `/`, whitespace, or the path components `.`
/// and `..`.  Names which pass this check are safe to splice into sysfs
/// paths.
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceName(String);

/// Errors which may occur when validating an [`InterfaceName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalInterfaceName {
    /// The empty string is not a legal interface name.
    #[error("the empty string is not a legal interface name")]
    Empty,
    /// The name is longer than the kernel permits.
    #[error("interface name '{0}' is longer than {max} bytes", max = InterfaceName::MAX_LEN)]
    TooLong(String),
    /// The name contains a byte the kernel refuses in interface names.
    #[error("interface name '{0}' contains an illegal character")]
    IllegalCharacter(String),
    /// `.` and `..` are path components, not interface names.
    #[error("'{0}' is a path component, not an interface name")]
    PathComponent(String),
}

impl InterfaceName {
    /// The maximum legal length (in bytes) of a kernel interface name.
    pub const MAX_LEN: usize = 15;
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if value.len() > InterfaceName::MAX_LEN {
            return Err(IllegalInterfaceName::TooLong(value.to_string()));
        }
        if value == "." || value == ".." {
            return Err(IllegalInterfaceName::PathComponent(value.to_string()));
        }
        if value
            .bytes()
            .any(|b| b == b'/' || b.is_ascii_whitespace() || !b.is_ascii_graphic())
        {
            return Err(IllegalInterfaceName::IllegalCharacter(value.to_string()));
        }
        Ok(InterfaceName(value.to_string()))
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        InterfaceName::try_from(value.as_str())
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]

    use super::{IllegalInterfaceName, InterfaceIndex, InterfaceIndexError, InterfaceName};

    #[test]
    fn interface_index_rejects_zero() {
        assert_eq!(
            InterfaceIndex::try_new(0),
            Err(InterfaceIndexError::Zero)
        );
        assert_eq!(InterfaceIndex::try_new(10).unwrap().to_u32(), 10);
    }

    #[test]
    fn interface_name_accepts_kernel_names() {
        for name in ["p0", "pf0vf0", "enp3s0f0npf0vf1", "eth0.100"] {
            assert_eq!(InterfaceName::try_from(name).unwrap().as_ref(), name);
        }
    }

    #[test]
    fn interface_name_rejects_illegal_names() {
        assert_eq!(
            InterfaceName::try_from(""),
            Err(IllegalInterfaceName::Empty)
        );
        assert!(matches!(
            InterfaceName::try_from("0123456789abcdef"),
            Err(IllegalInterfaceName::TooLong(_))
        ));
        assert!(matches!(
            InterfaceName::try_from(".."),
            Err(IllegalInterfaceName::PathComponent(_))
        ));
        assert!(matches!(
            InterfaceName::try_from("a/b"),
            Err(IllegalInterfaceName::IllegalCharacter(_))
        ));
        assert!(matches!(
            InterfaceName::try_from("a b"),
            Err(IllegalInterfaceName::IllegalCharacter(_))
        ));
    }
}
