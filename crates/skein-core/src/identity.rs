//! Peer names
//!
//! A [`PeerName`] is a 48-bit identifier shown in the familiar MAC address
//! form (`aa:bb:cc:dd:ee:ff`). The all-zero name is reserved as
//! [`PeerName::UNKNOWN`]: it is the "next hop" recorded for the local peer
//! and never names a real peer.

use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::NameError;

/// Number of significant bits in a peer name
const NAME_BITS: u32 = 48;

/// Identifier of a peer in the mesh
///
/// Serialized as its numeric value. Deserializing a value wider than 48
/// bits fails instead of truncating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PeerName(u64);

/// Ordered set of peer names
pub type PeerNameSet = BTreeSet<PeerName>;

impl PeerName {
    /// Sentinel for "no peer" (e.g. the next hop towards ourselves)
    pub const UNKNOWN: PeerName = PeerName(0);

    /// Create a peer name from its numeric value
    ///
    /// Bits above the 48th are discarded.
    pub const fn new(value: u64) -> Self {
        Self(value & ((1 << NAME_BITS) - 1))
    }

    /// Create a peer name, rejecting values that do not fit in 48 bits
    pub fn checked(value: u64) -> Result<Self, NameError> {
        if value >> NAME_BITS != 0 {
            return Err(NameError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Parse a textual name, rejecting the reserved unknown name
    pub fn from_user_input(input: &str) -> Result<Self, NameError> {
        let name: PeerName = input.parse()?;
        if name.is_unknown() {
            return Err(NameError::Reserved);
        }
        Ok(name)
    }

    /// Get the underlying numeric value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this is the reserved unknown name
    pub const fn is_unknown(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for PeerName {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for PeerName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u64::deserialize(deserializer)?;
        Self::checked(value).map_err(de::Error::custom)
    }
}

impl Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl FromStr for PeerName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = s.split(':').collect();
        if groups.len() != 6 {
            return Err(NameError::InvalidFormat(s.to_string()));
        }

        let mut value = 0u64;
        for group in groups {
            if group.len() != 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(NameError::InvalidFormat(s.to_string()));
            }
            let byte = u8::from_str_radix(group, 16)
                .map_err(|_| NameError::InvalidFormat(s.to_string()))?;
            value = (value << 8) | u64::from(byte);
        }
        Ok(Self(value))
    }
}
