//! Platform identifiers
//!
//! Every resource on the platform is addressed by a 64-bit id rendered as a
//! 16-digit hex string on the wire. The zero id means "not yet assigned".

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// A platform-assigned identifier for an organization or resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PlatformId(pub u64);

impl PlatformId {
    /// The unset id.
    pub const ZERO: PlatformId = PlatformId(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Whether this id has been assigned yet.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Error returned when a wire id cannot be decoded.
#[derive(Debug, Error)]
#[error("invalid platform id {0:?}")]
pub struct InvalidId(String);

impl FromStr for PlatformId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16)
            .map(PlatformId)
            .map_err(|_| InvalidId(s.to_string()))
    }
}

impl Serialize for PlatformId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PlatformId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = PlatformId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a hex-encoded platform id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PlatformId, E> {
                v.parse().map_err(de::Error::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<PlatformId, E> {
                Ok(PlatformId(v))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Source of fresh platform ids.
///
/// The engine never invents ids itself; stack creation asks this contract.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> PlatformId;
}
