//! Identity keys for rate-limited principals.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

/// An opaque key that distinguishes one rate-limited principal from another.
///
/// The limiter never interprets the value: it may be a chat user id or a
/// hash of a client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(u64);

impl Identity {
    /// Wrap a raw key, e.g. a chat user id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Derive a key from a client address.
    ///
    /// The hash is stable for the lifetime of the process, which is all the
    /// in-memory limiter needs.
    pub fn from_ip(addr: IpAddr) -> Self {
        let mut hasher = DefaultHasher::new();
        addr.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Identity {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<i64> for Identity {
    /// Chat platforms hand out signed ids; the bits are kept as-is.
    fn from(raw: i64) -> Self {
        Self(raw as u64)
    }
}

impl From<IpAddr> for Identity {
    fn from(addr: IpAddr) -> Self {
        Self::from_ip(addr)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
