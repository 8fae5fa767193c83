//! Advertising payload encoding and link policy parameters.

use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;

pub use {adv::*, consts::*};

mod adv;
mod consts;

/// 16-bit Bluetooth SIG UUID.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Uuid16(NonZeroU16);

impl Uuid16 {
    /// Creates a 16-bit SIG UUID from a `u16`.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Option<Self> {
        match NonZeroU16::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the raw 16-bit UUID value.
    #[inline(always)]
    #[must_use]
    pub(crate) const fn raw(self) -> u16 {
        self.0.get()
    }

    /// Returns the UUID as a little-endian byte array.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.get().to_le_bytes()
    }
}

impl Debug for Uuid16 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0.get())
    }
}

impl Display for Uuid16 {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Uuid16> for u16 {
    #[inline]
    fn from(u: Uuid16) -> Self {
        u.raw()
    }
}

/// Creates an assigned 16-bit SIG UUID from a `u16`.
#[inline]
#[must_use]
pub(crate) const fn uuid16(v: u16) -> Uuid16 {
    // SAFETY: All crate uses guarantee that v != 0
    Uuid16(unsafe { NonZeroU16::new_unchecked(v) })
}

/// Public device (BD_ADDR) address.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Addr([u8; 6]);

impl Addr {
    /// Creates an address from little-endian bytes.
    #[inline]
    #[must_use]
    pub const fn new(v: [u8; 6]) -> Self {
        Self(v)
    }
}

impl AsRef<[u8]> for Addr {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let v = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            v[5], v[4], v[3], v[2], v[1], v[0]
        )
    }
}

impl Display for Addr {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Undirected connectable advertising parameters, owned by each server
/// instance. Intervals are in 0.625 ms units.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdvParams {
    pub min_interval: u16,
    pub max_interval: u16,
}

impl Default for AdvParams {
    /// Returns a 20-40 ms advertising interval.
    #[inline]
    fn default() -> Self {
        Self {
            min_interval: 0x20,
            max_interval: 0x40,
        }
    }
}

/// Connection parameter update request. Intervals are in 1.25 ms units and
/// the supervision timeout is in 10 ms units.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnParams {
    pub peer: Addr,
    pub latency: u16,
    pub min_interval: u16,
    pub max_interval: u16,
    pub timeout: u16,
}

impl ConnParams {
    /// Returns the fixed peripheral update policy for `peer`: zero latency,
    /// 20-40 ms connection interval, 4 s supervision timeout.
    #[inline]
    #[must_use]
    pub const fn with_peer(peer: Addr) -> Self {
        Self {
            peer,
            latency: 0,
            min_interval: 0x10,
            max_interval: 0x20,
            timeout: 400,
        }
    }
}
