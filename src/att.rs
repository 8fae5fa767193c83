//! Attribute primitives shared by the table builder and the event router.

use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;

use bitflags::bitflags;

use crate::name_of;

/// Stack-assigned attribute handle.
///
/// Handles are opaque and only become known once the vendor stack reports
/// table creation. The valid domain is `0x0001..0x8000`: bit 15 is reserved to
/// tag pending handler-registry keys, and vendor stacks never number
/// attributes that high, which is what lets both key families share one map
/// (see `gatt::registry`).
#[allow(clippy::unsafe_derive_deserialize)]
#[derive(
    Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Handle(NonZeroU16);

impl Handle {
    pub(crate) const MIN: Self = Self(
        // SAFETY: Non-zero
        unsafe { NonZeroU16::new_unchecked(0x0001) },
    );
    pub(crate) const MAX: Self = Self(
        // SAFETY: Non-zero
        unsafe { NonZeroU16::new_unchecked(0x7FFF) },
    );

    /// Wraps a raw handle. Returns `None` if the value is zero or has the
    /// reserved key bit set.
    #[inline]
    #[must_use]
    pub const fn new(h: u16) -> Option<Self> {
        if h > Self::MAX.0.get() {
            return None;
        }
        // TODO: Use map() when it is const stable
        match NonZeroU16::new(h) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the raw handle value.
    #[inline(always)]
    #[must_use]
    pub(crate) const fn raw(self) -> u16 {
        self.0.get()
    }
}

impl Debug for Handle {
    #[allow(clippy::use_self)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#06X})", name_of!(Handle), self.0.get())
    }
}

impl Display for Handle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Handle> for u16 {
    #[inline]
    fn from(h: Handle) -> Self {
        h.0.get()
    }
}

impl From<Handle> for usize {
    #[inline]
    fn from(h: Handle) -> Self {
        Self::from(h.0.get())
    }
}

bitflags! {
    /// Attribute access permissions. The numbering matches the common vendor
    /// convention of a read block in the low bits and a write block starting
    /// at bit 4.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Perm: u16 {
        /// Attribute is readable.
        const READ = 1 << 0;
        /// Reading requires an encrypted link.
        const READ_ENC = 1 << 1;
        /// Reading requires an encrypted and MITM-protected link.
        const READ_ENC_MITM = 1 << 2;
        /// Attribute is writable.
        const WRITE = 1 << 4;
        /// Writing requires an encrypted link.
        const WRITE_ENC = 1 << 5;
        /// Writing requires an encrypted and MITM-protected link.
        const WRITE_ENC_MITM = 1 << 6;
        /// Writing requires a signed command.
        const WRITE_SIGNED = 1 << 7;
    }
}

impl Perm {
    /// Plain read/write access.
    pub const READ_WRITE: Self = Self::READ.union(Self::WRITE);
}

/// Vendor status code attached to completion events.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    InvalidHandle = 0x01,
    ReadNotPermitted = 0x02,
    WriteNotPermitted = 0x03,
    InsufficientAuthentication = 0x05,
    RequestNotSupported = 0x06,
    InvalidOffset = 0x07,
    InsufficientAuthorization = 0x08,
    AttributeNotFound = 0x0A,
    InsufficientEncryption = 0x0F,
    NoResources = 0x80,
    InternalError = 0x81,
    Busy = 0x84,
    #[num_enum(default)]
    Error = 0x85,
}

impl Status {
    /// Returns whether the status indicates success.
    #[inline(always)]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl Display for Status {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?} ({:#04X})", u8::from(*self))
    }
}
