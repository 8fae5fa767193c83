use bitflags::bitflags;

use crate::gap::{uuid16, Uuid16};

/// Primary Service declaration attribute type (`0x2800`).
pub const PRIMARY_SERVICE: Uuid16 = uuid16(0x2800);
/// Characteristic declaration attribute type (`0x2803`).
pub const CHARACTERISTIC: Uuid16 = uuid16(0x2803);
/// Characteristic User Description descriptor type (`0x2901`).
pub const USER_DESCRIPTION: Uuid16 = uuid16(0x2901);
/// Client Characteristic Configuration descriptor type (`0x2902`).
pub const CLIENT_CONFIG: Uuid16 = uuid16(0x2902);

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        /// Permits broadcasts of the Characteristic Value.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permits writes of the Characteristic Value without response.
        const WRITE_WITHOUT_RESPONSE = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment. If set, a Client Characteristic Configuration
        /// descriptor shall exist.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        /// If set, a Client Characteristic Configuration descriptor shall
        /// exist.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        /// Additional properties are defined in the Characteristic Extended
        /// Properties descriptor.
        const EXTENDED_PROPERTIES = 0x80;
    }
}

bitflags! {
    /// Client Characteristic Configuration descriptor value
    /// ([Vol 3] Part G, Section 3.3.3.3). Applications interpret the
    /// little-endian contents of a `client_cfg` buffer with these bits to
    /// learn the peer's notify/indicate subscription state.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Cccd: u16 {
        /// The Characteristic Value shall be notified.
        const NOTIFY = 1 << 0;
        /// The Characteristic Value shall be indicated.
        const INDICATE = 1 << 1;
    }
}
