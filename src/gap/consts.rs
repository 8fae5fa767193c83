use bitflags::bitflags;

bitflags! {
    /// Advertising data flags (\[CSS\] Part A, Section 1.3).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct AdvFlag: u8 {
        /// LE Limited Discoverable Mode.
        const LE_LIMITED = 1 << 0;
        /// LE General Discoverable Mode.
        const LE_GENERAL = 1 << 1;
        /// BR/EDR Not Supported.
        const NO_BREDR = 1 << 2;
        /// Simultaneous LE and BR/EDR to Same Device Capable (Controller).
        const LE_BREDR_CONTROLLER = 1 << 3;
        /// Simultaneous LE and BR/EDR to Same Device Capable (Host).
        const LE_BREDR_HOST = 1 << 4;
    }
}

impl AdvFlag {
    /// General discoverable LE-only peripheral (`0x06`).
    pub const DISCOVERABLE: Self = Self::LE_GENERAL.union(Self::NO_BREDR);
}

/// Advertising data types used by the payload encoders
/// (\[Assigned Numbers\] Section 2.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum ResponseDataType {
    Flags = 0x01,
    IncompleteServiceClass16 = 0x02,
    CompleteServiceClass16 = 0x03,
    ShortLocalName = 0x08,
    CompleteLocalName = 0x09,
    TxPower = 0x0A,
}

/// Advertised TX power level (`0xEB`).
pub(crate) const TX_POWER_DBM: i8 = -21;
