//! Legacy advertising and scan-response payload encoders. Both produce
//! length-type-value fields within the 31-byte legacy PDU budget
//! (\[Vol 6\] Part B, Section 2.3.1) and return a freshly owned buffer that
//! the caller hands to the vendor stack's configure call and then drops.

use structbuf::{Pack, StructBuf};

use super::*;

/// Legacy advertising PDU payload budget.
pub const ADV_DATA_MAX: usize = 31;

/// Bytes consumed by the fixed fields of [`adv_data`]: flags (3), TX power
/// (3), one 16-bit service UUID (4), and the name field header (2).
const FIXED_LEN: usize = 12;

/// Maximum advertised device name length in bytes.
pub const NAME_MAX: usize = ADV_DATA_MAX - FIXED_LEN;

/// Maximum number of 16-bit UUIDs in a scan-response payload.
pub const SCAN_RSP_UUID_MAX: usize = 14;

/// Builds the primary advertising payload: flags, TX power, the primary
/// service UUID, and the device name.
///
/// The name is truncated to [`NAME_MAX`] UTF-8 *bytes* (a multi-byte scalar
/// may be split, matching the wire format's byte budget); the name field type
/// is the complete-name type only when no truncation occurred.
#[must_use]
pub fn adv_data(primary: Uuid16, local_name: &str) -> StructBuf {
    let name = local_name.as_bytes();
    let n = name.len().min(NAME_MAX);
    let mut b = StructBuf::new(FIXED_LEN + n);
    let mut p = b.append();
    p.u8(2_u8).u8(ResponseDataType::Flags).u8(AdvFlag::DISCOVERABLE.bits());
    p.u8(2_u8).u8(ResponseDataType::TxPower).i8(TX_POWER_DBM);
    p.u8(3_u8).u8(ResponseDataType::CompleteServiceClass16).u16(primary);
    let typ = if n == name.len() {
        ResponseDataType::CompleteLocalName
    } else {
        ResponseDataType::ShortLocalName
    };
    #[allow(clippy::cast_possible_truncation)]
    p.u8(n as u8 + 1).u8(typ).put(&name[..n]);
    debug_assert_eq!(b.len(), FIXED_LEN + n);
    b
}

/// Builds the scan-response payload listing every secondary service UUID in
/// declaration order, little-endian, capped at [`SCAN_RSP_UUID_MAX`] entries.
/// Returns `None` when there is no secondary service to advertise.
#[must_use]
pub fn scan_rsp_data(secondary: &[Uuid16]) -> Option<StructBuf> {
    if secondary.is_empty() {
        return None;
    }
    let n = secondary.len().min(SCAN_RSP_UUID_MAX);
    let mut b = StructBuf::new(2 + 2 * n);
    let mut p = b.append();
    #[allow(clippy::cast_possible_truncation)]
    p.u8(1 + 2 * n as u8).u8(ResponseDataType::CompleteServiceClass16);
    for &uuid in &secondary[..n] {
        p.u16(uuid);
    }
    debug_assert_eq!(b.len(), 2 + 2 * n);
    Some(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(v: u16) -> Uuid16 {
        Uuid16::new(v).unwrap()
    }

    #[test]
    fn adv_data_layout() {
        let b = adv_data(uuid(0xFFE5), "Echo");
        let want = &[
            0x02, // Length of this Data
            0x01, // <Flags>
            0x06, // LE General Discoverable, BR/EDR Not Supported
            0x02, // Length of this Data
            0x0A, // <TX Power Level>
            0xEB, // -21 dBm
            0x03, // Length of this Data
            0x03, // <Complete list of 16-bit Service UUIDs>
            0xE5, // Primary service UUID
            0xFF, //
            0x05, // Length of this Data
            0x09, // <Complete Local Name>
            0x45, // 'E'
            0x63, // 'c'
            0x68, // 'h'
            0x6F, // 'o'
        ];
        assert_eq!(b.as_ref(), want);
    }

    #[test]
    fn adv_data_name_truncation() {
        let full = "s".repeat(NAME_MAX);
        let b = adv_data(uuid(0x1234), &full);
        assert_eq!(b.len(), ADV_DATA_MAX);
        assert_eq!(b.as_ref()[11], 0x09); // Complete name, exactly at the cap

        let b = adv_data(uuid(0x1234), &format!("{full}!"));
        assert_eq!(b.len(), ADV_DATA_MAX);
        assert_eq!(b.as_ref()[10], NAME_MAX as u8 + 1);
        assert_eq!(b.as_ref()[11], 0x08); // Shortened name
        assert_eq!(&b.as_ref()[12..], full.as_bytes());
    }

    #[test]
    fn adv_data_length_law() {
        for n in 0..32 {
            let name = "x".repeat(n);
            let b = adv_data(uuid(0xFFE0), &name);
            assert_eq!(b.len(), 12 + n.min(19));
            assert!(b.len() <= ADV_DATA_MAX);
        }
    }

    #[test]
    fn scan_rsp_layout() {
        let b = scan_rsp_data(&[uuid(0xFFE0), uuid(0x180F)]).unwrap();
        let want = &[
            0x05, // Length of this Data
            0x03, // <Complete list of 16-bit Service UUIDs>
            0xE0, // Secondary service UUIDs in declaration order
            0xFF, //
            0x0F, //
            0x18, //
        ];
        assert_eq!(b.as_ref(), want);
    }

    #[test]
    fn scan_rsp_cap_and_length_law() {
        assert!(scan_rsp_data(&[]).is_none());
        let uuids: Vec<_> = (1..=20).map(uuid).collect();
        for n in 1..=uuids.len() {
            let b = scan_rsp_data(&uuids[..n]).unwrap();
            assert_eq!(b.len(), 2 + 2 * n.min(SCAN_RSP_UUID_MAX));
            assert!(b.len() <= ADV_DATA_MAX);
        }
        let b = scan_rsp_data(&uuids).unwrap();
        // The 15th and later UUIDs are dropped
        assert_eq!(b.as_ref()[0], 1 + 2 * SCAN_RSP_UUID_MAX as u8);
        assert_eq!(&b.as_ref()[2..4], &[0x01, 0x00]);
        assert_eq!(&b.as_ref()[28..30], &[0x0E, 0x00]);
    }
}
