//! Zone codec: builds/parses a Zone Package — a 1024-byte header carrying
//! an ECU table, followed by concatenated ECU Packages.

use tracing::{debug, warn};

use crate::descriptor::ZoneDescriptor;
use crate::ecu::{self, EcuView};
use crate::error::{VpkgError, VpkgResult};
use crate::primitives::{crc32, read_str_field, read_u32, write_str_field, write_u32};

/// `ZONE` little-endian.
pub const ZONE_MAGIC: u32 = 0x5A4F_4E45;
/// Format version 1.0.0, packed per [`crate::primitives::encode_version`].
pub const ZONE_FORMAT_VERSION: u32 = 0x0001_0000;
pub const ZONE_HEADER_SIZE: usize = 1024;
pub const ZONE_TABLE_OFFSET: usize = 256;
pub const ZONE_TABLE_ENTRY_SIZE: usize = 48;
pub const MAX_ECUS_PER_ZONE: usize = 16;

const OFF_MAGIC: usize = 0;
const OFF_FORMAT_VERSION: usize = 4;
const OFF_TOTAL_SIZE: usize = 8;
const OFF_ZONE_ID: usize = 12;
const LEN_ZONE_ID: usize = 16;
const OFF_ZONE_NUMBER: usize = 28;
const OFF_ECU_COUNT: usize = 29;
const OFF_ZONE_CRC32: usize = 32;
const OFF_BUILD_TIMESTAMP: usize = 36;
const OFF_ZONE_NAME: usize = 40;
const LEN_ZONE_NAME: usize = 32;

// ECU table entry field offsets (relative to the entry's own start).
const E_ECU_ID: usize = 0;
const E_ECU_ID_LEN: usize = 16;
const E_OFFSET: usize = 16;
const E_SIZE: usize = 20;
const E_METADATA_SIZE: usize = 24;
const E_FIRMWARE_SIZE: usize = 28;
const E_FIRMWARE_VERSION: usize = 32;
const E_CRC32: usize = 36;
const E_PRIORITY: usize = 40;

/// Information the Vehicle codec needs to populate its zone reference
/// table, returned alongside the built package bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneInfo {
    pub zone_id: String,
    pub total_size: usize,
    pub zone_number: u8,
    pub ecu_count: u8,
}

/// Parsed view over a Zone Package: identity plus its ECUs in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneView<'a> {
    pub zone_id: String,
    pub zone_number: u8,
    pub build_timestamp: u32,
    pub zone_name: String,
    pub ecus: Vec<EcuView<'a>>,
}

impl<'a> ZoneView<'a> {
    /// Look up an ECU by ID (table order is authoritative; this is a
    /// linear scan since zones hold at most 16 ECUs).
    pub fn ecu(&self, ecu_id: &str) -> Option<&EcuView<'a>> {
        self.ecus.iter().find(|e| e.ecu_id == ecu_id)
    }
}

/// Build a Zone Package from a descriptor: builds each ECU Package in
/// order, assembles the header and ECU table, then patches the Zone CRC32
/// computed over the payload region.
pub fn build_zone_package(descriptor: &ZoneDescriptor, timestamp: u32) -> VpkgResult<(Vec<u8>, ZoneInfo)> {
    if descriptor.ecus.is_empty() {
        return Err(VpkgError::ZoneMustContainEcu(descriptor.zone_id.clone()));
    }
    if descriptor.ecus.len() > MAX_ECUS_PER_ZONE {
        return Err(VpkgError::TooManyEntries {
            level: "zone",
            count: descriptor.ecus.len(),
        });
    }

    let mut payload = Vec::new();
    let mut entries = Vec::with_capacity(descriptor.ecus.len());
    let mut offset = ZONE_HEADER_SIZE;

    for ecu_descriptor in &descriptor.ecus {
        let (ecu_bytes, info) = ecu::build_ecu_package(ecu_descriptor, timestamp)?;
        entries.push((offset, info));
        offset += ecu_bytes.len();
        payload.extend(ecu_bytes);
    }

    let total_zone_size = ZONE_HEADER_SIZE + payload.len();

    let mut buf = vec![0u8; ZONE_HEADER_SIZE];
    write_u32(&mut buf, OFF_MAGIC, ZONE_MAGIC)?;
    write_u32(&mut buf, OFF_FORMAT_VERSION, ZONE_FORMAT_VERSION)?;
    write_u32(&mut buf, OFF_TOTAL_SIZE, total_zone_size as u32)?;
    write_str_field(&mut buf, OFF_ZONE_ID, LEN_ZONE_ID, &descriptor.zone_id);
    buf[OFF_ZONE_NUMBER] = descriptor.zone_number;
    buf[OFF_ECU_COUNT] = descriptor.ecus.len() as u8;
    write_u32(&mut buf, OFF_BUILD_TIMESTAMP, timestamp)?;
    write_str_field(&mut buf, OFF_ZONE_NAME, LEN_ZONE_NAME, &descriptor.zone_name);

    for (i, (entry_offset, info)) in entries.iter().enumerate() {
        let base = ZONE_TABLE_OFFSET + i * ZONE_TABLE_ENTRY_SIZE;
        write_str_field(&mut buf, base + E_ECU_ID, E_ECU_ID_LEN, &info.ecu_id);
        write_u32(&mut buf, base + E_OFFSET, *entry_offset as u32)?;
        write_u32(&mut buf, base + E_SIZE, info.total_size as u32)?;
        write_u32(&mut buf, base + E_METADATA_SIZE, ecu::ECU_METADATA_SIZE as u32)?;
        write_u32(&mut buf, base + E_FIRMWARE_SIZE, info.firmware_size)?;
        write_u32(&mut buf, base + E_FIRMWARE_VERSION, info.firmware_version)?;
        write_u32(&mut buf, base + E_CRC32, crc32(&payload[*entry_offset - ZONE_HEADER_SIZE..*entry_offset - ZONE_HEADER_SIZE + info.total_size]))?;
        buf[base + E_PRIORITY] = info.priority;
    }

    buf.extend(payload);

    let computed_crc = crc32(&buf[ZONE_HEADER_SIZE..total_zone_size]);
    write_u32(&mut buf, OFF_ZONE_CRC32, computed_crc)?;

    debug!(
        zone_id = %descriptor.zone_id,
        ecu_count = descriptor.ecus.len(),
        total_zone_size,
        "built zone package"
    );

    Ok((
        buf,
        ZoneInfo {
            zone_id: descriptor.zone_id.clone(),
            total_size: total_zone_size,
            zone_number: descriptor.zone_number,
            ecu_count: descriptor.ecus.len() as u8,
        },
    ))
}

/// Parse a byte slice covering a whole Zone Package.
pub fn parse_zone_package(data: &[u8]) -> VpkgResult<ZoneView<'_>> {
    if data.len() < ZONE_HEADER_SIZE {
        return Err(VpkgError::LengthMismatch {
            level: "zone",
            declared: ZONE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let magic = read_u32(data, OFF_MAGIC);
    if magic != ZONE_MAGIC {
        warn!(actual = format!("0x{magic:08X}"), "zone bad magic");
        return Err(VpkgError::BadMagic {
            level: "zone",
            expected: ZONE_MAGIC,
            actual: magic,
        });
    }

    let format_version = read_u32(data, OFF_FORMAT_VERSION);
    if format_version != ZONE_FORMAT_VERSION {
        return Err(VpkgError::UnsupportedVersion {
            level: "zone",
            actual: format_version,
        });
    }

    let total_zone_size = read_u32(data, OFF_TOTAL_SIZE) as usize;
    if total_zone_size != data.len() {
        return Err(VpkgError::LengthMismatch {
            level: "zone",
            declared: total_zone_size,
            actual: data.len(),
        });
    }

    let ecu_count = data[OFF_ECU_COUNT] as usize;
    if ecu_count > MAX_ECUS_PER_ZONE {
        return Err(VpkgError::TooManyEntries {
            level: "zone",
            count: ecu_count,
        });
    }

    let table_end = ZONE_TABLE_OFFSET + ecu_count * ZONE_TABLE_ENTRY_SIZE;
    if table_end > ZONE_HEADER_SIZE {
        return Err(VpkgError::TooManyEntries {
            level: "zone",
            count: ecu_count,
        });
    }

    let mut ecus = Vec::with_capacity(ecu_count);
    let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(ecu_count);
    let mut payload_sum = 0usize;

    for i in 0..ecu_count {
        let base = ZONE_TABLE_OFFSET + i * ZONE_TABLE_ENTRY_SIZE;
        let offset = read_u32(data, base + E_OFFSET) as usize;
        let size = read_u32(data, base + E_SIZE) as usize;
        let metadata_size = read_u32(data, base + E_METADATA_SIZE) as usize;
        let priority = data[base + E_PRIORITY];

        if i == 0 && offset != ZONE_HEADER_SIZE {
            return Err(VpkgError::OffsetOutOfRange {
                level: "zone",
                index: i,
                offset,
                size,
                bound: total_zone_size,
            });
        }
        if offset < ZONE_HEADER_SIZE || offset.checked_add(size).is_none_or(|end| end > total_zone_size) {
            return Err(VpkgError::OffsetOutOfRange {
                level: "zone",
                index: i,
                offset,
                size,
                bound: total_zone_size,
            });
        }
        if size == 0 {
            return Err(VpkgError::ZeroSizedEcu(i));
        }
        if metadata_size != ecu::ECU_METADATA_SIZE {
            return Err(VpkgError::LengthMismatch {
                level: "zone_ecu_metadata",
                declared: ecu::ECU_METADATA_SIZE,
                actual: metadata_size,
            });
        }

        for (j, &(other_offset, other_end)) in ranges.iter().enumerate() {
            if offset < other_end && other_offset < offset + size {
                return Err(VpkgError::OverlappingEntry {
                    level: "zone",
                    first: j,
                    second: i,
                });
            }
        }
        ranges.push((offset, offset + size));
        payload_sum += size;

        let view = ecu::parse_ecu_package(&data[offset..offset + size])?.with_priority(priority);
        if ecus.iter().any(|e: &EcuView<'_>| e.ecu_id == view.ecu_id) {
            return Err(VpkgError::DuplicateEcuId(view.ecu_id));
        }
        ecus.push(view);
    }

    if ZONE_HEADER_SIZE + payload_sum != total_zone_size {
        return Err(VpkgError::LengthMismatch {
            level: "zone",
            declared: total_zone_size,
            actual: ZONE_HEADER_SIZE + payload_sum,
        });
    }

    // Checked last: every nested ECU has already been individually validated
    // (including its own firmware CRC32) by this point, so a package whose
    // firmware was tampered with fails there with the specific ECU ID
    // rather than here with an undifferentiated zone-level mismatch.
    let stored_crc = read_u32(data, OFF_ZONE_CRC32);
    let computed_crc = crc32(&data[ZONE_HEADER_SIZE..total_zone_size]);
    if stored_crc != computed_crc {
        let zone_id = read_str_field(data, OFF_ZONE_ID, LEN_ZONE_ID);
        warn!(zone_id = %zone_id, "zone CRC mismatch");
        return Err(VpkgError::CrcMismatch {
            level: "zone",
            stored: stored_crc,
            computed: computed_crc,
        });
    }

    Ok(ZoneView {
        zone_id: read_str_field(data, OFF_ZONE_ID, LEN_ZONE_ID),
        zone_number: data[OFF_ZONE_NUMBER],
        build_timestamp: read_u32(data, OFF_BUILD_TIMESTAMP),
        zone_name: read_str_field(data, OFF_ZONE_NAME, LEN_ZONE_NAME),
        ecus,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::EcuDescriptor;
    use pretty_assertions::assert_eq;

    fn sample_ecu(id: &str) -> EcuDescriptor {
        EcuDescriptor {
            ecu_id: id.into(),
            firmware_version: "1.0.0".into(),
            hardware_version: "1.0.0".into(),
            priority: 1,
            firmware: format!("FIRMWARE_{id}").into_bytes().repeat(8),
        }
    }

    fn sample_zone() -> ZoneDescriptor {
        ZoneDescriptor {
            zone_id: "ZONE_01".into(),
            zone_name: "Body".into(),
            zone_number: 1,
            ecus: vec![sample_ecu("ECU_011"), sample_ecu("ECU_012")],
        }
    }

    #[test]
    fn build_then_parse_roundtrips() {
        let descriptor = sample_zone();
        let (bytes, info) = build_zone_package(&descriptor, 42).unwrap();
        assert_eq!(bytes.len(), info.total_size);
        assert_eq!(&bytes[0..4], &ZONE_MAGIC.to_le_bytes());

        let view = parse_zone_package(&bytes).unwrap();
        assert_eq!(view.zone_id, "ZONE_01");
        assert_eq!(view.ecus.len(), 2);
        assert_eq!(view.ecu("ECU_011").unwrap().priority, 1);
        assert_eq!(view.build_timestamp, 42);
    }

    #[test]
    fn empty_zone_is_rejected() {
        let mut descriptor = sample_zone();
        descriptor.ecus.clear();
        assert!(matches!(
            build_zone_package(&descriptor, 0),
            Err(VpkgError::ZoneMustContainEcu(_))
        ));
    }

    #[test]
    fn sixteen_ecus_accepted_seventeen_rejected() {
        let mut descriptor = sample_zone();
        descriptor.ecus = (0..16).map(|i| sample_ecu(&format!("ECU_{i:03}"))).collect();
        assert!(build_zone_package(&descriptor, 0).is_ok());

        descriptor.ecus.push(sample_ecu("ECU_999"));
        assert!(matches!(
            build_zone_package(&descriptor, 0),
            Err(VpkgError::TooManyEntries { level: "zone", count: 17 })
        ));
    }

    #[test]
    fn duplicate_ecu_id_detected_on_parse() {
        let descriptor = sample_zone();
        let (mut bytes, _) = build_zone_package(&descriptor, 0).unwrap();
        // Overwrite the second entry's ECU ID to match the first, then
        // recompute CRCs so only the duplicate is at fault.
        let base = ZONE_TABLE_OFFSET + ZONE_TABLE_ENTRY_SIZE;
        let first_id = read_str_field(&bytes, ZONE_TABLE_OFFSET + E_ECU_ID, E_ECU_ID_LEN);
        write_str_field(&mut bytes, base + E_ECU_ID, E_ECU_ID_LEN, &first_id);
        let offset = read_u32(&bytes, base + E_OFFSET) as usize;
        write_str_field(&mut bytes, offset + 4, 16, &first_id);
        let crc = crc32(&bytes[ZONE_HEADER_SIZE..bytes.len()]);
        write_u32(&mut bytes, OFF_ZONE_CRC32, crc).unwrap();

        assert!(matches!(
            parse_zone_package(&bytes),
            Err(VpkgError::DuplicateEcuId(_))
        ));
    }

    #[test]
    fn zone_crc_tamper_detected() {
        let descriptor = sample_zone();
        let (mut bytes, _) = build_zone_package(&descriptor, 0).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        // The tampered byte lands inside the last ECU's firmware, which is
        // validated before the enclosing zone CRC, so the specific ECU
        // surfaces rather than an undifferentiated zone-level mismatch.
        assert!(matches!(
            parse_zone_package(&bytes),
            Err(VpkgError::FirmwareCrcMismatch { ref ecu_id, .. }) if ecu_id == "ECU_012"
        ));
    }

    #[test]
    fn zero_sized_ecu_entry_rejected() {
        let descriptor = sample_zone();
        let (mut bytes, _) = build_zone_package(&descriptor, 0).unwrap();
        let base = ZONE_TABLE_OFFSET + ZONE_TABLE_ENTRY_SIZE;
        write_u32(&mut bytes, base + E_SIZE, 0).unwrap();
        assert!(matches!(
            parse_zone_package(&bytes),
            Err(VpkgError::ZeroSizedEcu(1))
        ));
    }

    #[test]
    fn overlapping_ecu_entries_rejected() {
        let descriptor = sample_zone();
        let (mut bytes, _) = build_zone_package(&descriptor, 0).unwrap();
        // Make the second table entry claim the exact same range as the
        // first, so the two ECU payloads overlap entirely.
        let first_offset = read_u32(&bytes, ZONE_TABLE_OFFSET + E_OFFSET);
        let first_size = read_u32(&bytes, ZONE_TABLE_OFFSET + E_SIZE);
        let second_base = ZONE_TABLE_OFFSET + ZONE_TABLE_ENTRY_SIZE;
        write_u32(&mut bytes, second_base + E_OFFSET, first_offset).unwrap();
        write_u32(&mut bytes, second_base + E_SIZE, first_size).unwrap();
        assert!(matches!(
            parse_zone_package(&bytes),
            Err(VpkgError::OverlappingEntry { level: "zone", first: 0, second: 1 })
        ));
    }

    #[test]
    fn zone_crc_field_tamper_surfaces_zone_crc_mismatch() {
        let descriptor = sample_zone();
        let (mut bytes, _) = build_zone_package(&descriptor, 0).unwrap();
        // Corrupt the stored CRC itself rather than the payload it covers,
        // so every nested ECU still parses cleanly and only the enclosing
        // zone-level check can fail.
        bytes[OFF_ZONE_CRC32] ^= 0xFF;
        assert!(matches!(
            parse_zone_package(&bytes),
            Err(VpkgError::CrcMismatch { level: "zone", .. })
        ));
    }
}
