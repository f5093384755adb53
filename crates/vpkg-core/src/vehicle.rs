//! Vehicle codec: builds/parses a Vehicle Package — the outermost envelope,
//! a 12288-byte metadata block carrying a zone reference table, followed by
//! concatenated Zone Packages.

use tracing::{debug, warn};

use crate::descriptor::VehicleDescriptor;
use crate::error::{VpkgError, VpkgResult};
use crate::primitives::{crc32, read_str_field, read_u16, read_u32, write_str_field, write_u16, write_u32};
use crate::zone::{self, ZoneView};

/// `VPPK` little-endian — see Scenario A in the canonical test fixtures:
/// the first four bytes of a built package are `4B 50 50 56`.
pub const VEHICLE_MAGIC: u32 = 0x5650_504B;
pub const VEHICLE_FORMAT_VERSION: u32 = 0x0001_0000;
pub const VEHICLE_METADATA_SIZE: usize = 12288;
pub const VEHICLE_TABLE_OFFSET: usize = 192;
pub const VEHICLE_TABLE_ENTRY_SIZE: usize = 32;
pub const MAX_ZONES_PER_VEHICLE: usize = 16;

const VIN_LEN: usize = 17;
const MODEL_LEN: usize = 32;
const MODEL_MAX_TEXT: usize = 30;
const SW_STRING_LEN: usize = 32;

const OFF_MAGIC: usize = 0;
const OFF_FORMAT_VERSION: usize = 4;
const OFF_TOTAL_SIZE: usize = 8;
const OFF_VIN: usize = 12;
const OFF_MODEL: usize = 29;
const OFF_MODEL_YEAR: usize = 61;
const OFF_REGION: usize = 63;
const OFF_MASTER_SW_VERSION: usize = 76;
const OFF_MASTER_SW_STRING: usize = 80;
const OFF_ZONE_COUNT: usize = 128;
const OFF_TOTAL_ECU_COUNT: usize = 129;
const OFF_VEHICLE_CRC32: usize = 144;

// Zone reference table entry offsets (relative to entry start).
const E_ZONE_ID: usize = 0;
const E_ZONE_ID_LEN: usize = 16;
const E_OFFSET: usize = 16;
const E_SIZE: usize = 20;
const E_ZONE_NUMBER: usize = 24;
const E_ECU_COUNT: usize = 25;

/// Default cap on the total size of a package this codec will attempt to
/// parse, guarding against unbounded allocation from a hostile length field.
pub const DEFAULT_MAX_ACCEPTED_SIZE: usize = 256 * 1024 * 1024;

/// Parsed view over a Vehicle Package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleView<'a> {
    pub vin: String,
    pub model: String,
    pub model_year: u16,
    pub region: u8,
    pub master_sw_version: u32,
    pub master_sw_string: String,
    pub zones: Vec<ZoneView<'a>>,
}

impl<'a> VehicleView<'a> {
    pub fn zone(&self, zone_id: &str) -> Option<&ZoneView<'a>> {
        self.zones.iter().find(|z| z.zone_id == zone_id)
    }
}

/// Build a complete Vehicle Package from a descriptor.
pub fn build_vehicle_package(descriptor: &VehicleDescriptor, timestamp: u32) -> VpkgResult<Vec<u8>> {
    if descriptor.vin.len() != VIN_LEN {
        return Err(VpkgError::BadVin(descriptor.vin.len()));
    }
    if descriptor.zones.is_empty() {
        return Err(VpkgError::VehicleMustContainZone);
    }
    if descriptor.zones.len() > MAX_ZONES_PER_VEHICLE {
        return Err(VpkgError::TooManyEntries {
            level: "vehicle",
            count: descriptor.zones.len(),
        });
    }

    let mut payload = Vec::new();
    let mut entries = Vec::with_capacity(descriptor.zones.len());
    let mut offset = VEHICLE_METADATA_SIZE;
    let mut total_ecu_count: usize = 0;

    for zone_descriptor in &descriptor.zones {
        let (zone_bytes, info) = zone::build_zone_package(zone_descriptor, timestamp)?;
        total_ecu_count += info.ecu_count as usize;
        entries.push((offset, info));
        offset += zone_bytes.len();
        payload.extend(zone_bytes);
    }

    let total_ecu_count: u8 = total_ecu_count.try_into().map_err(|_| VpkgError::TooManyEntries {
        level: "vehicle_total_ecu_count",
        count: total_ecu_count,
    })?;

    let total_vehicle_size = VEHICLE_METADATA_SIZE + payload.len();
    let master_sw_version = crate::primitives::parse_version(&descriptor.master_sw_version)?;

    let mut buf = vec![0u8; VEHICLE_METADATA_SIZE];
    write_u32(&mut buf, OFF_MAGIC, VEHICLE_MAGIC)?;
    write_u32(&mut buf, OFF_FORMAT_VERSION, VEHICLE_FORMAT_VERSION)?;
    write_u32(&mut buf, OFF_TOTAL_SIZE, total_vehicle_size as u32)?;
    write_str_field(&mut buf, OFF_VIN, VIN_LEN, &descriptor.vin);

    let model_text: String = descriptor.model.chars().take(MODEL_MAX_TEXT).collect();
    write_str_field(&mut buf, OFF_MODEL, MODEL_LEN, &model_text);

    write_u16(&mut buf, OFF_MODEL_YEAR, descriptor.model_year)?;
    buf[OFF_REGION] = descriptor.region;
    write_u32(&mut buf, OFF_MASTER_SW_VERSION, master_sw_version)?;
    write_str_field(&mut buf, OFF_MASTER_SW_STRING, SW_STRING_LEN, &descriptor.master_sw_version);
    buf[OFF_ZONE_COUNT] = descriptor.zones.len() as u8;
    buf[OFF_TOTAL_ECU_COUNT] = total_ecu_count;

    for (i, (entry_offset, info)) in entries.iter().enumerate() {
        let base = VEHICLE_TABLE_OFFSET + i * VEHICLE_TABLE_ENTRY_SIZE;
        write_str_field(&mut buf, base + E_ZONE_ID, E_ZONE_ID_LEN, &info.zone_id);
        write_u32(&mut buf, base + E_OFFSET, *entry_offset as u32)?;
        write_u32(&mut buf, base + E_SIZE, info.total_size as u32)?;
        buf[base + E_ZONE_NUMBER] = info.zone_number;
        buf[base + E_ECU_COUNT] = info.ecu_count;
    }

    buf.extend(payload);

    let computed_crc = crc32(&buf[VEHICLE_METADATA_SIZE..total_vehicle_size]);
    write_u32(&mut buf, OFF_VEHICLE_CRC32, computed_crc)?;

    debug!(
        vin = %descriptor.vin,
        zone_count = descriptor.zones.len(),
        total_ecu_count,
        total_vehicle_size,
        "built vehicle package"
    );

    Ok(buf)
}

/// Parse a complete Vehicle Package, recursing into its zones and their
/// ECUs. `max_accepted_size` bounds the declared total size before any
/// allocation beyond the metadata header is attempted.
pub fn parse_vehicle_package(data: &[u8], max_accepted_size: usize) -> VpkgResult<VehicleView<'_>> {
    if data.len() < VEHICLE_METADATA_SIZE {
        return Err(VpkgError::LengthMismatch {
            level: "vehicle",
            declared: VEHICLE_METADATA_SIZE,
            actual: data.len(),
        });
    }

    let magic = read_u32(data, OFF_MAGIC);
    if magic != VEHICLE_MAGIC {
        warn!(actual = format!("0x{magic:08X}"), "vehicle bad magic");
        return Err(VpkgError::BadMagic {
            level: "vehicle",
            expected: VEHICLE_MAGIC,
            actual: magic,
        });
    }

    let format_version = read_u32(data, OFF_FORMAT_VERSION);
    if format_version != VEHICLE_FORMAT_VERSION {
        return Err(VpkgError::UnsupportedVersion {
            level: "vehicle",
            actual: format_version,
        });
    }

    let total_vehicle_size = read_u32(data, OFF_TOTAL_SIZE) as usize;
    if total_vehicle_size > max_accepted_size {
        return Err(VpkgError::OversizedInput {
            size: total_vehicle_size,
            max: max_accepted_size,
        });
    }
    if total_vehicle_size != data.len() {
        return Err(VpkgError::LengthMismatch {
            level: "vehicle",
            declared: total_vehicle_size,
            actual: data.len(),
        });
    }

    let vin = read_str_field(data, OFF_VIN, VIN_LEN);
    if vin.len() != VIN_LEN {
        return Err(VpkgError::BadVin(vin.len()));
    }

    let zone_count = data[OFF_ZONE_COUNT] as usize;
    if zone_count > MAX_ZONES_PER_VEHICLE {
        return Err(VpkgError::TooManyEntries {
            level: "vehicle",
            count: zone_count,
        });
    }

    let table_end = VEHICLE_TABLE_OFFSET + zone_count * VEHICLE_TABLE_ENTRY_SIZE;
    if table_end > VEHICLE_METADATA_SIZE {
        return Err(VpkgError::TooManyEntries {
            level: "vehicle",
            count: zone_count,
        });
    }

    let mut zones = Vec::with_capacity(zone_count);
    let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(zone_count);
    let mut payload_sum = 0usize;
    let mut summed_ecu_count: u32 = 0;

    for i in 0..zone_count {
        let base = VEHICLE_TABLE_OFFSET + i * VEHICLE_TABLE_ENTRY_SIZE;
        let offset = read_u32(data, base + E_OFFSET) as usize;
        let size = read_u32(data, base + E_SIZE) as usize;

        if i == 0 && offset != VEHICLE_METADATA_SIZE {
            return Err(VpkgError::OffsetOutOfRange {
                level: "vehicle",
                index: i,
                offset,
                size,
                bound: total_vehicle_size,
            });
        }
        if offset < VEHICLE_METADATA_SIZE
            || offset.checked_add(size).is_none_or(|end| end > total_vehicle_size)
        {
            return Err(VpkgError::OffsetOutOfRange {
                level: "vehicle",
                index: i,
                offset,
                size,
                bound: total_vehicle_size,
            });
        }
        if size == 0 {
            return Err(VpkgError::OffsetOutOfRange {
                level: "vehicle",
                index: i,
                offset,
                size,
                bound: total_vehicle_size,
            });
        }

        for (j, &(other_offset, other_end)) in ranges.iter().enumerate() {
            if offset < other_end && other_offset < offset + size {
                return Err(VpkgError::OverlappingEntry {
                    level: "vehicle",
                    first: j,
                    second: i,
                });
            }
        }
        ranges.push((offset, offset + size));
        payload_sum += size;

        let view = zone::parse_zone_package(&data[offset..offset + size])?;
        summed_ecu_count += view.ecus.len() as u32;
        zones.push(view);
    }

    if VEHICLE_METADATA_SIZE + payload_sum != total_vehicle_size {
        return Err(VpkgError::LengthMismatch {
            level: "vehicle",
            declared: total_vehicle_size,
            actual: VEHICLE_METADATA_SIZE + payload_sum,
        });
    }

    let declared_total_ecu_count = data[OFF_TOTAL_ECU_COUNT];
    if declared_total_ecu_count as u32 != summed_ecu_count {
        return Err(VpkgError::EcuCountMismatch {
            declared: declared_total_ecu_count,
            summed: summed_ecu_count,
        });
    }

    // Checked last: every nested zone (and in turn every nested ECU) has
    // already been individually validated by this point, so a package
    // whose firmware was tampered with fails there with the specific ECU
    // ID rather than here with an undifferentiated vehicle-level mismatch.
    let stored_crc = read_u32(data, OFF_VEHICLE_CRC32);
    let computed_crc = crc32(&data[VEHICLE_METADATA_SIZE..total_vehicle_size]);
    if stored_crc != computed_crc {
        warn!(vin = %vin, "vehicle CRC mismatch");
        return Err(VpkgError::CrcMismatch {
            level: "vehicle",
            stored: stored_crc,
            computed: computed_crc,
        });
    }

    Ok(VehicleView {
        vin,
        model: read_str_field(data, OFF_MODEL, MODEL_LEN),
        model_year: read_u16(data, OFF_MODEL_YEAR),
        region: data[OFF_REGION],
        master_sw_version: read_u32(data, OFF_MASTER_SW_VERSION),
        master_sw_string: read_str_field(data, OFF_MASTER_SW_STRING, SW_STRING_LEN),
        zones,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{EcuDescriptor, ZoneDescriptor};
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

    fn sample_zone(id: &str, number: u8) -> ZoneDescriptor {
        ZoneDescriptor {
            zone_id: id.into(),
            zone_name: "Zone".into(),
            zone_number: number,
            ecus: vec![sample_ecu(&format!("{id}_ECU1")), sample_ecu(&format!("{id}_ECU2"))],
        }
    }

    fn sample_vehicle() -> VehicleDescriptor {
        VehicleDescriptor {
            vin: "1HGCM82633A123456".chars().take(17).collect(),
            model: "Model X Touring Edition".into(),
            model_year: 2026,
            region: 1,
            master_sw_version: "4.2.0".into(),
            zones: vec![sample_zone("ZONE_01", 1), sample_zone("ZONE_02", 2)],
        }
    }

    #[test]
    fn build_then_parse_roundtrips() {
        let descriptor = sample_vehicle();
        let bytes = build_vehicle_package(&descriptor, 1_700_000_000).unwrap();
        assert_eq!(&bytes[0..4], &VEHICLE_MAGIC.to_le_bytes());
        assert_eq!(bytes[0..4], [0x4B, 0x50, 0x50, 0x56]);

        let view = parse_vehicle_package(&bytes, DEFAULT_MAX_ACCEPTED_SIZE).unwrap();
        assert_eq!(view.vin, descriptor.vin);
        assert_eq!(view.model_year, 2026);
        assert_eq!(view.zones.len(), 2);
        assert_eq!(view.zone("ZONE_01").unwrap().ecus.len(), 2);
    }

    #[test]
    fn bad_vin_length_rejected() {
        let mut descriptor = sample_vehicle();
        descriptor.vin = "SHORT".into();
        assert!(matches!(build_vehicle_package(&descriptor, 0), Err(VpkgError::BadVin(5))));
    }

    #[test]
    fn model_field_truncated_with_trailing_nuls() {
        let mut descriptor = sample_vehicle();
        descriptor.model = "A".repeat(40);
        let bytes = build_vehicle_package(&descriptor, 0).unwrap();
        assert_eq!(&bytes[OFF_MODEL + 30..OFF_MODEL + 32], &[0, 0]);
        let view = parse_vehicle_package(&bytes, DEFAULT_MAX_ACCEPTED_SIZE).unwrap();
        assert_eq!(view.model, "A".repeat(30));
    }

    #[test]
    fn sixteen_zones_accepted_seventeen_rejected() {
        let mut descriptor = sample_vehicle();
        descriptor.zones = (0..16).map(|i| sample_zone(&format!("ZONE_{i:03}"), i as u8)).collect();
        assert!(build_vehicle_package(&descriptor, 0).is_ok());

        descriptor.zones.push(sample_zone("ZONE_999", 17));
        assert!(matches!(
            build_vehicle_package(&descriptor, 0),
            Err(VpkgError::TooManyEntries { level: "vehicle", count: 17 })
        ));
    }

    #[test]
    fn truncation_detected() {
        let descriptor = sample_vehicle();
        let bytes = build_vehicle_package(&descriptor, 0).unwrap();
        let truncated = &bytes[..bytes.len() - 1024];
        assert!(matches!(
            parse_vehicle_package(truncated, DEFAULT_MAX_ACCEPTED_SIZE),
            Err(VpkgError::LengthMismatch { level: "vehicle", .. })
        ));
    }

    #[test]
    fn vehicle_crc_tamper_detected() {
        let descriptor = sample_vehicle();
        let mut bytes = build_vehicle_package(&descriptor, 0).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        // The tampered byte lands inside the last zone's last ECU firmware,
        // which is validated (recursively) before the enclosing vehicle CRC,
        // so the specific ECU surfaces rather than a vehicle-level mismatch.
        assert!(matches!(
            parse_vehicle_package(&bytes, DEFAULT_MAX_ACCEPTED_SIZE),
            Err(VpkgError::FirmwareCrcMismatch { ref ecu_id, .. }) if ecu_id == "ZONE_02_ECU2"
        ));
    }

    #[test]
    fn vehicle_crc_field_tamper_surfaces_vehicle_crc_mismatch() {
        let descriptor = sample_vehicle();
        let mut bytes = build_vehicle_package(&descriptor, 0).unwrap();
        // Corrupt the stored CRC itself rather than the payload it covers,
        // so every nested zone and ECU still parses cleanly and only the
        // enclosing vehicle-level check can fail.
        bytes[OFF_VEHICLE_CRC32] ^= 0xFF;
        assert!(matches!(
            parse_vehicle_package(&bytes, DEFAULT_MAX_ACCEPTED_SIZE),
            Err(VpkgError::CrcMismatch { level: "vehicle", .. })
        ));
    }

    #[test]
    fn ecu_count_mismatch_detected() {
        let descriptor = sample_vehicle();
        let mut bytes = build_vehicle_package(&descriptor, 0).unwrap();
        // This byte sits inside the metadata header, outside the CRC-covered
        // payload region, so no recompute is needed for this tamper alone.
        bytes[OFF_TOTAL_ECU_COUNT] += 1;
        assert!(matches!(
            parse_vehicle_package(&bytes, DEFAULT_MAX_ACCEPTED_SIZE),
            Err(VpkgError::EcuCountMismatch { declared, summed: 4 }) if declared == 5
        ));
    }

    #[test]
    fn sixteen_and_eighteen_character_vins_rejected() {
        let mut descriptor = sample_vehicle();
        descriptor.vin = "1234567890123456".into();
        assert_eq!(descriptor.vin.len(), 16);
        assert!(matches!(build_vehicle_package(&descriptor, 0), Err(VpkgError::BadVin(16))));

        descriptor.vin = "123456789012345678".into();
        assert_eq!(descriptor.vin.len(), 18);
        assert!(matches!(build_vehicle_package(&descriptor, 0), Err(VpkgError::BadVin(18))));
    }

    #[test]
    fn zone_offset_tamper_detected() {
        let descriptor = sample_vehicle();
        let mut bytes = build_vehicle_package(&descriptor, 0).unwrap();
        let base = VEHICLE_TABLE_OFFSET + VEHICLE_TABLE_ENTRY_SIZE;
        let bad_offset = (bytes.len() + 1) as u32;
        write_u32(&mut bytes, base + E_OFFSET, bad_offset).unwrap();
        let crc = crc32(&bytes[VEHICLE_METADATA_SIZE..]);
        write_u32(&mut bytes, OFF_VEHICLE_CRC32, crc).unwrap();
        assert!(matches!(
            parse_vehicle_package(&bytes, DEFAULT_MAX_ACCEPTED_SIZE),
            Err(VpkgError::OffsetOutOfRange { level: "vehicle", .. })
        ));
    }

    #[test]
    fn oversized_input_rejected_before_allocation() {
        let descriptor = sample_vehicle();
        let bytes = build_vehicle_package(&descriptor, 0).unwrap();
        assert!(matches!(
            parse_vehicle_package(&bytes, 1024),
            Err(VpkgError::OversizedInput { .. })
        ));
    }
}
