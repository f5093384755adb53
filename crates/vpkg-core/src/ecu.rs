//! ECU codec: builds/parses a single ECU Package — a 256-byte metadata
//! record followed by a firmware payload.

use tracing::{debug, warn};

use crate::descriptor::EcuDescriptor;
use crate::error::{VpkgError, VpkgResult};
use crate::primitives::{
    crc32, parse_version, read_str_field, read_u32, version_reserved_bits_set, write_str_field,
    write_u32,
};

/// `ECUM` little-endian.
pub const ECU_MAGIC: u32 = 0x4543_554D;

/// Exact size of ECU metadata.
pub const ECU_METADATA_SIZE: usize = 256;

const OFF_MAGIC: usize = 0;
const OFF_ECU_ID: usize = 4;
const LEN_ECU_ID: usize = 16;
const OFF_FW_VERSION: usize = 20;
const OFF_HW_VERSION: usize = 24;
const OFF_FW_SIZE: usize = 28;
const OFF_FW_CRC32: usize = 32;
const OFF_BUILD_TIMESTAMP: usize = 36;
const OFF_VERSION_STRING: usize = 40;
const LEN_VERSION_STRING: usize = 32;
const OFF_DEP_COUNT: usize = 72;
const OFF_DEP_TABLE: usize = 73;
/// Dependency table total size. The distilled spec names "8 entries x 32 B"
/// for this region, but that overflows the 256-byte metadata budget by
/// itself; see DESIGN.md for the resolution (8 entries x 4 B, all reserved).
const LEN_DEP_TABLE: usize = 32;

/// Information the Zone codec needs to populate its ECU table entry,
/// returned alongside the built package bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcuInfo {
    pub ecu_id: String,
    pub total_size: usize,
    pub firmware_size: u32,
    pub firmware_crc32: u32,
    pub firmware_version: u32,
    pub priority: u8,
}

/// Zero-copy view over a parsed ECU Package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcuView<'a> {
    pub ecu_id: String,
    pub firmware_version: u32,
    pub hardware_version: u32,
    pub build_timestamp: u32,
    pub version_string: String,
    pub dependency_count: u8,
    /// Populated by the Zone codec from its ECU table entry; zero until
    /// then since priority is not part of ECU metadata itself.
    pub priority: u8,
    pub firmware: &'a [u8],
}

impl<'a> EcuView<'a> {
    pub(crate) fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Build a single ECU Package from a descriptor.
///
/// The dependency table and all reserved bytes remain zero.
pub fn build_ecu_package(descriptor: &EcuDescriptor, timestamp: u32) -> VpkgResult<(Vec<u8>, EcuInfo)> {
    let firmware_version = parse_version(&descriptor.firmware_version)?;
    let hardware_version = parse_version(&descriptor.hardware_version)?;
    let firmware_crc32 = crc32(&descriptor.firmware);
    let firmware_size: u32 = descriptor
        .firmware
        .len()
        .try_into()
        .map_err(|_| VpkgError::OversizedInput {
            size: descriptor.firmware.len(),
            max: u32::MAX as usize,
        })?;

    let mut metadata = vec![0u8; ECU_METADATA_SIZE];
    write_u32(&mut metadata, OFF_MAGIC, ECU_MAGIC)?;
    write_str_field(&mut metadata, OFF_ECU_ID, LEN_ECU_ID, &descriptor.ecu_id);
    write_u32(&mut metadata, OFF_FW_VERSION, firmware_version)?;
    write_u32(&mut metadata, OFF_HW_VERSION, hardware_version)?;
    write_u32(&mut metadata, OFF_FW_SIZE, firmware_size)?;
    write_u32(&mut metadata, OFF_FW_CRC32, firmware_crc32)?;
    write_u32(&mut metadata, OFF_BUILD_TIMESTAMP, timestamp)?;
    write_str_field(
        &mut metadata,
        OFF_VERSION_STRING,
        LEN_VERSION_STRING,
        &descriptor.firmware_version,
    );
    metadata[OFF_DEP_COUNT] = 0;
    // dependency table [OFF_DEP_TABLE, OFF_DEP_TABLE + LEN_DEP_TABLE) stays zero.
    let _ = OFF_DEP_TABLE;
    let _ = LEN_DEP_TABLE;

    let mut package = metadata;
    package.extend_from_slice(&descriptor.firmware);
    let total_size = package.len();

    debug!(
        ecu_id = %descriptor.ecu_id,
        firmware_size,
        firmware_crc32,
        "built ECU package"
    );

    Ok((
        package,
        EcuInfo {
            ecu_id: descriptor.ecu_id.clone(),
            total_size,
            firmware_size,
            firmware_crc32,
            firmware_version,
            priority: descriptor.priority,
        },
    ))
}

/// Parse a byte slice presumed to contain exactly one ECU Package.
pub fn parse_ecu_package(data: &[u8]) -> VpkgResult<EcuView<'_>> {
    if data.len() < ECU_METADATA_SIZE {
        return Err(VpkgError::LengthMismatch {
            level: "ecu",
            declared: ECU_METADATA_SIZE,
            actual: data.len(),
        });
    }

    let magic = read_u32(data, OFF_MAGIC);
    if magic != ECU_MAGIC {
        warn!(actual = format!("0x{magic:08X}"), "ECU bad magic");
        return Err(VpkgError::BadMagic {
            level: "ecu",
            expected: ECU_MAGIC,
            actual: magic,
        });
    }

    let firmware_version = read_u32(data, OFF_FW_VERSION);
    let hardware_version = read_u32(data, OFF_HW_VERSION);
    if version_reserved_bits_set(firmware_version) || version_reserved_bits_set(hardware_version) {
        return Err(VpkgError::UnsupportedVersion {
            level: "ecu",
            actual: firmware_version,
        });
    }

    let firmware_size = read_u32(data, OFF_FW_SIZE) as usize;
    let expected_len = ECU_METADATA_SIZE + firmware_size;
    if data.len() != expected_len {
        return Err(VpkgError::LengthMismatch {
            level: "ecu",
            declared: expected_len,
            actual: data.len(),
        });
    }

    let stored_crc = read_u32(data, OFF_FW_CRC32);
    let firmware = &data[ECU_METADATA_SIZE..expected_len];
    let computed_crc = crc32(firmware);
    let ecu_id = read_str_field(data, OFF_ECU_ID, LEN_ECU_ID);
    if stored_crc != computed_crc {
        warn!(ecu_id = %ecu_id, "ECU firmware CRC mismatch");
        return Err(VpkgError::FirmwareCrcMismatch {
            ecu_id,
            stored: stored_crc,
            computed: computed_crc,
        });
    }

    let build_timestamp = read_u32(data, OFF_BUILD_TIMESTAMP);
    let version_string = read_str_field(data, OFF_VERSION_STRING, LEN_VERSION_STRING);
    let dependency_count = data[OFF_DEP_COUNT];

    Ok(EcuView {
        ecu_id,
        firmware_version,
        hardware_version,
        build_timestamp,
        version_string,
        dependency_count,
        priority: 0,
        firmware,
    })
}
