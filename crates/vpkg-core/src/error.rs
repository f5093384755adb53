//! Error types for the Vehicle Package codec

use thiserror::Error;

/// Result type for codec operations
pub type VpkgResult<T> = Result<T, VpkgError>;

/// Flat error set for the Vehicle/Zone/ECU binary codec.
///
/// Every variant is fatal for the build/parse call that raised it; the
/// caller receives exactly one value and no partial view is ever returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VpkgError {
    /// First four bytes do not match the expected magic for this level.
    #[error("bad magic at {level}: expected 0x{expected:08X}, got 0x{actual:08X}")]
    BadMagic {
        level: &'static str,
        expected: u32,
        actual: u32,
    },

    /// Format version field is not one this codec understands, or a
    /// version's reserved top byte is non-zero.
    #[error("unsupported version at {level}: 0x{actual:08X}")]
    UnsupportedVersion { level: &'static str, actual: u32 },

    /// Declared total size does not match the input slice length.
    #[error("length mismatch at {level}: declared {declared}, actual {actual}")]
    LengthMismatch {
        level: &'static str,
        declared: usize,
        actual: usize,
    },

    /// Stored CRC32 does not match the recomputed CRC32 of the payload.
    #[error("CRC mismatch at {level}: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    CrcMismatch {
        level: &'static str,
        stored: u32,
        computed: u32,
    },

    /// Stored firmware CRC32 does not match the recomputed CRC32.
    #[error("firmware CRC mismatch for ECU {ecu_id}: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    FirmwareCrcMismatch {
        ecu_id: String,
        stored: u32,
        computed: u32,
    },

    /// A table entry's offset/size points outside the enclosing payload.
    #[error("offset out of range at {level} index {index}: offset {offset}, size {size}, bound {bound}")]
    OffsetOutOfRange {
        level: &'static str,
        index: usize,
        offset: usize,
        size: usize,
        bound: usize,
    },

    /// Two table entries' byte ranges intersect.
    #[error("overlapping entries at {level}: index {first} and {second}")]
    OverlappingEntry {
        level: &'static str,
        first: usize,
        second: usize,
    },

    /// Entry count exceeds the hard limit of 16.
    #[error("too many entries at {level}: {count} (max 16)")]
    TooManyEntries { level: &'static str, count: usize },

    /// The same ECU ID appears twice within one zone.
    #[error("duplicate ECU id within zone: {0}")]
    DuplicateEcuId(String),

    /// Sum of per-zone ECU counts does not equal the declared total.
    #[error("ECU count mismatch: declared {declared}, summed {summed}")]
    EcuCountMismatch { declared: u8, summed: u32 },

    /// VIN is not exactly 17 characters long.
    #[error("bad VIN: expected 17 characters, got {0}")]
    BadVin(usize),

    /// A zone table entry declares an ECU package of size zero.
    #[error("zero-sized ECU at zone table index {0}")]
    ZeroSizedEcu(usize),

    /// Input exceeds the configured maximum accepted size.
    #[error("oversized input: {size} bytes exceeds max {max}")]
    OversizedInput { size: usize, max: usize },

    /// Build-time: a zone descriptor has no ECUs.
    #[error("zone {0} must contain at least one ECU")]
    ZoneMustContainEcu(String),

    /// Build-time: a vehicle descriptor has no zones.
    #[error("vehicle must contain at least one zone")]
    VehicleMustContainZone,

    /// A fixed-width integer write was attempted past the end of the buffer.
    #[error("integer write out of bounds: offset {offset}, width {width}, buffer len {len}")]
    BufferTooSmall {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// A version string component was non-numeric or exceeded 255.
    #[error("invalid version string: {0:?}")]
    InvalidVersionString(String),
}
