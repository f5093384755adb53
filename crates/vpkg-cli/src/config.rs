//! Descriptor file handling for vpkg-cli: TOML on disk in, typed
//! [`vpkg_core::VehicleDescriptor`] out.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use vpkg_core::{EcuDescriptor, VehicleDescriptor, ZoneDescriptor};

/// On-disk shape of a vehicle descriptor file. Firmware is referenced by
/// path rather than embedded, since TOML has no convenient binary literal.
#[derive(Debug, Deserialize)]
pub struct DescriptorFile {
    pub vin: String,
    pub model: String,
    pub model_year: u16,
    pub region: u8,
    pub master_sw_version: String,
    pub zones: Vec<ZoneFile>,
}

#[derive(Debug, Deserialize)]
pub struct ZoneFile {
    pub zone_id: String,
    pub zone_name: String,
    pub zone_number: u8,
    pub ecus: Vec<EcuFile>,
}

#[derive(Debug, Deserialize)]
pub struct EcuFile {
    pub ecu_id: String,
    pub firmware_version: String,
    pub hardware_version: String,
    pub priority: u8,
    pub firmware_path: String,
}

impl DescriptorFile {
    /// Load and parse a descriptor file from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read descriptor file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse descriptor file: {}", path.display()))
    }

    /// Resolve firmware paths (relative to the descriptor file's own
    /// directory) into a fully materialized [`VehicleDescriptor`].
    pub fn into_vehicle_descriptor(self, base_dir: &Path) -> Result<VehicleDescriptor> {
        let mut zones = Vec::with_capacity(self.zones.len());
        for zone in self.zones {
            let mut ecus = Vec::with_capacity(zone.ecus.len());
            for ecu in zone.ecus {
                let firmware_path = base_dir.join(&ecu.firmware_path);
                let firmware = std::fs::read(&firmware_path)
                    .with_context(|| format!("failed to read firmware file: {}", firmware_path.display()))?;
                ecus.push(EcuDescriptor {
                    ecu_id: ecu.ecu_id,
                    firmware_version: ecu.firmware_version,
                    hardware_version: ecu.hardware_version,
                    priority: ecu.priority,
                    firmware,
                });
            }
            zones.push(ZoneDescriptor {
                zone_id: zone.zone_id,
                zone_name: zone.zone_name,
                zone_number: zone.zone_number,
                ecus,
            });
        }

        Ok(VehicleDescriptor {
            vin: self.vin,
            model: self.model,
            model_year: self.model_year,
            region: self.region,
            master_sw_version: self.master_sw_version,
            zones,
        })
    }
}

const KIB: usize = 1024;

/// Deterministic dummy firmware: a 64-byte ASCII header (`FIRMWARE_<id>`,
/// NUL padded) followed by a repeating `byte i mod 256` ramp.
fn dummy_firmware(ecu_id: &str, len: usize) -> Vec<u8> {
    const HEADER_LEN: usize = 64;
    let header = format!("FIRMWARE_{ecu_id}");
    let mut firmware = vec![0u8; len];
    firmware[..header.len()].copy_from_slice(header.as_bytes());
    for (i, byte) in firmware.iter_mut().enumerate().skip(HEADER_LEN) {
        *byte = (i % 256) as u8;
    }
    firmware
}

/// The built-in sample vehicle, used when the caller supplies no
/// `--descriptor`: the repository's reference fleet, a Genesis GV80 with
/// three zones (numbered 1, 2, and non-sequentially 9) and five ECUs.
pub fn sample_vehicle_descriptor() -> VehicleDescriptor {
    let ecu = |id: &str, firmware_version: &str, priority: u8, size: usize| EcuDescriptor {
        ecu_id: id.to_string(),
        firmware_version: firmware_version.to_string(),
        hardware_version: "1.0.0".to_string(),
        priority,
        firmware: dummy_firmware(id, size),
    };

    VehicleDescriptor {
        vin: "KMHXX00XXXX000001".to_string(),
        model: "Genesis GV80".to_string(),
        model_year: 2024,
        region: 3,
        master_sw_version: "v2.0.0".to_string(),
        zones: vec![
            ZoneDescriptor {
                zone_id: "ZONE_01".to_string(),
                zone_name: "Powertrain".to_string(),
                zone_number: 1,
                ecus: vec![
                    ecu("ECU_011", "v2.0.1", 1, 256 * KIB),
                    ecu("ECU_012", "v1.5.0", 2, 128 * KIB),
                ],
            },
            ZoneDescriptor {
                zone_id: "ZONE_02".to_string(),
                zone_name: "Body".to_string(),
                zone_number: 2,
                ecus: vec![
                    ecu("ECU_021", "v1.0.0", 1, 512 * KIB),
                    ecu("ECU_022", "v1.0.0", 2, 384 * KIB),
                ],
            },
            ZoneDescriptor {
                zone_id: "ZONE_09".to_string(),
                zone_name: "Gateway".to_string(),
                zone_number: 9,
                ecus: vec![ecu("ECU_091", "v2.0.0", 1, 1024 * KIB)],
            },
        ],
    }
}
