//! Typed descriptors supplied by the caller (the "descriptor source"
//! collaborator, out of scope for this crate) describing what a build
//! should produce.
//!
//! These carry no wire-format behavior; they're plain data consumed by the
//! `build_*` entry points in [`crate::ecu`], [`crate::zone`], and
//! [`crate::vehicle`].

#[cfg(feature = "serde")]
use serde::Deserialize;

/// One ECU's firmware and identity, as supplied to the ECU builder.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct EcuDescriptor {
    pub ecu_id: String,
    pub firmware_version: String,
    pub hardware_version: String,
    pub priority: u8,
    pub firmware: Vec<u8>,
}

/// One zone and its ordered ECUs, as supplied to the Zone builder.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct ZoneDescriptor {
    pub zone_id: String,
    pub zone_name: String,
    pub zone_number: u8,
    pub ecus: Vec<EcuDescriptor>,
}

/// A full vehicle and its ordered zones, as supplied to the Vehicle builder.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct VehicleDescriptor {
    pub vin: String,
    pub model: String,
    pub model_year: u16,
    pub region: u8,
    pub master_sw_version: String,
    pub zones: Vec<ZoneDescriptor>,
}
