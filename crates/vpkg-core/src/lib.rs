//! Binary codec for Vehicle Packages: a hierarchical OTA firmware container
//! nesting Vehicle, Zone, and ECU envelopes, each integrity-checked with its
//! own CRC32.
//!
//! ```text
//! Vehicle Package
//!   metadata (12288 B) + zone reference table
//!   Zone Package [0..16]
//!     header (1024 B) + ECU table
//!     ECU Package [0..16]
//!       metadata (256 B) + firmware blob
//! ```

pub mod descriptor;
pub mod ecu;
pub mod error;
pub mod primitives;
pub mod vehicle;
pub mod zone;

pub use descriptor::{EcuDescriptor, VehicleDescriptor, ZoneDescriptor};
pub use ecu::{build_ecu_package, parse_ecu_package, EcuInfo, EcuView};
pub use error::{VpkgError, VpkgResult};
pub use vehicle::{build_vehicle_package, parse_vehicle_package, VehicleView, DEFAULT_MAX_ACCEPTED_SIZE};
pub use zone::{build_zone_package, parse_zone_package, ZoneInfo, ZoneView};
