//! Codec for the Bluetrum audio-SoC bootloader flash image format: a
//! scrambled boot header and region table, followed by one or more
//! CRC-stamped, LFSR-scrambled data regions.
//!
//! This crate only touches byte buffers; file and directory handling lives
//! in the `abfw-cli` binaries that call into it.

pub mod header;
pub mod image;
pub mod region;
pub mod resource;

pub use header::BootHeaderInfo;
pub use image::{pack_image, unpack_image, UnpackedImage};
pub use region::{build_region, parse_region, BuiltRegion, ParsedRegion};
pub use resource::{build_resource_blob, parse_resource_blob, ResourceEntry};
