//! Core primitives shared by the Bluetrum firmware image codec and the
//! serial download protocol: checksums, the stream cipher, key derivation,
//! magic constants, alignment helpers, and the toolkit-wide error type.
//!
//! Nothing in this crate touches a file or a serial port; it is the small
//! byte-level vocabulary that `abfw-image` and `abfw-proto` are both built
//! out of.

pub mod align;
pub mod crc;
pub mod error;
pub mod keys;
pub mod lfsr;
pub mod magic;

pub use error::{CrcDomain, Error, Result};

/// Re-exports the pieces most callers reach for, so downstream crates can
/// write `use abfw_core::prelude::*;` instead of naming each module.
pub mod prelude {
    pub use crate::align::{align_by, align_to};
    pub use crate::crc::{crc16, crc32, CRC16_DEFAULT_INIT, CRC32_DEFAULT_INIT};
    pub use crate::error::{CrcDomain, Error, Result};
    pub use crate::keys::{calc_key, calc_key_default, calc_user_key};
    pub use crate::lfsr::{cipher, cipher_in};
}
