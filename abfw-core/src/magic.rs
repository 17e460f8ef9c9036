//! Magic numbers used across the image format and wire protocol.
//!
//! The "key" constants are little-endian `u32`s that happen to spell an
//! ASCII mnemonic when written out byte-by-byte (`XFIL`, `LVMG`, `XAPP`,
//! ...). The region "signatures" are the reverse trick: an ASCII tag with
//! the most-significant bit of every byte set, so that a region header can
//! never be confused with printable text or with a region key.

/// Used to scramble `header.bin` files on disk (not the in-image header,
/// which is scrambled with [`LVMG`]).
pub const XFIL: u32 = 0x4C49_4658;
/// Used for the `dll`-style auxiliary files.
pub const DLL: u32 = 0x4850_2018;
/// Used for the in-image firmware header and boot code.
pub const LVMG: u32 = 0x474D_564C;
/// Used for the `XCOD` region and the region table.
pub const XAPP: u32 = 0x5050_4158;
/// Unused by any operation this toolkit implements; preserved for byte
/// positions only (see spec Non-goals: unknown/undocumented constants are
/// reproduced, not interpreted).
pub const UBIN: u32 = 0xCEC9_C2D5;
/// Unused by any operation this toolkit implements; preserved for byte
/// positions only.
pub const SEGK: u32 = 0x6B67_6573;

/// `ENTR` with the high bit of every byte set: the resource blob's header
/// signature.
pub const SIGN_ENTR: [u8; 4] = [0xC5, 0xCE, 0xD4, 0xD2];
/// `DOWN` with the high bit of every byte set.
pub const SIGN_DOWN: [u8; 4] = [0xC4, 0xCF, 0xD7, 0xCE];
/// `XCOD` with the high bit of every byte set: the code region's signature.
pub const SIGN_XCOD: [u8; 4] = [0xD8, 0xC3, 0xCF, 0xC4];
/// `XRES` with the high bit of every byte set: the resource region's
/// signature.
pub const SIGN_XRES: [u8; 4] = [0xD8, 0xD2, 0xC5, 0xD3];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_ascii_with_high_bit_set() {
        for (sig, ascii) in [
            (SIGN_ENTR, b"ENTR"),
            (SIGN_DOWN, b"DOWN"),
            (SIGN_XCOD, b"XCOD"),
            (SIGN_XRES, b"XRES"),
        ] {
            for i in 0..4 {
                assert_eq!(sig[i], ascii[i] | 0x80);
            }
        }
    }
}
