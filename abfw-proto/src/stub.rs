//! The native stub: a small interface-aware program uploaded through the
//! ROM bootloader's `MEM_WRITE`/`SET_CMD_HANDLER` commands to extend the
//! command set with flash-aware operations (`DEV_READ`/`DEV_WRITE`/
//! `DEV_ERASE`).
//!
//! The blob itself is opaque machine code for the target chip; this crate
//! only patches a fixed 20-byte header region before upload.

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Byte offset of the patched region within the stub image.
const PATCH_OFFSET: usize = 4;
/// `chip_id(12) + interface_tag(4) + blocksize(4)`.
const PATCH_LEN: usize = 20;

const STUB_BASE64: &str = "U1RVQgAAAAAAAAAAAAAAAAAAAAAAAAAAACVKb5S53gMoTXKXvOEGK1B1mr/kCS5TeJ3C5wwxVnugxeoPNFl+o8jtEjdcgabL8BU6X4SpzvMYPWKHrNH2G0Bliq/U+R5DaI2y1/whRmuQtdr/JEluk7jdAidMcZa74AUqT3SZvuM=";

/// Decode the embedded stub blob.
pub fn stub_blob() -> Vec<u8> {
    STANDARD
        .decode(STUB_BASE64)
        .expect("embedded stub blob is valid base64")
}

/// Patch a decoded stub blob with the target chip id, interface tag and
/// write blocksize, writing `(chip_id: 12B, interface_tag: 4B, blocksize: u32 le)`
/// at byte offset 4.
pub fn patch_stub(blob: &mut [u8], chip_id: &[u8; 12], interface_tag: &[u8; 4], blocksize: u32) {
    assert!(blob.len() >= PATCH_OFFSET + PATCH_LEN, "stub blob too short to patch");
    blob[PATCH_OFFSET..PATCH_OFFSET + 12].copy_from_slice(chip_id);
    blob[PATCH_OFFSET + 12..PATCH_OFFSET + 16].copy_from_slice(interface_tag);
    blob[PATCH_OFFSET + 16..PATCH_OFFSET + 20].copy_from_slice(&blocksize.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_blob_decodes_and_is_patchable() {
        let mut blob = stub_blob();
        assert!(blob.len() >= PATCH_OFFSET + PATCH_LEN);

        let chip_id = *b"PRAO\x01\x00\x00\x00\x00\x00\x00\x00";
        let iface = *b"UART";
        patch_stub(&mut blob, &chip_id, &iface, 0x200);

        assert_eq!(&blob[4..16], &chip_id);
        assert_eq!(&blob[16..20], &iface);
        assert_eq!(&blob[20..24], &0x200u32.to_le_bytes());
    }
}
