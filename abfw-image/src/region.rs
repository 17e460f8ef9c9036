//! Region codec: one region's header, block-CRC table, and scrambled data.
//!
//! A region is a self-contained chunk appended after the boot header: a
//! 16-byte header stub, a table of per-block CRCs padded out to a 512-byte
//! boundary, then the (optionally scrambled) data itself. `build_region`
//! and `parse_region` are exact inverses of each other, byte for byte,
//! including the padding-CRC quirk described on [`fill_padding_crcs`].

use abfw_core::prelude::*;

const BLOCK_SIZE: usize = 512;
const REGION_HEADER_SIZE: usize = 16;

/// Result of building one region: its fully-assembled bytes (header,
/// block-CRC table, data), the CRC over the scrambled data area (the value
/// stored in the image's region-table entry), and whether it was
/// scrambled.
pub struct BuiltRegion {
    /// The region's bytes, starting at its header and ending at its
    /// (possibly padded) data.
    pub bytes: Vec<u8>,
    /// `crc16` of the scrambled data area, including any padding beyond the
    /// payload. Stored in the region-table entry.
    pub data_crc: u16,
    /// Whether the data blocks were scrambled (the region-table entry's
    /// `scrambled` byte).
    pub scrambled: bool,
}

/// Build one region's bytes.
///
/// `magic` is the 4-byte region signature (e.g. [`abfw_core::magic::SIGN_XCOD`]).
/// `payload` is the unpadded region data. `region_key` scrambles each
/// 512-byte block with `region_key ^ block_crc`; `None` leaves the data
/// unscrambled. `is_last` pads the region up to a 4 KiB boundary instead of
/// 512 bytes. `base_offset` is this region's absolute byte offset within
/// the whole image — needed to reproduce the padding-slot CRC values
/// exactly (see [`fill_padding_crcs`]).
pub fn build_region(
    magic: [u8; 4],
    payload: &[u8],
    region_key: Option<u32>,
    is_last: bool,
    base_offset: usize,
) -> BuiltRegion {
    let mut data = payload.to_vec();
    data.resize(data.len() + align_by(data.len(), BLOCK_SIZE), 0);
    let nblocks = data.len() / BLOCK_SIZE;

    let header_and_table_size = align_to(REGION_HEADER_SIZE + 2 * nblocks, BLOCK_SIZE);

    let mut region = vec![0u8; header_and_table_size];
    let data_off = region.len();
    region.extend_from_slice(&data);

    if is_last {
        let pad = align_by(base_offset + region.len(), 4096);
        region.resize(region.len() + pad, 0);
    }

    // Region header: magic, header+table size (relative data offset),
    // data size, header_only_size=16, then header CRC at byte 14.
    region[0..4].copy_from_slice(&magic);
    region[4..8].copy_from_slice(&(data_off as u32).to_le_bytes());
    region[8..12].copy_from_slice(&(data.len() as u32).to_le_bytes());
    region[12..14].copy_from_slice(&16u16.to_le_bytes());
    let header_crc = crc16(&region[0..14], CRC16_DEFAULT_INIT);
    region[14..16].copy_from_slice(&header_crc.to_le_bytes());

    fill_block_crcs(&mut region, base_offset, data_off, nblocks, &data);

    if let Some(key) = region_key {
        let mut off = data_off;
        let mut blki = 0usize;
        while off < region.len() {
            let crc = u16::from_le_bytes([region[16 + blki * 2], region[17 + blki * 2]]);
            cipher_in(&mut region, off, BLOCK_SIZE, key ^ crc as u32);
            off += BLOCK_SIZE;
            blki += 1;
        }
    }

    let data_crc = crc16(&region[data_off..], CRC16_DEFAULT_INIT);

    BuiltRegion {
        bytes: region,
        data_crc,
        scrambled: region_key.is_some(),
    }
}

/// Fill the block-CRC table between the region header and the data.
///
/// Each real block gets `crc16(block, init=block_index+1)`. Any leftover
/// slots beyond `nblocks` — created because `header_and_table_size` is
/// rounded up to a 512-byte boundary — are filled with a value that has no
/// integrity meaning: `crc16(region_bytes_so_far, init=slot_byte_offset)`,
/// where `slot_byte_offset` is the slot's **absolute offset in the whole
/// image** (`base_offset + slot_offset_within_region`). This is not
/// recoverable from the slot's own contents; it only exists to make output
/// byte-identical to the reference tool, which does the same thing for the
/// same reason.
fn fill_block_crcs(region: &mut [u8], base_offset: usize, data_off: usize, nblocks: usize, data: &[u8]) {
    let mut coff = REGION_HEADER_SIZE;
    let mut blki = 0usize;
    while coff < data_off {
        let rboff = blki * BLOCK_SIZE;
        let crc = if rboff < data.len() {
            crc16(&data[rboff..rboff + BLOCK_SIZE], (blki + 1) as u16)
        } else {
            crc16(&region[0..coff], (base_offset + coff) as u16)
        };
        region[coff..coff + 2].copy_from_slice(&crc.to_le_bytes());
        coff += 2;
        blki += 1;
    }
    debug_assert_eq!(blki, (data_off - REGION_HEADER_SIZE) / 2);
    let _ = nblocks;
}

/// A parsed region: its type tag, the descrambled payload (trimmed to the
/// declared data size), and the set of block/region CRC mismatches found
/// while descrambling (empty on a clean parse).
pub struct ParsedRegion {
    /// The region's ASCII type tag (high bit of every magic byte masked off).
    pub tag: String,
    /// The region payload, trimmed to the size recorded in the region
    /// header (padding bytes past that are not included).
    pub payload: Vec<u8>,
    /// Errors encountered while validating this region; the caller decides
    /// whether any of them are fatal (e.g. `XCOD` CRC failures usually are).
    pub errors: Vec<Error>,
}

/// Parse one region out of `image`, starting at `offset`, ending the data
/// area at either a 512-byte or (if `is_last`) 4 KiB boundary. `key` is the
/// region's descrambling key (region-table key XORed with the per-block
/// CRC, same derivation as build); `None` means the region's data blocks
/// were never scrambled in the first place (the region-table entry's
/// `scrambled` byte was zero) and must be left untouched. Mutates `image`
/// in place (descrambles the region's data blocks when `key` is `Some`).
pub fn parse_region(image: &mut [u8], offset: usize, key: Option<u32>, is_last: bool) -> Result<ParsedRegion> {
    let header_crc = u16::from_le_bytes([image[offset + 14], image[offset + 15]]);
    let computed = crc16(&image[offset..offset + 14], CRC16_DEFAULT_INIT);
    let mut errors = Vec::new();
    if computed != header_crc {
        errors.push(Error::crc_mismatch(
            CrcDomain::RegionHeader {
                tag: String::new(),
            },
            header_crc,
            computed,
        ));
    }

    let magic = [image[offset], image[offset + 1], image[offset + 2], image[offset + 3]];
    let tag: String = magic.iter().map(|&b| (b & 0x7F) as char).collect();
    let header_size = u32::from_le_bytes([
        image[offset + 4],
        image[offset + 5],
        image[offset + 6],
        image[offset + 7],
    ]) as usize;
    let data_size = u32::from_le_bytes([
        image[offset + 8],
        image[offset + 9],
        image[offset + 10],
        image[offset + 11],
    ]) as usize;

    let data_off = offset + header_size;
    let align = if is_last { 4096 } else { BLOCK_SIZE };
    // `data_off` is an absolute image offset; the boundary is the next
    // aligned *absolute* position, not `data_off` plus an independently
    // rounded data length — those differ whenever `data_off` itself isn't
    // a multiple of `align` (always true for the 4 KiB case unless this
    // is the image's first and only region).
    let data_end = align_to(data_off + data_size, align);

    let mut blki = 0usize;
    let mut off = data_off;
    while off < data_end {
        let crc = u16::from_le_bytes([image[offset + 16 + blki * 2], image[offset + 17 + blki * 2]]);
        if let Some(key) = key {
            cipher_in(image, off, BLOCK_SIZE, key ^ crc as u32);
        }

        let reloff = off - data_off;
        if reloff < data_size {
            let computed = crc16(&image[off..off + BLOCK_SIZE], (blki + 1) as u16);
            if computed != crc {
                errors.push(Error::crc_mismatch(
                    CrcDomain::Block {
                        tag: tag.clone(),
                        index: blki,
                    },
                    crc,
                    computed,
                ));
            }
        }

        off += BLOCK_SIZE;
        blki += 1;
    }

    let payload = image[data_off..data_off + data_size].to_vec();
    Ok(ParsedRegion { tag, payload, errors })
}
