//! Whole-image codec: boot header, region table, and the regions appended
//! after it.

use crate::header::{
    scramble_boot_code, BootHeaderInfo, BOOT_CRC_OFFSET, HEADER_CRC_OFFSET, HEADER_CRC_SPAN,
    HEADER_SCRAMBLE_SIZE,
};
use crate::region::{build_region, parse_region};
use abfw_core::magic::{LVMG as MAGIC_LVMG, SIGN_XCOD, SIGN_XRES, XAPP, XFIL};
use abfw_core::prelude::*;

const REGION_TABLE_OFFSET: usize = 0x40;
const REGION_TABLE_SIZE: usize = 0x40;
const REGION_TABLE_CRC_OFFSET: usize = 0x80;
const REGION_TABLE_ENTRY_SIZE: usize = 0x10;
const BOOT_ALIGN: usize = 0x2000;

/// A single region-table entry, decoded from its 16 raw bytes.
struct RegionTableEntry {
    offset: u32,
    size: u32,
    data_crc: u16,
    index: u8,
    scrambled: u8,
}

impl RegionTableEntry {
    fn read(buf: &[u8]) -> Self {
        Self {
            offset: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_crc: u16::from_le_bytes([buf[12], buf[13]]),
            index: buf[14],
            scrambled: buf[15],
        }
    }
}

/// Pack a `header.bin`, `app.bin`, and optional `res.bin` into a complete,
/// scrambled flash image.
///
/// `header_bin` is read as it comes from disk (scrambled with
/// [`abfw_core::magic::XFIL`]). `code_key` scrambles the code region;
/// derive it from a user key with [`abfw_core::keys::calc_user_key`], or
/// pass `0` for no scrambling beyond the generic XAPP mixing. `scramble_res`
/// controls whether the resource region (if present) gets its data blocks
/// scrambled at all (it is never scrambled with a secret key — only with
/// `0 ^ block_crc`, or not at all).
pub fn pack_image(
    header_bin: &[u8],
    app_bin: &[u8],
    res_bin: Option<&[u8]>,
    code_key: u32,
    scramble_res: bool,
) -> Result<Vec<u8>> {
    let header = cipher(header_bin, XFIL);
    if header.len() < 16 {
        return Err(Error::header_invalid("header.bin shorter than boot header prefix"));
    }

    let info = BootHeaderInfo::parse(&header)?;
    let boot_offset = u32::from_le_bytes([header[20], header[21], header[22], header[23]]) as usize;
    let boot_size = u32::from_le_bytes([header[24], header[25], header[26], header[27]]) as usize;

    if boot_offset > header.len() || boot_offset + boot_size > header.len() {
        return Err(Error::header_invalid(
            "boot code range extends past header.bin's length",
        ));
    }

    let boot_crc = crc16(&header[boot_offset..boot_offset + boot_size], CRC16_DEFAULT_INIT);

    let mut contents = header.clone();
    let pad = align_by(contents.len(), BOOT_ALIGN);
    contents.resize(contents.len() + pad, 0xFF);

    if !info.scramble() {
        cipher_in(&mut contents, 0, 4, MAGIC_LVMG);
    }

    contents[BOOT_CRC_OFFSET..BOOT_CRC_OFFSET + 2].copy_from_slice(&boot_crc.to_le_bytes());
    let header_crc = crc16(&contents[..HEADER_CRC_SPAN], CRC16_DEFAULT_INIT);
    contents[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 2].copy_from_slice(&header_crc.to_le_bytes());

    if info.scramble() {
        cipher_in(&mut contents, 0, HEADER_SCRAMBLE_SIZE, MAGIC_LVMG);
        scramble_boot_code(&mut contents, boot_offset, boot_size, boot_crc);
    }

    let mut regions: Vec<([u8; 4], &[u8], Option<u32>)> = Vec::new();
    let code_region_key = code_key ^ (0x0001_0001u32.wrapping_mul(boot_crc as u32)) ^ XAPP;
    regions.push((SIGN_XCOD, app_bin, Some(code_region_key)));
    if let Some(res) = res_bin {
        regions.push((SIGN_XRES, res, if scramble_res { Some(0) } else { None }));
    }

    let region_count = regions.len();
    for (i, (magic, payload, key)) in regions.into_iter().enumerate() {
        let is_last = i + 1 == region_count;
        let region_offset = contents.len();
        let built = build_region(magic, payload, key, is_last, region_offset);

        contents.extend_from_slice(&built.bytes);

        let entry_off = REGION_TABLE_OFFSET + REGION_TABLE_ENTRY_SIZE * i;
        contents[entry_off..entry_off + 4].copy_from_slice(&(region_offset as u32).to_le_bytes());
        let padded_len = align_to(payload.len(), 512);
        contents[entry_off + 4..entry_off + 8].copy_from_slice(&(padded_len as u32).to_le_bytes());
        contents[entry_off + 8..entry_off + 12].copy_from_slice(&0u32.to_le_bytes());
        contents[entry_off + 12..entry_off + 14].copy_from_slice(&built.data_crc.to_le_bytes());
        contents[entry_off + 14] = i as u8;
        contents[entry_off + 15] = built.scrambled as u8;
    }

    let rtcrc = crc16(
        &contents[REGION_TABLE_OFFSET..REGION_TABLE_OFFSET + REGION_TABLE_SIZE],
        CRC16_DEFAULT_INIT,
    );
    contents[REGION_TABLE_CRC_OFFSET..REGION_TABLE_CRC_OFFSET + 2].copy_from_slice(&rtcrc.to_le_bytes());
    cipher_in(
        &mut contents,
        REGION_TABLE_OFFSET,
        REGION_TABLE_SIZE,
        XAPP ^ (0x0001_0001u32.wrapping_mul(rtcrc as u32)),
    );

    Ok(contents)
}

/// The pieces recovered by [`unpack_image`].
pub struct UnpackedImage {
    /// Decoded boot header fields.
    pub info: BootHeaderInfo,
    /// The boot code, descrambled, exactly as it appeared in `header.bin`.
    pub boot_code: Vec<u8>,
    /// A reconstructed `header.bin`, re-scrambled with
    /// [`abfw_core::magic::XFIL`], ready to feed back into [`pack_image`].
    pub header_bin: Vec<u8>,
    /// The `XCOD` region's payload (the application binary).
    pub app_bin: Vec<u8>,
    /// The `XRES` region's payload, if a resource region was present.
    pub res_bin: Option<Vec<u8>>,
    /// Any other regions found, keyed by their ASCII type tag.
    pub other_regions: Vec<(String, Vec<u8>)>,
    /// The fully descrambled image, suitable for a `decrypted.bin` dump.
    pub decrypted: Vec<u8>,
    /// Non-fatal CRC mismatches encountered while unpacking. If any of
    /// these concerns the `XCOD` region, unpacking stopped at that region
    /// and `app_bin` will be empty.
    pub warnings: Vec<Error>,
}

/// Unpack a flash image, descrambling and validating every region.
/// Mismatched checksums are reported in [`UnpackedImage::warnings`] rather
/// than aborting, except that a failed `XCOD` region check stops region
/// iteration (further regions are not parsed).
pub fn unpack_image(image: &[u8], user_key: u32) -> Result<UnpackedImage> {
    let mut data = image.to_vec();
    let mut warnings = Vec::new();

    cipher_in(&mut data, 0, HEADER_SCRAMBLE_SIZE, MAGIC_LVMG);

    let header_crc = u16::from_le_bytes([data[HEADER_CRC_OFFSET], data[HEADER_CRC_OFFSET + 1]]);
    let computed = crc16(&data[..HEADER_CRC_SPAN], CRC16_DEFAULT_INIT);
    if computed != header_crc {
        warnings.push(Error::crc_mismatch(CrcDomain::BootHeader, header_crc, computed));
    }

    let mut info = BootHeaderInfo::parse(&data)?;
    let boot_entry = u32::from_le_bytes([data[16], data[17], data[18], data[19]]);
    let boot_offset = u32::from_le_bytes([data[20], data[21], data[22], data[23]]) as usize;
    let boot_size = u32::from_le_bytes([data[24], data[25], data[26], data[27]]) as usize;
    let boot_crc = u16::from_le_bytes([data[BOOT_CRC_OFFSET], data[BOOT_CRC_OFFSET + 1]]);
    info.entry_addr = boot_entry;
    info.boot_offset = boot_offset as u32;
    info.boot_size = boot_size as u32;

    scramble_boot_code(&mut data, boot_offset, boot_size, boot_crc);
    let boot_code = data[boot_offset..boot_offset + boot_size].to_vec();

    let computed_boot_crc = crc16(&boot_code, CRC16_DEFAULT_INIT);
    if computed_boot_crc != boot_crc {
        warnings.push(Error::crc_mismatch(CrcDomain::BootCode, boot_crc, computed_boot_crc));
    }

    let mut header_bin = vec![0u8; boot_offset];
    header_bin.extend_from_slice(&boot_code);
    header_bin[0..4].copy_from_slice(&info.magic);
    header_bin[4..12].copy_from_slice(&info.chip_id);
    header_bin[12..16].copy_from_slice(&info.load_addr.to_le_bytes());
    header_bin[16..20].copy_from_slice(&boot_entry.to_le_bytes());
    header_bin[20..24].copy_from_slice(&(boot_offset as u32).to_le_bytes());
    header_bin[24..28].copy_from_slice(&(boot_size as u32).to_le_bytes());
    let header_bin = cipher(&header_bin, XFIL);

    let rtcrc = u16::from_le_bytes([data[REGION_TABLE_CRC_OFFSET], data[REGION_TABLE_CRC_OFFSET + 1]]);
    cipher_in(
        &mut data,
        REGION_TABLE_OFFSET,
        REGION_TABLE_SIZE,
        XAPP ^ (0x0001_0001u32.wrapping_mul(rtcrc as u32)),
    );
    let computed_rtcrc = crc16(
        &data[REGION_TABLE_OFFSET..REGION_TABLE_OFFSET + REGION_TABLE_SIZE],
        CRC16_DEFAULT_INIT,
    );
    if computed_rtcrc != rtcrc {
        warnings.push(Error::crc_mismatch(CrcDomain::RegionTable, rtcrc, computed_rtcrc));
    }

    // The region table reserves four 16-byte slots (0x40..0x80), but this
    // format only ever populates the first two (XCOD and, optionally,
    // XRES); the reference unpacker only ever reads those two slots back.
    let entries: Vec<RegionTableEntry> = (0..2)
        .map(|i| {
            let off = REGION_TABLE_OFFSET + REGION_TABLE_ENTRY_SIZE * i;
            RegionTableEntry::read(&data[off..off + REGION_TABLE_ENTRY_SIZE])
        })
        .collect();

    let mut app_bin = Vec::new();
    let mut res_bin = None;
    let mut other_regions = Vec::new();

    for (ri, entry) in entries.iter().enumerate() {
        if entry.offset == 0 && entry.size == 0 && ri > 0 {
            continue;
        }

        let key = if entry.index == 0 {
            Some(XAPP ^ (0x0001_0001u32.wrapping_mul(boot_crc as u32)) ^ user_key)
        } else if entry.scrambled != 0 {
            Some(0)
        } else {
            None
        };

        let is_last = ri + 1 == entries.len() || entries.get(ri + 1).map(|e| e.offset == 0 && e.size == 0).unwrap_or(true);

        let parsed = match parse_region(&mut data, entry.offset as usize, key, is_last) {
            Ok(p) => p,
            Err(e) => {
                warnings.push(e);
                continue;
            }
        };

        warnings.extend(parsed.errors);

        let region_start = entry.offset as usize;
        let align = if is_last { 4096 } else { 512 };
        let header_size = u32::from_le_bytes([
            data[region_start + 4],
            data[region_start + 5],
            data[region_start + 6],
            data[region_start + 7],
        ]) as usize;
        let data_off = region_start + header_size;
        let data_end = align_to(data_off + parsed.payload.len(), align);
        let region_data_crc = crc16(&data[data_off..data_end], CRC16_DEFAULT_INIT);

        if region_data_crc != entry.data_crc {
            let domain = CrcDomain::RegionData {
                tag: parsed.tag.clone(),
            };
            warnings.push(Error::crc_mismatch(domain, entry.data_crc, region_data_crc));
            if parsed.tag == "XCOD" {
                break;
            }
            continue;
        }

        match parsed.tag.as_str() {
            "XCOD" => app_bin = parsed.payload,
            "XRES" => res_bin = Some(parsed.payload),
            other => other_regions.push((other.to_string(), parsed.payload)),
        }
    }

    Ok(UnpackedImage {
        info,
        boot_code,
        header_bin,
        app_bin,
        res_bin,
        other_regions,
        decrypted: data,
        warnings,
    })
}
