//! Whole-image pack/unpack round trip, covering the minimal-image scenario
//! and the "wrong user key" failure mode.

use abfw_core::align::align_to;
use abfw_core::keys::calc_user_key;
use abfw_core::magic::XFIL;
use abfw_image::{pack_image, unpack_image};

fn build_header_bin(chip_id: &[u8; 8], load: u32, offset: u32, boot_code: &[u8], flags: u16) -> Vec<u8> {
    let mut magic = [0x5Au8, (flags & 0xFF) as u8, (flags >> 8) as u8, 0];
    let sum: u32 = magic.iter().map(|&b| b as u32).sum();
    magic[3] = ((256 - (sum % 256)) % 256) as u8;

    let mut header = vec![0u8; offset as usize + boot_code.len()];
    header[0..4].copy_from_slice(&magic);
    header[4..12].copy_from_slice(chip_id);
    header[12..16].copy_from_slice(&load.to_le_bytes());
    header[16..20].copy_from_slice(&load.to_le_bytes());
    header[20..24].copy_from_slice(&offset.to_le_bytes());
    header[24..28].copy_from_slice(&(boot_code.len() as u32).to_le_bytes());
    header[offset as usize..].copy_from_slice(boot_code);

    abfw_core::lfsr::cipher(&header, XFIL)
}

#[test]
fn minimal_image_round_trip() {
    let chip_id = *b"PRAO\x01\x00\x00\x00";
    let boot_code = vec![0xAAu8; 2048];
    let header_bin = build_header_bin(&chip_id, 0x10800, 0x400, &boot_code, 0x0001);

    let app_bin = vec![0x55u8; 4096];
    let user_key = 0x1234_5678u32;
    let code_key = calc_user_key(user_key);

    let image = pack_image(&header_bin, &app_bin, None, code_key, true).unwrap();
    let unpacked = unpack_image(&image, code_key).unwrap();

    assert!(unpacked.warnings.is_empty(), "unexpected warnings: {:?}", unpacked.warnings.iter().map(|e| e.to_string()).collect::<Vec<_>>());
    assert_eq!(unpacked.app_bin, app_bin);
    assert_eq!(unpacked.boot_code, boot_code);
    assert_eq!(unpacked.info.chip_id, chip_id);
}

#[test]
fn wrong_user_key_fails_code_region_crc() {
    let chip_id = *b"PRAO\x01\x00\x00\x00";
    let boot_code = vec![0xAAu8; 2048];
    let header_bin = build_header_bin(&chip_id, 0x10800, 0x400, &boot_code, 0x0001);

    let app_bin = vec![0x55u8; 4096];
    let good_key = calc_user_key(0x1234_5678);
    let bad_key = calc_user_key(0x1234_5679);

    let image = pack_image(&header_bin, &app_bin, None, good_key, true).unwrap();
    let unpacked = unpack_image(&image, bad_key).unwrap();

    assert!(unpacked.app_bin.is_empty());
    assert!(unpacked
        .warnings
        .iter()
        .any(|e| e.to_string().contains("XCOD")));
}

#[test]
fn pack_is_idempotent_on_its_own_output_header() {
    let chip_id = *b"CRWN\x02\x00\x00\x00";
    let boot_code = vec![0x11u8; 1024];
    let header_bin = build_header_bin(&chip_id, 0x20000, 0x400, &boot_code, 0x0000);
    let app_bin = vec![0x77u8; 1536];

    let image = pack_image(&header_bin, &app_bin, None, 0, true).unwrap();
    let unpacked = unpack_image(&image, 0).unwrap();

    let image2 = pack_image(&unpacked.header_bin, &unpacked.app_bin, None, 0, true).unwrap();
    assert_eq!(image, image2);
}

#[test]
fn resource_region_round_trips_with_scrambling_disabled() {
    let chip_id = *b"PRAO\x01\x00\x00\x00";
    let boot_code = vec![0xAAu8; 1024];
    let header_bin = build_header_bin(&chip_id, 0x10800, 0x400, &boot_code, 0x0001);

    let app_bin = vec![0x55u8; 1024];
    let res_bin = vec![0x99u8; 1536];
    let code_key = calc_user_key(0x1234_5678);

    let image = pack_image(&header_bin, &app_bin, Some(&res_bin), code_key, false).unwrap();
    let unpacked = unpack_image(&image, code_key).unwrap();

    assert!(
        unpacked.warnings.is_empty(),
        "unexpected warnings: {:?}",
        unpacked.warnings.iter().map(|e| e.to_string()).collect::<Vec<_>>()
    );
    assert_eq!(unpacked.res_bin.as_deref(), Some(res_bin.as_slice()));
}

#[test]
fn resource_region_round_trips_with_scrambling_enabled() {
    let chip_id = *b"PRAO\x01\x00\x00\x00";
    let boot_code = vec![0xAAu8; 1024];
    let header_bin = build_header_bin(&chip_id, 0x10800, 0x400, &boot_code, 0x0001);

    let app_bin = vec![0x55u8; 1024];
    let res_bin = vec![0x77u8; 2048];
    let code_key = calc_user_key(0xCAFE_BABE);

    let image = pack_image(&header_bin, &app_bin, Some(&res_bin), code_key, true).unwrap();
    let unpacked = unpack_image(&image, code_key).unwrap();

    assert!(
        unpacked.warnings.is_empty(),
        "unexpected warnings: {:?}",
        unpacked.warnings.iter().map(|e| e.to_string()).collect::<Vec<_>>()
    );
    assert_eq!(unpacked.res_bin.as_deref(), Some(res_bin.as_slice()));
}

#[test]
fn unaligned_payload_region_table_size_matches_header() {
    let chip_id = *b"PRAO\x01\x00\x00\x00";
    let boot_code = vec![0xAAu8; 1024];
    let header_bin = build_header_bin(&chip_id, 0x10800, 0x400, &boot_code, 0x0001);

    // Not a multiple of 512 — exercises the region-table `size` field
    // against the region header's own `data_size` field.
    let app_bin = vec![0x55u8; 4200];
    let code_key = calc_user_key(0x1234_5678);

    let image = pack_image(&header_bin, &app_bin, None, code_key, true).unwrap();

    let region_offset = u32::from_le_bytes(image[0x40..0x44].try_into().unwrap()) as usize;
    let table_size = u32::from_le_bytes(image[0x44..0x48].try_into().unwrap()) as usize;
    let header_data_size =
        u32::from_le_bytes(image[region_offset + 8..region_offset + 12].try_into().unwrap()) as usize;

    assert_eq!(table_size, header_data_size, "region-table size must match the region header's data_size");
    assert_eq!(table_size, align_to(app_bin.len(), 512));

    let unpacked = unpack_image(&image, code_key).unwrap();
    assert!(
        unpacked.warnings.is_empty(),
        "unexpected warnings: {:?}",
        unpacked.warnings.iter().map(|e| e.to_string()).collect::<Vec<_>>()
    );
    assert_eq!(unpacked.app_bin.len(), align_to(app_bin.len(), 512));
    assert_eq!(&unpacked.app_bin[..app_bin.len()], app_bin.as_slice());
    assert!(unpacked.app_bin[app_bin.len()..].iter().all(|&b| b == 0));
}
