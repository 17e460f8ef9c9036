//! Header maker: build a `header.bin` file (or, with `--bootable`, a
//! minimal bootable image) from a raw boot-code binary.

use abfw_core::align::align_to;
use abfw_core::crc::{crc16, CRC16_DEFAULT_INIT};
use abfw_core::lfsr::cipher_in;
use abfw_core::magic::{LVMG, XFIL};
use abfw_image::header::{scramble_boot_code, BOOT_CRC_OFFSET, HEADER_CRC_OFFSET, HEADER_CRC_SPAN, HEADER_SCRAMBLE_SIZE};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

const BLOCKSIZE: usize = 512;

/// Generate the header.bin file or a minimal bootable image.
#[derive(Parser)]
#[command(name = "mkheader", author, version, about)]
struct Cli {
    /// Generate a minimal bootable image instead of a header.bin file
    #[arg(short, long)]
    bootable: bool,

    /// Load address
    #[arg(long = "load-addr", value_parser = parse_int, default_value = "0x10800")]
    load_addr: u32,

    /// Entry point address; defaults to the load address
    #[arg(long = "entry-addr", value_parser = parse_int)]
    entry_addr: Option<u32>,

    /// Offset where the code is placed in the image
    #[arg(long, value_parser = parse_int, default_value = "0x400")]
    offset: u32,

    /// Flag bits: bit0 = init clock system, bit1 = disable CRC checks, bit3 = do not scramble data
    #[arg(long, value_parser = parse_int, default_value = "0x0001")]
    flags: u32,

    /// Chip ID, 8 hex bytes, e.g. "5052414F01000000"
    #[arg(long, required = true, value_parser = parse_chipid)]
    chipid: [u8; 8],

    /// Input file
    input: PathBuf,

    /// Output file
    output: PathBuf,
}

fn parse_int(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse::<u32>().map_err(|e| e.to_string())
    }
}

fn parse_chipid(s: &str) -> Result<[u8; 8], String> {
    let bytes = hex::decode(s)?;
    bytes.try_into().map_err(|v: Vec<u8>| format!("expected 8 bytes, got {}", v.len()))
}

/// Minimal hex decoder (no extra dependency for an 8-byte chip id string).
mod hex {
    pub fn decode(s: &str) -> Result<Vec<u8>, String> {
        if s.len() % 2 != 0 {
            return Err("hex string must have an even length".into());
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
            .collect()
    }
}

fn run(cli: Cli) -> std::io::Result<()> {
    let entry_addr = cli.entry_addr.unwrap_or(cli.load_addr);

    let mut code_offset = cli.offset as usize;
    if code_offset < BLOCKSIZE {
        println!("Warning: the specified code offset is below a {BLOCKSIZE}-byte mark. Adjusting.");
        code_offset = BLOCKSIZE;
    } else if code_offset % BLOCKSIZE != 0 {
        println!("Warning: the specified code offset is not a multiple of {BLOCKSIZE}. Rounding up.");
        code_offset = align_to(code_offset, BLOCKSIZE);
    }

    let scramble_data = cli.flags & 0x0008 == 0;
    let enable_checksums = cli.flags & 0x0002 == 0;

    let mut code = std::fs::read(&cli.input)?;
    let code_end = align_to(code_offset + code.len(), 0x1000);
    code.resize(code_end - code_offset, 0);

    let mut code_crc = crc16(&code, CRC16_DEFAULT_INIT);
    println!("Code offset: ${code_offset:04X}, size: {} bytes, CRC: ${code_crc:04X}", code.len());

    let flags = (cli.flags & 0xFFFF) as u16;
    let mut hmagic = [0x5Au8, (flags & 0xFF) as u8, (flags >> 8) as u8, 0];
    let sum: u32 = hmagic.iter().map(|&b| b as u32).sum();
    hmagic[3] = ((256 - (sum % 256)) % 256) as u8;

    let mut contents = vec![0u8; code_offset];
    contents.extend_from_slice(&code);
    contents[0..4].copy_from_slice(&hmagic);
    contents[4..12].copy_from_slice(&cli.chipid);
    contents[12..16].copy_from_slice(&cli.load_addr.to_le_bytes());
    contents[16..20].copy_from_slice(&entry_addr.to_le_bytes());
    contents[20..24].copy_from_slice(&(code_offset as u32).to_le_bytes());
    contents[24..28].copy_from_slice(&(code.len() as u32).to_le_bytes());

    if cli.bootable {
        if !scramble_data {
            cipher_in(&mut contents, 0, 4, LVMG);
        }

        if enable_checksums {
            contents[BOOT_CRC_OFFSET..BOOT_CRC_OFFSET + 2].copy_from_slice(&code_crc.to_le_bytes());
            let header_crc = crc16(&contents[..HEADER_CRC_SPAN], CRC16_DEFAULT_INIT);
            contents[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 2].copy_from_slice(&header_crc.to_le_bytes());
        } else if scramble_data {
            println!("Asked to scramble the data while not requiring the CRCs to be populated - blanking the boot code CRC");
            code_crc = 0;
        }

        if scramble_data {
            cipher_in(&mut contents, 0, HEADER_SCRAMBLE_SIZE, LVMG);
            scramble_boot_code(&mut contents, code_offset, code.len(), code_crc);
        }
    } else {
        cipher_in(&mut contents, 0, contents.len(), XFIL);
    }

    std::fs::write(&cli.output, &contents)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
