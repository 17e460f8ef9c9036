//! Firmware unpacker: split a flash image back into its boot code, header,
//! application binary, resources, and any unrecognised regions.

use abfw_core::keys::calc_user_key;
use abfw_image::{parse_resource_blob, unpack_image};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const ORDER_FILE_HEADER: &str = "\
// NOTICE: You should not modify the order of the resource files below in any way.
// The firmware refers to each resource by the means of hardcoded offsets to the
// address and size fields of the entries themselve, meaning that if you change
// the order of the items (or insert something in between), you'll most likely just break it.
// This file solely exists to not alter the order of the entries in case the filesystem where
// these entries are being extracted to alters the order even further.
// Also, the entries that are zero bytes in length are also listed there,
// instead of being extracted like any other file.

";

/// Unpack a Bluetrum flash/firmware image.
#[derive(Parser)]
#[command(name = "fwunpack", author, version, about)]
struct Cli {
    /// Firmware file(s) to parse
    #[arg(required = true)]
    file: Vec<PathBuf>,

    /// User key used to encrypt the main application blob
    #[arg(short = 'u', long, value_parser = parse_int)]
    userkey: Option<u32>,
}

fn parse_int(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse::<u32>().map_err(|e| e.to_string())
    }
}

fn unpack_one(path: &Path, user_key: u32) -> std::io::Result<()> {
    println!("\n#\n# {}\n#\n", path.display());

    let data = std::fs::read(path)?;
    if data.len() >= 4 && &data[0..4] == b"DCF\0" {
        eprintln!("[!] DCF container parsing is not implemented");
        return Ok(());
    }

    let unpacked = match unpack_image(&data, user_key) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("[!] {e}");
            return Ok(());
        }
    };

    for warning in &unpacked.warnings {
        println!("[!] {warning}");
    }

    let mut outdir = path.as_os_str().to_owned();
    outdir.push("_unpack");
    let outdir = PathBuf::from(outdir);
    std::fs::create_dir_all(&outdir)?;

    std::fs::write(outdir.join("boot-code.bin"), &unpacked.boot_code)?;
    std::fs::write(outdir.join("header.bin"), &unpacked.header_bin)?;
    std::fs::write(outdir.join("app.bin"), &unpacked.app_bin)?;
    std::fs::write(outdir.join("decrypted.bin"), &unpacked.decrypted)?;

    if let Some(res_bin) = &unpacked.res_bin {
        std::fs::write(outdir.join("res.bin"), res_bin)?;

        let res_dir = outdir.join("res");
        match parse_resource_blob(res_bin, 0x11000000) {
            Ok(entries) => {
                std::fs::create_dir_all(&res_dir)?;

                let mut order = String::from(ORDER_FILE_HEADER);
                for entry in &entries {
                    println!("#[{:24}] @{:08x}, {} bytes", entry.name, entry.offset, entry.size);
                    order.push_str(&entry.name);
                    order.push('\n');

                    if entry.size > 0 {
                        std::fs::write(res_dir.join(&entry.name), &res_bin[entry.offset..entry.offset + entry.size])?;
                    }
                }
                order.push_str("\n// Here is the end.\n");
                std::fs::write(res_dir.join("00__order__00.txt"), order)?;
            }
            Err(e) => eprintln!("[!] resource blob: {e}"),
        }
    }

    for (tag, bytes) in &unpacked.other_regions {
        std::fs::write(outdir.join(format!("region_{tag}.bin")), bytes)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let user_key = match cli.userkey {
        Some(k) => {
            let derived = calc_user_key(k);
            println!("Using userkey {k:08x} {derived:08x}");
            derived
        }
        None => {
            println!("No userkey specified");
            0
        }
    };

    let mut ok = true;
    for file in &cli.file {
        if let Err(e) = unpack_one(file, user_key) {
            eprintln!("[!] {file:?}: {e}");
            ok = false;
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
