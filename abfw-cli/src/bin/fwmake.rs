//! Firmware maker: pack a header, an application binary and an optional
//! resource blob into a flashable image.

use abfw_core::keys::calc_user_key;
use abfw_image::pack_image;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Pack header.bin, app.bin and (optionally) res.bin into a firmware image.
#[derive(Parser)]
#[command(name = "fwmake", author, version, about)]
struct Cli {
    /// Output image file
    output: PathBuf,

    /// The "header.bin" file containing the boot code and header bits
    header: PathBuf,

    /// The "app.bin" file containing the main application code
    appbin: PathBuf,

    /// The "res.bin" file containing firmware resources
    resbin: Option<PathBuf>,

    /// User key to derive the code scrambling key from
    #[arg(short = 'u', long, value_parser = parse_int)]
    userkey: Option<u32>,

    /// Code scrambling key to use directly (overrides --userkey)
    #[arg(short = 'U', long, value_parser = parse_int)]
    codekey: Option<u32>,

    /// Do not scramble the resource region data
    #[arg(long)]
    no_res_scramble: bool,
}

fn parse_int(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse::<u32>().map_err(|e| e.to_string())
    }
}

fn run(cli: Cli) -> abfw_core::Result<()> {
    let code_key = match (cli.codekey, cli.userkey) {
        (Some(k), _) => k,
        (None, Some(u)) => {
            let k = calc_user_key(u);
            println!("Using the key {k:#010x} (obtained from {u:#010x})");
            k
        }
        (None, None) => 0,
    };

    let header_bin = std::fs::read(&cli.header)?;
    let app_bin = std::fs::read(&cli.appbin)?;
    let res_bin = cli.resbin.as_ref().map(std::fs::read).transpose()?;

    let image = pack_image(&header_bin, &app_bin, res_bin.as_deref(), code_key, !cli.no_res_scramble)?;
    std::fs::write(&cli.output, image)?;

    println!("Wrote {}", cli.output.display());
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
