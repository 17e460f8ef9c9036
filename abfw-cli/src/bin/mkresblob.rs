//! Resource builder: pack a directory of files (or an explicit order file)
//! into a flat resource blob consumed by the `XRES` region.

use abfw_image::resource::{build_resource_blob, parse_order_file, scan_dir, OrderedFiles, ResourceEntry};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Make a Bluetrum resource blob file.
#[derive(Parser)]
#[command(name = "mkresblob", author, version, about)]
struct Cli {
    /// Align each file entry to the specified alignment
    #[arg(long, value_parser = parse_usize, default_value = "32")]
    align: usize,

    /// Resource area base address
    #[arg(long, value_parser = parse_u32, default_value = "0x11000000")]
    base: u32,

    /// Input resource directory or resource layout file
    input: PathBuf,

    /// Output resource file path
    output: PathBuf,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse::<u32>().map_err(|e| e.to_string())
    }
}

fn parse_usize(s: &str) -> Result<usize, String> {
    parse_u32(s).map(|v| v as usize)
}

fn run(cli: Cli) -> std::io::Result<()> {
    let mut files = OrderedFiles::new();

    if cli.input.is_dir() {
        scan_dir(&mut files, &cli.input, "")?;
    } else {
        let contents = std::fs::read_to_string(&cli.input)?;
        parse_order_file(&mut files, &contents);

        // An entry left without an explicit override is read from a file
        // of the same name next to the order file, if one exists there.
        files.fill_missing_paths(|name| {
            let candidate = cli.input.with_file_name(name);
            candidate.exists().then_some(candidate)
        });
    }

    let mut entries = Vec::with_capacity(files.len());
    for (i, (name, path)) in files.iter().enumerate() {
        let data = match path {
            Some(p) => Some(std::fs::read(p)?),
            None => None,
        };
        println!("[{i}]: \"{name}\" ({} bytes)", data.as_ref().map_or(0, Vec::len));
        entries.push(ResourceEntry {
            name: name.to_string(),
            data,
        });
    }

    let blob = build_resource_blob(&entries, cli.base, cli.align);
    std::fs::write(&cli.output, blob)?;

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
