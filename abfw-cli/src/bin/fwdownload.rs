//! Downloader: synchronise with the ROM bootloader over UART, upload the
//! flash-access stub, and erase/read/write flash through it.
//!
//! USB-MSC (SCSI) transport is out of scope for this toolkit (§1); only the
//! UART backend is wired up here.

use abfw_cli::progress::create_progress_bar;
use abfw_cli::SerialTransport;
use abfw_proto::DownloadSession;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;

/// UART transfer blocksize used for this toolkit's bootloader stub.
const BLOCKSIZE: u32 = 512;
/// Flash density byte range the stub's `INIT` response can report; outside
/// this range the flash size is unknown.
const DENSITY_RANGE: std::ops::RangeInclusive<u32> = 0x10..=0x18;

/// Talk to the bootloader ROM in a Bluetrum chip: erase, read or write
/// flash.
#[derive(Parser)]
#[command(name = "fwdownload", author, version, about)]
struct Cli {
    #[command(subcommand)]
    action: Action,

    /// Reboot the chip after completion
    #[arg(short = 'r', long)]
    reboot: bool,

    /// Serial port to use for the UART bootloader
    #[arg(long)]
    port: Option<String>,

    /// Initial baud rate
    #[arg(long = "init-baud", default_value_t = 115_200)]
    init_baud: u32,

    /// Baud rate to switch to once synchronised
    #[arg(long, default_value_t = 921_600)]
    baud: u32,
}

#[derive(Subcommand)]
enum Action {
    /// Erase one or more flash areas
    Erase {
        /// `<address> <size>` pairs; a size of 0 means "to end of flash"
        #[arg(value_name = "address size", num_args = 2.., required = true)]
        areas: Vec<String>,
    },
    /// Read the flash into a file
    Read {
        /// `<address> <size> <file>` triples; a size of 0 means "to end of flash"
        #[arg(value_name = "address size file", num_args = 3.., required = true)]
        areas: Vec<String>,
    },
    /// Write a file into flash
    Write {
        /// `<address> <file>` pairs
        #[arg(value_name = "address file", num_args = 2.., required = true)]
        areas: Vec<String>,
    },
}

fn parse_int(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse::<u64>().map_err(|e| e.to_string())
    }
}

fn run(cli: Cli) -> abfw_core::Result<()> {
    let Some(port) = cli.port.as_deref() else {
        eprintln!("No device specified: pass the serial port via --port");
        return Err(abfw_core::Error::ProtocolBug("no transport selected".into()));
    };

    let transport = SerialTransport::open(port, cli.init_baud, Duration::from_millis(200))?;
    let mut session = DownloadSession::new(transport);

    print!("Trying to synchronize.");
    session.sync(cli.init_baud, cli.baud, 200, 10)?;
    println!(" done.");

    let info = session.get_info()?;
    println!(" Chip ID:       {:?}", String::from_utf8_lossy(&info.chip_id));
    println!(" Load address:  ${:08X}", info.load_addr);
    println!(" Init. commkey: ${:08X}", info.comms_key);

    let new_key = session.authorize()?;
    println!(" New commkey:   ${new_key:08X}");

    if cli.baud != cli.init_baud {
        println!("Changing baudrate to {} baud...", cli.baud);
        session.iface_param(cli.baud, 0x02)?;
    }

    session.install_stub(info.load_addr, &info.chip_id, b"UART", BLOCKSIZE)?;

    let stub = session.init_stub()?;
    println!("- Code key: >>>> {:08X} <<<<", stub.code_key);
    println!("- Flash device ID: {:06X}", stub.flash_id);
    println!("- Flash unique ID: {}", hex_encode(&stub.flash_uid));

    let density = stub.flash_id & 0xFF;
    let flash_size = if DENSITY_RANGE.contains(&density) {
        let size = 1u64 << density;
        println!("- Flash size: {size} bytes");
        Some(size)
    } else {
        println!("- Unknown flash size");
        None
    };

    let resolve_size = |addr: u64, size: u64| -> abfw_core::Result<u64> {
        if size != 0 {
            return Ok(size);
        }
        let total = flash_size.ok_or(abfw_core::Error::UnknownFlashSize)?;
        if addr >= total {
            return Err(abfw_core::Error::OutOfRange { addr, size });
        }
        Ok(total - addr)
    };

    match &cli.action {
        Action::Erase { areas } => {
            for chunk in areas.chunks(2) {
                let addr = parse_int(&chunk[0]).map_err(|e| abfw_core::Error::header_invalid(e))?;
                let raw_size = parse_int(&chunk[1]).map_err(|e| abfw_core::Error::header_invalid(e))?;
                let size = resolve_size(addr, raw_size)?;

                let bar = create_progress_bar(size, true);
                bar.set_message("erasing");
                session.dev_erase(addr as u32, size as u32)?;
                bar.finish_and_clear();
            }
        }
        Action::Read { areas } => {
            for chunk in areas.chunks(3) {
                let addr = parse_int(&chunk[0]).map_err(|e| abfw_core::Error::header_invalid(e))?;
                let raw_size = parse_int(&chunk[1]).map_err(|e| abfw_core::Error::header_invalid(e))?;
                let size = resolve_size(addr, raw_size)?;
                let path = &chunk[2];

                println!("Reading {size} bytes from @{addr:06X} into \"{path}\"...");
                let bar = create_progress_bar(size, true);

                let mut out = Vec::with_capacity(size as usize);
                let mut done = 0u64;
                while done < size {
                    let burst = (abfw_proto::burst_size((size - done) as usize, BLOCKSIZE) as u64).min(size - done);
                    let data = session.dev_read((addr + done) as u32, burst as u32, BLOCKSIZE)?;
                    out.extend_from_slice(&data);
                    bar.inc(data.len() as u64);
                    done += burst;
                }
                bar.finish_and_clear();
                std::fs::write(path, &out)?;
            }
        }
        Action::Write { areas } => {
            for chunk in areas.chunks(2) {
                let addr = parse_int(&chunk[0]).map_err(|e| abfw_core::Error::header_invalid(e))?;
                let path = &chunk[1];

                let data = std::fs::read(path)?;
                println!("Writing {} bytes to @{addr:06X} from \"{path}\"...", data.len());

                let bar = create_progress_bar(data.len() as u64, true);
                session.dev_erase(addr as u32, data.len() as u32)?;

                let mut done = 0usize;
                while done < data.len() {
                    let burst = abfw_proto::burst_size(data.len() - done, BLOCKSIZE).min(data.len() - done);
                    session.dev_write(addr as u32 + done as u32, &data[done..done + burst], BLOCKSIZE)?;
                    bar.inc(burst as u64);
                    done += burst;
                }
                bar.finish_and_clear();
            }
        }
    }

    if cli.reboot {
        session.reboot()?;
    }

    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("failed: {e}");
            ExitCode::FAILURE
        }
    }
}
