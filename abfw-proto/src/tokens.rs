//! Byte-level constants for the stop-and-wait UART frame protocol.

/// Host → chip: "here is a data packet".
pub const DATA: u8 = 0x4B;
/// Host → chip: "send me the next data packet you have".
pub const DATA_REQUEST: u8 = 0xB4;
/// Host → chip: "are you there / ready".
pub const PING: u8 = 0xC3;

/// Chip → host: packet accepted.
pub const ACK: u8 = 0x1E;
/// Chip → host: packet rejected, retry.
pub const NAK: u8 = 0x2D;
/// Chip → host: accepted, but a previous packet is still in flight.
pub const NYET: u8 = 0x3C;
/// Chip → host: "here is the data packet you asked for" (same byte value as
/// the host's `DATA` token; which one is in play is determined by who sent
/// it).
pub const DATA_TOKEN: u8 = 0x4B;

/// Line-level resync sequence, sent by the host to (re)establish
/// synchronisation with the ROM bootloader.
pub const SYNC_TOKEN: [u8; 4] = [0xA5, 0x96, 0x87, 0x5A];
/// The chip's reply once it has locked onto `SYNC_TOKEN`.
pub const SYNC_RESP: [u8; 4] = [0x5A, 0x69, 0x78, 0xA5];
/// A soft reset of the chip-side framer state, optionally followed by
/// `SYNC_TOKEN` for a hard (chip-level) reboot.
pub const RESET_TOKEN: [u8; 2] = [0xF5, 0xA0];

/// Maximum consecutive per-packet receive timeouts before a send/recv gives
/// up and surfaces an error.
pub const MAX_TIMEOUT_RETRIES: u32 = 10;
