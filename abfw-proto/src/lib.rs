//! Stop-and-wait UART download protocol for the Bluetrum audio-SoC ROM
//! bootloader: frame-level retries, the bootloader/stub command sets, and
//! the opaque flash-access stub they hand control to.

pub mod framer;
pub mod session;
pub mod stub;
pub mod tokens;
pub mod transport;

pub use framer::UartFramer;
pub use session::{plan_erase, burst_size, ChipInfo, DownloadSession, EraseBlock, StubInfo};
pub use transport::Transport;
