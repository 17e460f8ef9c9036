//! Byte-pipe abstraction the framer and session drive. A concrete
//! implementation (a real UART, a loopback for tests) only needs to move
//! bytes and honour timeouts; framing, retries and echo handling all live
//! above this trait.

use abfw_core::Result;

/// A duplex, timeout-bounded byte transport with local echo.
///
/// Implementations are not required to be `Send`/`Sync`; a session owns its
/// transport exclusively for its whole lifetime (see the concurrency model).
pub trait Transport {
    /// Write every byte in `buf`, blocking until the underlying sink accepts
    /// them all.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Fill `buf` completely or fail with `Error::IoTimeout`/`Error::IoShort`
    /// once the transport's configured read timeout elapses.
    fn read_exact_timeout(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Change the line's baud rate in place (used during the sync handshake
    /// and after `IFACE_PARAM`).
    fn set_baud_rate(&mut self, baud: u32) -> Result<()>;
}
