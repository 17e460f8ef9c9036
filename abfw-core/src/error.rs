//! Shared error type for the image codec and the download protocol.

use thiserror::Error;

/// Identifies which CRC failed, so callers can react (e.g. "likely wrong
/// user key" when the code region's CRC doesn't check out) without string
/// matching on the error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrcDomain {
    /// The boot header's own prefix checksum (bytes `0x00..0x3E`).
    BootHeader,
    /// The boot code blob, checked against the header's stored CRC.
    BootCode,
    /// The region table (`0x40..0x80`).
    RegionTable,
    /// A region header (the 16-byte stub before the block-CRC table).
    RegionHeader {
        /// The region's type tag, e.g. `"XCOD"`.
        tag: String,
    },
    /// One 512-byte block within a region.
    Block {
        /// The region's type tag.
        tag: String,
        /// Zero-based block index within the region.
        index: usize,
    },
    /// The whole-region data checksum stored in the region table entry.
    RegionData {
        /// The region's type tag.
        tag: String,
    },
    /// The wire protocol's data-payload checksum.
    WireData,
}

impl std::fmt::Display for CrcDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BootHeader => write!(f, "boot header"),
            Self::BootCode => write!(f, "boot code"),
            Self::RegionTable => write!(f, "region table"),
            Self::RegionHeader { tag } => write!(f, "{tag} region header"),
            Self::Block { tag, index } => write!(f, "{tag} block #{index}"),
            Self::RegionData { tag } => write!(f, "{tag} region data"),
            Self::WireData => write!(f, "wire data payload"),
        }
    }
}

/// The toolkit-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from an underlying reader/writer (file or transport).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking transport read did not complete within the configured
    /// timeout.
    #[error("timed out waiting for {expected} bytes from the transport")]
    IoTimeout {
        /// Number of bytes the caller was waiting for.
        expected: usize,
    },

    /// A transport read returned fewer bytes than requested, without
    /// actually timing out (e.g. the port was closed mid-read).
    #[error("short read: expected {expected} bytes, got {actual}")]
    IoShort {
        /// Number of bytes requested.
        expected: usize,
        /// Number of bytes actually read.
        actual: usize,
    },

    /// The local-echo bytes following a write never arrived.
    #[error("local echo missing after writing {written} bytes")]
    EchoMissing {
        /// Number of bytes written whose echo was not observed.
        written: usize,
    },

    /// A chip response carried a counter that didn't match the host's last
    /// sent counter.
    #[error("counter mismatch: expected {expected:#04x}, got {got:#04x}")]
    CounterMismatch {
        /// Counter value the host expected.
        expected: u8,
        /// Counter value the chip actually sent.
        got: u8,
    },

    /// A chip response carried a token byte that isn't valid in context.
    #[error("unexpected response token {0:#04x}")]
    UnexpectedToken(u8),

    /// A CRC check failed somewhere in the image or the wire protocol.
    #[error("CRC mismatch in {domain}: expected {expected:#06x}, computed {computed:#06x}")]
    CrcMismatch {
        /// Which checksum failed.
        domain: CrcDomain,
        /// The checksum stored in (or received with) the data.
        expected: u32,
        /// The checksum actually computed over the data.
        computed: u32,
    },

    /// The boot header failed structural validation (bad magic, bad
    /// checksum byte, boot code range out of bounds, ...).
    #[error("invalid header: {0}")]
    HeaderInvalid(String),

    /// An address/size pair falls outside the addressable range (a resource
    /// entry pointing before the blob's base address or past its end, a
    /// flash command targeting past the device, ...).
    #[error("address {addr:#010x} size {size:#x} is out of range")]
    OutOfRange {
        /// The starting address.
        addr: u64,
        /// The requested size.
        size: u64,
    },

    /// The "whole flash" size (`size == 0`) was requested but the chip's
    /// flash density could not be determined from its ID byte.
    #[error("flash size unknown; cannot resolve a `size=0` (whole flash) request")]
    UnknownFlashSize,

    /// An invariant that should be impossible to violate was violated
    /// anyway — a bug in this implementation, not a bad input.
    #[error("protocol bug: {0}")]
    ProtocolBug(String),

    /// The user interrupted an interruptible operation (between high-level
    /// commands, never mid-packet).
    #[error("operation cancelled by user")]
    UserCancelled,
}

impl Error {
    /// Build a [`Error::CrcMismatch`].
    pub fn crc_mismatch(domain: CrcDomain, expected: impl Into<u32>, computed: impl Into<u32>) -> Self {
        Self::CrcMismatch {
            domain,
            expected: expected.into(),
            computed: computed.into(),
        }
    }

    /// Build a [`Error::HeaderInvalid`].
    pub fn header_invalid(message: impl Into<String>) -> Self {
        Self::HeaderInvalid(message.into())
    }

    /// Build a [`Error::ProtocolBug`].
    pub fn protocol_bug(message: impl Into<String>) -> Self {
        Self::ProtocolBug(message.into())
    }
}

/// Result type alias used throughout the toolkit.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_domain_display() {
        assert_eq!(CrcDomain::BootHeader.to_string(), "boot header");
        assert_eq!(
            CrcDomain::Block {
                tag: "XCOD".into(),
                index: 3
            }
            .to_string(),
            "XCOD block #3"
        );
    }

    #[test]
    fn error_display() {
        let err = Error::crc_mismatch(CrcDomain::RegionTable, 0x1234u16, 0x5678u16);
        assert!(err.to_string().contains("region table"));

        let err = Error::CounterMismatch {
            expected: 1,
            got: 2,
        };
        assert!(err.to_string().contains("0x01"));
    }
}
