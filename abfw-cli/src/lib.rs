//! Shared plumbing for the firmware-toolkit binaries: the UART transport
//! backend and progress-bar styling.

pub mod progress;
pub mod serial_transport;

pub use serial_transport::SerialTransport;
