//! [`Transport`] backend over a real UART, via the `serialport` crate.

use abfw_core::{Error, Result};
use abfw_proto::Transport;
use std::io::{self, Read, Write};
use std::time::Duration;

/// A UART with local echo, reached through `serialport::SerialPort`.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `path` at `baud`, with every blocking read bounded by `timeout`.
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(timeout)
            .open()
            .map_err(io::Error::from)?;
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.port.write_all(buf).map_err(Error::from)
    }

    fn read_exact_timeout(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(Error::IoShort {
                        expected: buf.len(),
                        actual: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(Error::IoTimeout { expected: buf.len() - filled });
                }
                Err(e) => return Err(Error::from(e)),
            }
        }
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        self.port.set_baud_rate(baud).map_err(io::Error::from)?;
        Ok(())
    }
}
