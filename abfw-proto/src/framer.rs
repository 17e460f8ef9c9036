//! Stop-and-wait framed protocol over a UART with local echo: the
//! `PING`/`NYET`/sticky-ping state machine that implements §4.7.

use crate::tokens::{self, ACK, DATA, DATA_REQUEST, DATA_TOKEN, NAK, NYET, PING, RESET_TOKEN, SYNC_TOKEN};
use crate::transport::Transport;
use abfw_core::crc::{crc16, CRC16_DEFAULT_INIT};
use abfw_core::{Error, Result};

/// Owns one session's counter and sticky-ping flag over a [`Transport`].
///
/// Per the concurrency model this must be held exclusively for the whole
/// session; it is not `Sync` and isn't meant to be shared across threads.
pub struct UartFramer<T: Transport> {
    transport: T,
    counter: u8,
    sticky_ping: bool,
}

impl<T: Transport> UartFramer<T> {
    /// Wrap a transport in a fresh framer: counter at zero, no sticky ping.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            counter: 0,
            sticky_ping: false,
        }
    }

    /// Borrow the underlying transport (for baud-rate changes during the
    /// sync handshake, which the framer itself has no reason to touch).
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn bump_counter(&mut self) -> u8 {
        self.counter = self.counter.wrapping_add(1);
        self.counter
    }

    /// Write `frame` and consume its echo, failing with `EchoMissing` if the
    /// bytes that come back don't match what was sent.
    fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        self.transport.write_all(frame)?;
        let mut echo = vec![0u8; frame.len()];
        self.transport
            .read_exact_timeout(&mut echo)
            .map_err(|_| Error::EchoMissing { written: frame.len() })?;
        if echo != frame {
            return Err(Error::EchoMissing { written: frame.len() });
        }
        Ok(())
    }

    /// Transmit `frame` and read back the two-byte `(token, counter)`
    /// response header, retrying the whole exchange up to
    /// `MAX_TIMEOUT_RETRIES` times on a bare receive timeout.
    fn exchange(&mut self, frame: &[u8]) -> Result<(u8, u8)> {
        let mut attempts = 0;
        loop {
            self.transmit(frame)?;
            let mut hdr = [0u8; 2];
            match self.transport.read_exact_timeout(&mut hdr) {
                Ok(()) => return Ok((hdr[0], hdr[1])),
                Err(Error::IoTimeout { .. }) => {
                    attempts += 1;
                    if attempts >= tokens::MAX_TIMEOUT_RETRIES {
                        return Err(Error::IoTimeout { expected: 2 });
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send one data packet, retrying/pinging as the chip demands. Returns
    /// once the chip has `ACK`'d or `NYET`'d the packet.
    pub fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        loop {
            if self.sticky_ping {
                let counter = self.bump_counter();
                let (tok, got) = self.exchange(&[PING, counter])?;
                if got != counter {
                    return Err(Error::CounterMismatch { expected: counter, got });
                }
                match tok {
                    ACK => self.sticky_ping = false,
                    NAK => continue,
                    other => return Err(Error::UnexpectedToken(other)),
                }
            }

            let counter = self.bump_counter();
            let crc = crc16(payload, CRC16_DEFAULT_INIT);
            let mut frame = Vec::with_capacity(4 + payload.len() + 2);
            frame.push(DATA);
            frame.push(counter);
            frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
            frame.extend_from_slice(payload);
            frame.extend_from_slice(&crc.to_le_bytes());

            let (tok, got) = self.exchange(&frame)?;
            if got != counter {
                return Err(Error::CounterMismatch { expected: counter, got });
            }
            match tok {
                ACK => {
                    self.sticky_ping = false;
                    return Ok(());
                }
                NYET => {
                    self.sticky_ping = true;
                    return Ok(());
                }
                NAK => {
                    self.sticky_ping = true;
                    continue;
                }
                other => return Err(Error::UnexpectedToken(other)),
            }
        }
    }

    /// Receive one data packet, reissuing `DATA_REQUEST` with a fresh
    /// counter on `NAK` (the chip has nothing yet) and with the *same*
    /// counter on a CRC mismatch (the chip already committed to that
    /// counter's response).
    pub fn recv_packet(&mut self) -> Result<Vec<u8>> {
        let mut counter = self.bump_counter();
        loop {
            let (tok, got) = self.exchange(&[DATA_REQUEST, counter])?;
            if got != counter {
                return Err(Error::CounterMismatch { expected: counter, got });
            }
            match tok {
                DATA_TOKEN => {
                    let mut size_buf = [0u8; 2];
                    self.transport.read_exact_timeout(&mut size_buf)?;
                    let size = u16::from_le_bytes(size_buf) as usize;

                    let mut data = vec![0u8; size];
                    self.transport.read_exact_timeout(&mut data)?;

                    let mut crc_buf = [0u8; 2];
                    self.transport.read_exact_timeout(&mut crc_buf)?;
                    let stored = u16::from_le_bytes(crc_buf);
                    let computed = crc16(&data, CRC16_DEFAULT_INIT);

                    if stored != computed {
                        continue;
                    }
                    return Ok(data);
                }
                NAK => {
                    counter = self.bump_counter();
                    continue;
                }
                other => return Err(Error::UnexpectedToken(other)),
            }
        }
    }

    /// Reset the link: a soft reset always, a full chip reboot (followed by
    /// a resync token) when `hard` is set. Clears the counter and sticky
    /// flag either way.
    pub fn send_reset(&mut self, hard: bool) -> Result<()> {
        self.transport.write_all(&RESET_TOKEN)?;
        let mut echo = [0u8; 2];
        self.transport
            .read_exact_timeout(&mut echo)
            .map_err(|_| Error::EchoMissing { written: 2 })?;

        if hard {
            self.transport.write_all(&SYNC_TOKEN)?;
            let mut echo = [0u8; 4];
            self.transport
                .read_exact_timeout(&mut echo)
                .map_err(|_| Error::EchoMissing { written: 4 })?;
        }

        self.counter = 0;
        self.sticky_ping = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// A loopback transport driven entirely by a scripted reply queue: every
    /// write is echoed back verbatim, then the next scripted bytes (if any)
    /// are appended so a subsequent read can see the "chip's" response.
    struct ScriptedTransport {
        inbox: VecDeque<u8>,
        replies: VecDeque<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Vec<u8>>) -> Self {
            Self {
                inbox: VecDeque::new(),
                replies: replies.into(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn write_all(&mut self, buf: &[u8]) -> Result<()> {
            self.inbox.extend(buf.iter().copied());
            if let Some(reply) = self.replies.pop_front() {
                self.inbox.extend(reply);
            }
            Ok(())
        }

        fn read_exact_timeout(&mut self, buf: &mut [u8]) -> Result<()> {
            if self.inbox.len() < buf.len() {
                return Err(Error::IoTimeout { expected: buf.len() });
            }
            for slot in buf.iter_mut() {
                *slot = self.inbox.pop_front().unwrap();
            }
            Ok(())
        }

        fn set_baud_rate(&mut self, _baud: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn send_packet_happy_path() {
        // S5: chip ACKs the first DATA packet outright.
        let transport = ScriptedTransport::new(vec![vec![ACK, 0x01]]);
        let mut framer = UartFramer::new(transport);
        framer.send_packet(b"hi").unwrap();
        assert_eq!(framer.counter, 1);
        assert!(!framer.sticky_ping);
    }

    #[test]
    fn send_packet_nyet_then_ping_ack_then_data_ack() {
        // S6: NYET on send A; NAK on send B's ping, ACK on the retried
        // ping, ACK on send B's data. Counters 01..04.
        let transport = ScriptedTransport::new(vec![
            vec![NYET, 0x01],
            vec![NAK, 0x02],
            vec![ACK, 0x03],
            vec![ACK, 0x04],
        ]);
        let mut framer = UartFramer::new(transport);

        framer.send_packet(b"A").unwrap();
        assert!(framer.sticky_ping);

        framer.send_packet(b"B").unwrap();
        assert!(!framer.sticky_ping);
        assert_eq!(framer.counter, 4);
    }

    #[test]
    fn counter_mismatch_is_fatal() {
        let transport = ScriptedTransport::new(vec![vec![ACK, 0x99]]);
        let mut framer = UartFramer::new(transport);
        let err = framer.send_packet(b"x").unwrap_err();
        assert!(matches!(err, Error::CounterMismatch { .. }));
    }

    #[test]
    fn recv_packet_retries_on_nak_with_fresh_counter() {
        let payload = b"ok".to_vec();
        let crc = crc16(&payload, CRC16_DEFAULT_INIT);
        let mut good_reply = vec![DATA_TOKEN, 0x02];
        good_reply.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        good_reply.extend_from_slice(&payload);
        good_reply.extend_from_slice(&crc.to_le_bytes());

        let transport = ScriptedTransport::new(vec![vec![NAK, 0x01], good_reply]);
        let mut framer = UartFramer::new(transport);
        let data = framer.recv_packet().unwrap();
        assert_eq!(data, payload);
    }
}
