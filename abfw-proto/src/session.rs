//! High-level download session: the sync handshake, the ROM bootloader's
//! command set, the uploaded stub's command set, and the erase-range
//! planner that maps an arbitrary `(addr, size)` onto the stub's 64 KiB /
//! 4 KiB erase granularities.

use crate::framer::UartFramer;
use crate::stub::{patch_stub, stub_blob};
use crate::transport::Transport;
use abfw_core::keys::calc_key_default;
use abfw_core::{Error, Result};

/// ROM bootloader command bytes.
pub mod bl_cmd {
    pub const GET_INFO: u8 = 0x5A;
    pub const AUTHORIZE: u8 = 0x55;
    pub const IFACE_PARAM: u8 = 0x50;
    pub const MEM_WRITE: u8 = 0x57;
    pub const MEM_READ: u8 = 0x52;
    pub const SET_CMD_HANDLER: u8 = 0x58;
    pub const REBOOT: u8 = 0x5E;
}

/// Stub command bytes.
pub mod stub_cmd {
    pub const INIT: u8 = 0x00;
    pub const DEV_READ: u8 = 0x01;
    pub const DEV_WRITE: u8 = 0x02;
    pub const DEV_ERASE: u8 = 0x03;
}

/// `DEV_ERASE` granularity flags.
pub mod erase_flag {
    pub const BLOCK_64K: u8 = 0x00;
    pub const BLOCK_4K: u8 = 0x02;
}

const BLOCK_64K: u32 = 0x10000;
const BLOCK_4K: u32 = 0x1000;
/// Default packet chunk size for command payload transfers (distinct from
/// the stub's own flash write/erase blocksize).
const DEFAULT_IO_SIZE: usize = 512;

/// Encode an 8-byte command block: `(cmd, arg1: u32 be, arg2: u8, arg3: u16 be)`.
fn make_cb(cmd: u8, arg1: u32, arg2: u8, arg3: u16) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0] = cmd;
    buf[1..5].copy_from_slice(&arg1.to_be_bytes());
    buf[5] = arg2;
    buf[6..8].copy_from_slice(&arg3.to_be_bytes());
    buf
}

/// Information returned by the ROM bootloader's `GET_INFO` command.
#[derive(Debug, Clone)]
pub struct ChipInfo {
    pub chip_id: [u8; 12],
    pub load_addr: u32,
    pub comms_key: u32,
}

/// Information returned by the stub's `INIT` command.
#[derive(Debug, Clone)]
pub struct StubInfo {
    pub code_key: u32,
    pub flash_id: u32,
    pub flash_uid: [u8; 16],
}

/// One erase request for the stub's `DEV_ERASE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseBlock {
    pub addr: u32,
    /// Either `BLOCK_64K` or `BLOCK_4K`.
    pub size: u32,
}

/// Plan an erase of `[addr, addr+size)` as a sequence of 64 KiB/4 KiB
/// `DEV_ERASE` calls. The range is first snapped outward to 4 KiB
/// boundaries; within the snapped range, a 64 KiB block is used whenever
/// the current position is 64 KiB-aligned and at least 64 KiB remains,
/// otherwise a 4 KiB block.
pub fn plan_erase(addr: u32, size: u32) -> Vec<EraseBlock> {
    let saddr = addr & !0xFFF;
    let eaddr = addr.saturating_add(size).saturating_add(0xFFF) & !0xFFF;

    let mut blocks = Vec::new();
    let mut pos = saddr;
    while pos < eaddr {
        let remaining = eaddr - pos;
        let size = if pos % BLOCK_64K == 0 && remaining >= BLOCK_64K {
            BLOCK_64K
        } else {
            BLOCK_4K
        };
        blocks.push(EraseBlock { addr: pos, size });
        pos += size;
    }
    blocks
}

/// A download session over an established [`Transport`], one ROM
/// bootloader / stub handshake's worth of state.
pub struct DownloadSession<T: Transport> {
    framer: UartFramer<T>,
    comms_key: u32,
    io_size: usize,
}

impl<T: Transport> DownloadSession<T> {
    /// Wrap a transport that has already completed the sync handshake.
    pub fn new(transport: T) -> Self {
        Self {
            framer: UartFramer::new(transport),
            comms_key: 0,
            io_size: DEFAULT_IO_SIZE,
        }
    }

    /// Repeatedly transmit `SYNC_TOKEN` and read four bytes, alternating
    /// between `initial_baud` and `target_baud` every `attempts_per_baud`
    /// tries and issuing a hard reset between alternations, until the chip
    /// answers with `SYNC_RESP`.
    pub fn sync(&mut self, initial_baud: u32, target_baud: u32, max_attempts: u32, attempts_per_baud: u32) -> Result<()> {
        use crate::tokens::{SYNC_RESP, SYNC_TOKEN};

        let mut baud = initial_baud;
        self.framer.transport_mut().set_baud_rate(baud)?;

        for attempt in 0..max_attempts {
            if attempt > 0 && attempt % attempts_per_baud == 0 {
                let _ = self.framer.send_reset(true);
                baud = if baud == initial_baud { target_baud } else { initial_baud };
                self.framer.transport_mut().set_baud_rate(baud)?;
            }

            self.framer.transport_mut().write_all(&SYNC_TOKEN)?;
            let mut resp = [0u8; 4];
            if self.framer.transport_mut().read_exact_timeout(&mut resp).is_ok() && resp == SYNC_RESP {
                return Ok(());
            }
        }

        Err(Error::IoTimeout { expected: 4 })
    }

    /// `GET_INFO=0x5A`: chip id, load address and current comms key.
    ///
    /// `arg1`/`arg3` carry the reference tool's literal constants
    /// (`0x5259414E`, `0x67ca`); the ROM ignores them for this command but
    /// the byte positions are reproduced rather than zeroed out.
    pub fn get_info(&mut self) -> Result<ChipInfo> {
        self.framer.send_packet(&make_cb(bl_cmd::GET_INFO, 0x5259_414E, 0, 0x67ca))?;
        let resp = self.framer.recv_packet()?;
        if resp.len() < 24 {
            return Err(Error::ProtocolBug("GET_INFO response too short".into()));
        }

        let mut chip_id = [0u8; 12];
        chip_id.copy_from_slice(&resp[0..12]);
        let load_addr = u32::from_be_bytes(resp[12..16].try_into().unwrap());
        let comms_key = u32::from_be_bytes(resp[16..20].try_into().unwrap());
        self.comms_key = comms_key;

        Ok(ChipInfo {
            chip_id,
            load_addr,
            comms_key,
        })
    }

    /// `AUTHORIZE=0x55`: prove we know the current comms key and adopt the
    /// chip's next one.
    pub fn authorize(&mut self) -> Result<u32> {
        let proof = calc_key_default(self.comms_key);
        self.framer.send_packet(&make_cb(bl_cmd::AUTHORIZE, proof, 0, 0))?;
        let resp = self.framer.recv_packet()?;
        if resp.len() < 4 {
            return Err(Error::ProtocolBug("AUTHORIZE response too short".into()));
        }
        self.comms_key = u32::from_be_bytes(resp[0..4].try_into().unwrap());
        Ok(self.comms_key)
    }

    /// `IFACE_PARAM=0x50`: set the line's baud rate (and, on some chips, a
    /// clock divider folded into `arg2`).
    pub fn iface_param(&mut self, baud: u32, clock: u8) -> Result<()> {
        self.framer.send_packet(&make_cb(bl_cmd::IFACE_PARAM, baud, clock, 0))?;
        self.framer.transport_mut().set_baud_rate(baud)?;
        self.framer.recv_packet()?;
        Ok(())
    }

    /// `MEM_WRITE=0x57`: upload `data` to `load_addr`, `blocksize` bytes
    /// per `send_packet` call.
    pub fn mem_write(&mut self, load_addr: u32, data: &[u8], blocksize: u32) -> Result<()> {
        let count = data.len().div_ceil(blocksize as usize) as u32;
        self.framer
            .send_packet(&make_cb(bl_cmd::MEM_WRITE, load_addr, 0, count as u16))?;
        self.framer.recv_packet()?;

        for chunk in data.chunks(self.io_size) {
            self.framer.send_packet(chunk)?;
        }
        Ok(())
    }

    /// `SET_CMD_HANDLER=0x58`: transfer control to the just-uploaded stub
    /// at `entry`.
    pub fn set_cmd_handler(&mut self, entry: u32) -> Result<()> {
        self.framer.send_packet(&make_cb(bl_cmd::SET_CMD_HANDLER, entry, 0, 0))?;
        self.framer.recv_packet()?;
        Ok(())
    }

    /// `REBOOT=0x5E`.
    pub fn reboot(&mut self) -> Result<()> {
        self.framer.send_packet(&make_cb(bl_cmd::REBOOT, 0, 0, 0))
    }

    /// Upload and install the stub: patch it with the chip id, interface
    /// tag and blocksize, write it via `MEM_WRITE` at `load_addr`, then
    /// hand it control with `SET_CMD_HANDLER`.
    pub fn install_stub(&mut self, load_addr: u32, chip_id: &[u8; 12], interface_tag: &[u8; 4], blocksize: u32) -> Result<()> {
        let mut blob = stub_blob();
        patch_stub(&mut blob, chip_id, interface_tag, blocksize);
        self.mem_write(load_addr, &blob, blocksize)?;
        self.set_cmd_handler(load_addr)
    }

    /// `INIT=0x00` (stub): code-region scrambling key, flash id and flash
    /// UID as reported by the running stub.
    pub fn init_stub(&mut self) -> Result<StubInfo> {
        self.framer.send_packet(&make_cb(stub_cmd::INIT, 0, 0, 0))?;
        let resp = self.framer.recv_packet()?;
        if resp.len() < 24 {
            return Err(Error::ProtocolBug("INIT response too short".into()));
        }

        let code_key = u32::from_le_bytes(resp[0..4].try_into().unwrap());
        let flash_id = u32::from_le_bytes(resp[4..8].try_into().unwrap());
        let mut flash_uid = [0u8; 16];
        flash_uid.copy_from_slice(&resp[8..24]);

        Ok(StubInfo {
            code_key,
            flash_id,
            flash_uid,
        })
    }

    /// `DEV_READ=0x01(addr, size)`: stream `size` bytes starting at `addr`,
    /// in bursts sized by [`burst_size`] so each command block's `size`
    /// field (a `u16`) never overflows.
    pub fn dev_read(&mut self, addr: u32, size: u32, blocksize: u32) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(size as usize);
        let mut offset = 0u32;
        while offset < size {
            let burst = (burst_size((size - offset) as usize, blocksize) as u32).min(size - offset);
            self.framer
                .send_packet(&make_cb(stub_cmd::DEV_READ, addr + offset, 0, burst as u16))?;

            let mut got = 0u32;
            while got < burst {
                let chunk = self.framer.recv_packet()?;
                got += chunk.len() as u32;
                data.extend_from_slice(&chunk);
            }
            offset += burst;
        }
        Ok(data)
    }

    /// `DEV_WRITE=0x02(addr, size)`: write `data` starting at `addr`, in
    /// the same burst sizes as `dev_read`.
    pub fn dev_write(&mut self, addr: u32, data: &[u8], blocksize: u32) -> Result<()> {
        let mut offset = 0usize;
        while offset < data.len() {
            let burst = burst_size(data.len() - offset, blocksize).min(data.len() - offset);
            self.framer
                .send_packet(&make_cb(stub_cmd::DEV_WRITE, addr + offset as u32, 0, burst as u16))?;

            for chunk in data[offset..offset + burst].chunks(self.io_size) {
                self.framer.send_packet(chunk)?;
            }
            offset += burst;
        }
        Ok(())
    }

    /// `DEV_ERASE=0x03`: erase `[addr, addr+size)`, planned via
    /// [`plan_erase`] into 64 KiB/4 KiB calls.
    pub fn dev_erase(&mut self, addr: u32, size: u32) -> Result<()> {
        for block in plan_erase(addr, size) {
            let flags = if block.size == BLOCK_64K { erase_flag::BLOCK_64K } else { erase_flag::BLOCK_4K };
            self.framer
                .send_packet(&make_cb(stub_cmd::DEV_ERASE, block.addr, flags, 0))?;
            self.framer.recv_packet()?;
        }
        Ok(())
    }
}

/// Burst size for a transfer of `total` bytes at a given flash `blocksize`:
/// at most 32 KiB, at least one `blocksize`, otherwise `total/100` rounded
/// up to a `blocksize` multiple (spreads progress reporting across large
/// transfers without shrinking small ones).
pub fn burst_size(total: usize, blocksize: u32) -> usize {
    use abfw_core::align::align_to;
    let blocksize = blocksize as usize;
    let hundredth = align_to(total / 100, blocksize);
    0x8000.min(blocksize.max(hundredth))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_cb_layout() {
        let cb = make_cb(0x5A, 0x1234_5678, 0x42, 0xABCD);
        assert_eq!(cb, [0x5A, 0x12, 0x34, 0x56, 0x78, 0x42, 0xAB, 0xCD]);
    }

    #[test]
    fn erase_planner_matches_scenario() {
        let blocks = plan_erase(0x1234, 0x20000);
        assert_eq!(blocks.first(), Some(&EraseBlock { addr: 0x1000, size: BLOCK_4K }));
        assert_eq!(blocks.last(), Some(&EraseBlock { addr: 0x21000, size: BLOCK_4K }));

        let total: u32 = blocks.iter().map(|b| b.size).sum();
        assert_eq!(total, 0x22000 - 0x1000);

        let sixty_four_k_blocks = blocks.iter().filter(|b| b.size == BLOCK_64K).count();
        assert_eq!(sixty_four_k_blocks, 1);

        for window in blocks.windows(2) {
            assert_eq!(window[0].addr + window[0].size, window[1].addr);
        }
    }

    #[test]
    fn erase_planner_pure_64k_range() {
        let blocks = plan_erase(0x10000, 0x20000);
        assert!(blocks.iter().all(|b| b.size == BLOCK_64K));
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn burst_size_clamps_between_blocksize_and_32k() {
        assert_eq!(burst_size(100, 512), 512);
        assert_eq!(burst_size(10_000_000, 512), 0x8000);
    }
}
