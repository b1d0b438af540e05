// Flash memory: a 128KiB JEDEC-style command-protocol device. Unlike RAM or
// ROM this backend is stateful across writes -- a three-byte unlock sequence
// gates erase and program commands. Addresses here are region-local (already
// masked by `MemMap` against the flash region's `0x1ffff` mask), so the
// classic unlock addresses `0x5555`/`0x2aaa` appear directly rather than as
// the bus addresses `0x00205555`/`0x00202aaa` a host config file would name.

use super::MemInterface;
use log::warn;

const UNLOCK_ADDR_AA: u32 = 0x5555;
const UNLOCK_ADDR_55: u32 = 0x2aaa;

const CMD_PRE_ERASE: u8 = 0x80;
const CMD_ERASE: u8 = 0x30;
const CMD_WRITE: u8 = 0xa0;

const SECTOR_SIZE: u32 = 16 * 1024;
const SECTOR_MASK: u32 = !(SECTOR_SIZE - 1);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Ready,
    GotAa,
    GotAa55,
    AwaitProgramByte,
}

/// 128KiB of byte-addressable flash, gated by the AA55-prefixed unlock
/// protocol in spec.md §6. `erase_unlocked` survives an unrecognized command
/// byte and a write command, per the "persistent until an erase or another
/// pre-erase arrives" resolution of the open question on pre-erase lifetime;
/// it is cleared only by a completed erase or by another `CMD_PRE_ERASE`.
pub struct Flash {
    bytes: Vec<u8>,
    state: State,
    erase_unlocked: bool,
}

impl Flash {
    pub fn new(size: usize) -> Self {
        Flash { bytes: vec![0xff; size], state: State::Ready, erase_unlocked: false }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Flash { bytes, state: State::Ready, erase_unlocked: false }
    }

    /// Loads `path` into a buffer of exactly `expected_len` bytes, matching
    /// `ram::RomRegion::load`'s truncate/zero-pad policy for size mismatches.
    pub fn load(path: &str, expected_len: usize) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        if data.len() != expected_len {
            warn!("{} is {} bytes, expected {}", path, data.len(), expected_len);
        }
        let mut bytes = vec![0xffu8; expected_len];
        let copy_len = data.len().min(expected_len);
        bytes[..copy_len].copy_from_slice(&data[..copy_len]);
        Ok(Flash { bytes, state: State::Ready, erase_unlocked: false })
    }

    fn mask(&self, addr: u32) -> usize {
        (addr as usize) & (self.bytes.len() - 1)
    }

    fn input_byte(&mut self, addr: u32, val: u8) {
        match self.state {
            State::Ready => {
                if val == 0xaa && addr == UNLOCK_ADDR_AA {
                    self.state = State::GotAa;
                } else {
                    warn!("flash: garbage input (expected 0xaa to {:#x})", UNLOCK_ADDR_AA);
                }
            }
            State::GotAa => {
                if val == 0x55 && addr == UNLOCK_ADDR_55 {
                    self.state = State::GotAa55;
                } else {
                    warn!("flash: garbage input (expected 0x55 to {:#x})", UNLOCK_ADDR_55);
                    self.state = State::Ready;
                }
            }
            State::GotAa55 => self.input_cmd(addr, val),
            State::AwaitProgramByte => self.do_write_cmd(addr, val),
        }
    }

    fn input_cmd(&mut self, addr: u32, val: u8) {
        match val {
            CMD_ERASE => {
                if self.erase_unlocked {
                    self.do_erase(addr);
                    self.erase_unlocked = false;
                } else {
                    warn!("flash: erase command without a preceding pre-erase; ignored");
                }
                self.state = State::Ready;
            }
            CMD_PRE_ERASE => {
                self.erase_unlocked = true;
                self.state = State::Ready;
            }
            CMD_WRITE => {
                self.state = State::AwaitProgramByte;
            }
            _ => {
                warn!("flash: unrecognized command {:#04x}", val);
                self.state = State::Ready;
            }
        }
    }

    fn do_erase(&mut self, addr: u32) {
        let base = self.mask(addr) as u32 & SECTOR_MASK;
        let base = base as usize;
        let end = (base + SECTOR_SIZE as usize).min(self.bytes.len());
        for b in &mut self.bytes[base..end] {
            *b = 0xff;
        }
    }

    fn do_write_cmd(&mut self, addr: u32, val: u8) {
        let i = self.mask(addr);
        self.bytes[i] &= val;
        self.state = State::Ready;
    }
}

impl MemInterface for Flash {
    fn read_u8(&mut self, addr: u32) -> u8 {
        let i = self.mask(addr);
        self.bytes[i]
    }
    fn read_u16(&mut self, addr: u32) -> u16 {
        let i = self.mask(addr);
        u16::from_le_bytes([self.bytes[i], self.bytes[i + 1]])
    }
    fn read_u32(&mut self, addr: u32) -> u32 {
        let i = self.mask(addr);
        u32::from_le_bytes([self.bytes[i], self.bytes[i + 1], self.bytes[i + 2], self.bytes[i + 3]])
    }
    fn write_u8(&mut self, addr: u32, val: u8) {
        self.input_byte(addr, val);
    }
    fn write_u16(&mut self, addr: u32, _val: u16) {
        warn!("flash: ignoring {}-byte write at {:#x}, flash only accepts single-byte writes", 2, addr);
    }
    fn write_u32(&mut self, addr: u32, _val: u32) {
        warn!("flash: ignoring {}-byte write at {:#x}, flash only accepts single-byte writes", 4, addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlock(flash: &mut Flash) {
        flash.write_u8(0x5555, 0xaa);
        flash.write_u8(0x2aaa, 0x55);
    }

    #[test]
    fn sector_erase_fills_0xff_and_spares_neighbor() {
        let mut flash = Flash::new(0x20000);
        flash.bytes[0x13fff] = 0x42;
        flash.bytes[0x14001] = 0x00;

        unlock(&mut flash);
        flash.write_u8(0x1234, CMD_PRE_ERASE);
        unlock(&mut flash);
        flash.write_u8(0x14000, CMD_ERASE);

        for addr in 0x14000..=0x17fff {
            assert_eq!(flash.read_u8(addr), 0xff, "addr {:#x} not erased", addr);
        }
        assert_eq!(flash.read_u8(0x13fff), 0x42);
    }

    #[test]
    fn program_byte_ands_with_existing_contents() {
        let mut flash = Flash::new(0x20000);
        flash.bytes[0x100] = 0xff;

        unlock(&mut flash);
        flash.write_u8(0x9999, CMD_WRITE);
        flash.write_u8(0x100, 0x0f);

        assert_eq!(flash.read_u8(0x100), 0x0f);
    }

    #[test]
    fn write_without_unlock_prefix_is_dropped() {
        let mut flash = Flash::new(0x20000);
        flash.write_u8(0x100, CMD_ERASE);
        assert_eq!(flash.state, State::Ready);
        assert_eq!(flash.read_u8(0x100), 0xff);
    }

    #[test]
    fn pre_erase_state_survives_an_unrecognized_command() {
        let mut flash = Flash::new(0x20000);
        unlock(&mut flash);
        flash.write_u8(0x1234, CMD_PRE_ERASE);
        assert!(flash.erase_unlocked);

        unlock(&mut flash);
        flash.write_u8(0x1234, 0xff);
        assert!(flash.erase_unlocked, "pre-erase should persist through an unrecognized command");

        unlock(&mut flash);
        flash.write_u8(0x14000, CMD_ERASE);
        assert_eq!(flash.read_u8(0x14000), 0xff);
        assert!(!flash.erase_unlocked);
    }

    #[test]
    fn erase_without_pre_erase_is_a_no_op() {
        let mut flash = Flash::new(0x20000);
        flash.bytes[0x14000] = 0x55;
        unlock(&mut flash);
        flash.write_u8(0x14000, CMD_ERASE);
        assert_eq!(flash.read_u8(0x14000), 0x55);
    }
}
