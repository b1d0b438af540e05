// On-chip operand-cache-as-RAM (ORA). When CCR.ORA is set the SH-4's data
// cache can be addressed directly as scratch memory; `CCR.OIX` selects
// which of two mirrored address bands (1MiB or 16MiB apart, depending on
// which P-area window is used) map onto the same physical 8KiB half.
// Reads while OCE is clear return zero; writes are still accepted, a
// quirk of the real hardware this emulates.

use log::warn;

const ORA_SIZE: usize = 8 * 1024;
const ORA_HALF: usize = ORA_SIZE / 2;

pub struct OperandCache {
    ram: [u8; ORA_SIZE],
    pub oce: bool,
    pub ora: bool,
    pub oix: bool,
}

impl Default for OperandCache {
    fn default() -> Self {
        OperandCache { ram: [0u8; ORA_SIZE], oce: false, ora: false, oix: false }
    }
}

impl OperandCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a P4 ORA-window address onto a physical offset into the 8KiB
    /// buffer. `OIX` selects which half of the buffer backs the low
    /// mirror; the complementary half backs the high mirror. Only the low
    /// 13 bits of the local address are significant within either half.
    fn phys_offset(&self, local_addr: u32) -> usize {
        let low_mirror = (local_addr as usize) % (2 * ORA_HALF) < ORA_HALF;
        let within = (local_addr as usize) % ORA_HALF;
        let half = if low_mirror != self.oix { 0 } else { 1 };
        half * ORA_HALF + within
    }

    fn read(&self, local_addr: u32, len: usize) -> [u8; 8] {
        let mut out = [0u8; 8];
        if !self.oce {
            return out;
        }
        let off = self.phys_offset(local_addr);
        out[..len].copy_from_slice(&self.ram[off..off + len]);
        out
    }

    fn write(&mut self, local_addr: u32, data: &[u8]) {
        if !self.oce {
            warn!("ocache: write to operand-cache-as-RAM while OCE is clear (accepted per hardware quirk)");
        }
        let off = self.phys_offset(local_addr);
        self.ram[off..off + data.len()].copy_from_slice(data);
    }

    pub fn read_u8(&self, addr: u32) -> u8 {
        self.read(addr, 1)[0]
    }
    pub fn read_u16(&self, addr: u32) -> u16 {
        u16::from_le_bytes(self.read(addr, 2)[..2].try_into().unwrap())
    }
    pub fn read_u32(&self, addr: u32) -> u32 {
        u32::from_le_bytes(self.read(addr, 4)[..4].try_into().unwrap())
    }
    pub fn read_u64(&self, addr: u32) -> u64 {
        u64::from_le_bytes(self.read(addr, 8))
    }

    pub fn write_u8(&mut self, addr: u32, val: u8) {
        self.write(addr, &val.to_le_bytes());
    }
    pub fn write_u16(&mut self, addr: u32, val: u16) {
        self.write(addr, &val.to_le_bytes());
    }
    pub fn write_u32(&mut self, addr: u32, val: u32) {
        self.write(addr, &val.to_le_bytes());
    }
    pub fn write_u64(&mut self, addr: u32, val: u64) {
        self.write(addr, &val.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_zero_when_oce_clear_but_write_is_still_accepted() {
        let mut oc = OperandCache::new();
        oc.oce = false;
        oc.write_u32(0x10, 0xdead_beef);
        assert_eq!(oc.read_u32(0x10), 0);
        oc.oce = true;
        assert_eq!(oc.read_u32(0x10), 0xdead_beef);
    }

    #[test]
    fn oix_selects_which_half_backs_the_low_mirror() {
        let mut oc = OperandCache::new();
        oc.oce = true;
        oc.oix = false;
        oc.write_u8(0x10, 0xaa);
        assert_eq!(oc.read_u8(0x10), 0xaa);
        oc.oix = true;
        // same local address, other half now backs it
        assert_ne!(oc.read_u8(0x10), 0xaa);
    }
}
