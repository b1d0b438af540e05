// Unified and instruction TLBs. A 64-entry UTLB backs data accesses, a
// 4-entry ITLB backs instruction fetches; both hold the same entry shape
// and are searched the same way.

use super::regs::{Reg, RegisterFile};
use crate::error::{ErrorKind, WashError};

pub const UTLB_SIZE: usize = 64;
pub const ITLB_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    OneKb,
    FourKb,
    SixtyFourKb,
    OneMb,
}

impl PageSize {
    pub fn bytes(self) -> u32 {
        match self {
            PageSize::OneKb => 1024,
            PageSize::FourKb => 4096,
            PageSize::SixtyFourKb => 64 * 1024,
            PageSize::OneMb => 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    KernelReadOnly,
    KernelReadWrite,
    KernelReadUserRead,
    KernelReadWriteUserReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbEntry {
    pub valid: bool,
    pub asid: u8,
    pub vpn: u32,
    pub ppn: u32,
    pub page_size: PageSize,
    pub protection: Protection,
    pub shared: bool,
    pub cacheable: bool,
    pub dirty: bool,
    pub write_through: bool,
    pub timing_control: bool,
}

impl Default for TlbEntry {
    fn default() -> Self {
        TlbEntry {
            valid: false,
            asid: 0,
            vpn: 0,
            ppn: 0,
            page_size: PageSize::OneKb,
            protection: Protection::KernelReadOnly,
            shared: false,
            cacheable: false,
            dirty: false,
            write_through: false,
            timing_control: false,
        }
    }
}

impl TlbEntry {
    fn page_mask(self) -> u32 {
        !(self.page_size.bytes() - 1)
    }

    fn matches(self, vpn_query: u32, asid_query: u8) -> bool {
        self.valid
            && (self.shared || self.asid == asid_query)
            && (self.vpn & self.page_mask()) == (vpn_query & self.page_mask())
    }

    fn translate(self, addr: u32) -> u32 {
        let mask = self.page_mask();
        (self.ppn & mask) | (addr & !mask)
    }
}

pub enum TlbAccess {
    Read,
    Write,
}

pub struct Tlb {
    entries: Vec<TlbEntry>,
}

impl Tlb {
    pub fn new(size: usize) -> Self {
        Tlb { entries: vec![TlbEntry::default(); size] }
    }

    pub fn utlb() -> Self {
        Self::new(UTLB_SIZE)
    }

    pub fn itlb() -> Self {
        Self::new(ITLB_SIZE)
    }

    pub fn entry(&self, idx: usize) -> &TlbEntry {
        &self.entries[idx]
    }

    pub fn set_entry(&mut self, idx: usize, entry: TlbEntry) {
        self.entries[idx] = entry;
    }

    fn find(&self, addr: u32, asid: u8) -> Option<&TlbEntry> {
        self.entries.iter().find(|e| e.matches(addr, asid))
    }

    /// Translates a virtual address to physical, raising the matching
    /// read/write TLB-miss exception with `TEA`/`PTEH` set on a miss.
    pub fn translate(&self, regs: &mut RegisterFile, addr: u32, access: TlbAccess) -> Result<u32, WashError> {
        let asid = (regs[Reg::Pteh] & 0xff) as u8;
        match self.find(addr, asid) {
            Some(entry) => Ok(entry.translate(addr)),
            None => {
                regs[Reg::Tea] = addr;
                regs[Reg::Pteh] = (regs[Reg::Pteh] & 0x3ff) | (addr & !0x3ff);
                let detail = match access {
                    TlbAccess::Read => "tlb read miss",
                    TlbAccess::Write => "tlb write miss",
                };
                Err(crate::raise_error!(ErrorKind::UnknownExcpCode).with_str("detail", detail).with_u32("addr", addr))
            }
        }
    }
}
