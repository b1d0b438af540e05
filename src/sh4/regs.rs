// SH-4 register file: a fixed-index array of 32-bit values addressable by
// symbolic name. Banked registers (R0..R7 / R0_BANK..R7_BANK, FR0..FR15 /
// XF0..XF15) are physically stored twice and swapped on write -- some
// instructions (e.g. `MOV.L Rm, @-R15` with RB set) index the banked
// R0..R7 directly, so a swap-on-flip array reads more naturally here than
// two disjoint register files addressed by mode.

use std::ops::{Index, IndexMut};

pub const SR_MD_MASK: u32 = 1 << 30;
pub const SR_RB_MASK: u32 = 1 << 29;
pub const SR_BL_MASK: u32 = 1 << 28;
pub const SR_FD_MASK: u32 = 1 << 15;
pub const SR_IMASK_MASK: u32 = 0xf << 4;
pub const SR_IMASK_SHIFT: u32 = 4;

pub const FPSCR_FR_MASK: u32 = 1 << 21;
pub const FPSCR_RM_MASK: u32 = 0x3;

pub const ICR_IRLM_MASK: u32 = 1 << 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Reg {
    Sr,
    Ssr,
    Spc,
    Gbr,
    Vbr,
    Sgr,
    Dbr,
    Mach,
    Macl,
    Pr,
    Pc,
    Fpscr,
    Fpul,
    Expevt,
    Intevt,
    Tea,
    Pteh,
    Icr,
    Ipra,
    Iprb,
    Iprc,
    Iprd,
    Qacr0,
    Qacr1,
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    R0Bank,
    R1Bank,
    R2Bank,
    R3Bank,
    R4Bank,
    R5Bank,
    R6Bank,
    R7Bank,
}

const REG_COUNT: usize = 48;
const N_FLOAT_REGS: usize = 16;

/// Rounding mode programmed into the host FPU from FPSCR.RM. There is no
/// direct Rust equivalent of `fesetround`, so this just exposes the
/// resolved mode and leaves adopting it to the float-op layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    Nearest,
    TowardZero,
}

/// Side effects a write to SR can trigger, surfaced so callers can react
/// (bank swap, a deferred interrupt-priority refresh, or entering
/// unprivileged mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SrChangeEffects {
    pub bank_swapped: bool,
    pub refresh_requested: bool,
    pub unprivileged_mode_error: bool,
}

pub struct RegisterFile {
    regs: [u32; REG_COUNT],
    fr: [f32; N_FLOAT_REGS],
    xf: [f32; N_FLOAT_REGS],
    pub delayed_branch: bool,
    pub delayed_branch_addr: u32,
    pub dont_increment_pc: bool,
}

impl Index<Reg> for RegisterFile {
    type Output = u32;
    fn index(&self, reg: Reg) -> &u32 {
        &self.regs[reg as usize]
    }
}

impl IndexMut<Reg> for RegisterFile {
    fn index_mut(&mut self, reg: Reg) -> &mut u32 {
        &mut self.regs[reg as usize]
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        let mut regs = [0u32; REG_COUNT];
        regs[Reg::Sr as usize] = SR_MD_MASK | SR_RB_MASK | SR_BL_MASK | SR_FD_MASK | SR_IMASK_MASK;
        regs[Reg::Pc as usize] = 0xa000_0000;
        regs[Reg::Fpscr as usize] = 0x41;
        RegisterFile {
            regs,
            fr: [0.0; N_FLOAT_REGS],
            xf: [0.0; N_FLOAT_REGS],
            delayed_branch: false,
            delayed_branch_addr: 0,
            dont_increment_pc: false,
        }
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fr(&self, idx: usize) -> f32 {
        self.fr[idx]
    }
    pub fn set_fr(&mut self, idx: usize, val: f32) {
        self.fr[idx] = val;
    }
    pub fn xf(&self, idx: usize) -> f32 {
        self.xf[idx]
    }
    pub fn set_xf(&mut self, idx: usize, val: f32) {
        self.xf[idx] = val;
    }

    /// Swaps the physical contents of `R0..R7` with `R0_BANK..R7_BANK`.
    fn bank_swap(&mut self) {
        let general = [Reg::R0, Reg::R1, Reg::R2, Reg::R3, Reg::R4, Reg::R5, Reg::R6, Reg::R7];
        let banked =
            [Reg::R0Bank, Reg::R1Bank, Reg::R2Bank, Reg::R3Bank, Reg::R4Bank, Reg::R5Bank, Reg::R6Bank, Reg::R7Bank];
        for (g, b) in general.iter().zip(banked.iter()) {
            self.regs.swap(*g as usize, *b as usize);
        }
    }

    fn fpu_bank_swap(&mut self) {
        std::mem::swap(&mut self.fr, &mut self.xf);
    }

    /// Writes SR and runs its side effects: a general-register bank swap
    /// when RB flips, a deferred interrupt refresh request when IMASK or
    /// BL change, and an unprivileged-mode error when MD clears (user
    /// mode unsupported).
    pub fn write_sr(&mut self, new_val: u32) -> SrChangeEffects {
        let old_val = self.regs[Reg::Sr as usize];
        self.regs[Reg::Sr as usize] = new_val;

        let mut effects = SrChangeEffects::default();
        if (old_val & SR_RB_MASK) != (new_val & SR_RB_MASK) {
            self.bank_swap();
            effects.bank_swapped = true;
        }
        const INTC_BITS: u32 = SR_IMASK_MASK | SR_BL_MASK;
        if (old_val & INTC_BITS) != (new_val & INTC_BITS) {
            effects.refresh_requested = true;
        }
        if new_val & SR_MD_MASK == 0 {
            effects.unprivileged_mode_error = true;
        }
        effects
    }

    /// Writes FPSCR, swapping the floating-point register banks when FR
    /// flips, and returns the rounding mode a host FPU context should
    /// adopt.
    pub fn write_fpscr(&mut self, new_val: u32) -> RoundingMode {
        let old_val = self.regs[Reg::Fpscr as usize];
        if (old_val & FPSCR_FR_MASK) != (new_val & FPSCR_FR_MASK) {
            self.fpu_bank_swap();
        }
        self.regs[Reg::Fpscr as usize] = new_val;
        if new_val & FPSCR_RM_MASK != 0 {
            RoundingMode::TowardZero
        } else {
            RoundingMode::Nearest
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_rb_flips_restore_general_registers() {
        let mut regs = RegisterFile::new();
        regs[Reg::R0] = 0x1111;
        regs[Reg::R0Bank] = 0x2222;

        let sr = regs[Reg::Sr];
        regs.write_sr(sr ^ SR_RB_MASK);
        assert_eq!(regs[Reg::R0], 0x2222);
        regs.write_sr(sr);
        assert_eq!(regs[Reg::R0], 0x1111);
    }

    #[test]
    fn sr_write_with_only_imask_changed_requests_refresh_but_not_bank_swap() {
        let mut regs = RegisterFile::new();
        let sr = regs[Reg::Sr] & !SR_IMASK_MASK;
        regs.write_sr(sr);
        let effects = regs.write_sr(sr | (0x3 << SR_IMASK_SHIFT));
        assert!(effects.refresh_requested);
        assert!(!effects.bank_swapped);
    }

    #[test]
    fn sr_write_with_rb_flipped_triggers_bank_swap_exactly_once() {
        let mut regs = RegisterFile::new();
        let sr = regs[Reg::Sr];
        let effects = regs.write_sr(sr ^ SR_RB_MASK);
        assert!(effects.bank_swapped);
    }

    #[test]
    fn clearing_md_reports_unprivileged_mode_error() {
        let mut regs = RegisterFile::new();
        let sr = regs[Reg::Sr];
        let effects = regs.write_sr(sr & !SR_MD_MASK);
        assert!(effects.unprivileged_mode_error);
    }

    #[test]
    fn fpscr_fr_flip_swaps_fr_and_xf_banks() {
        let mut regs = RegisterFile::new();
        regs.set_fr(0, 1.5);
        regs.set_xf(0, 2.5);
        let fpscr = regs[Reg::Fpscr];
        regs.write_fpscr(fpscr ^ FPSCR_FR_MASK);
        assert_eq!(regs.fr(0), 2.5);
        assert_eq!(regs.xf(0), 1.5);
    }

    #[test]
    fn fpscr_rm_bit_selects_rounding_mode() {
        let mut regs = RegisterFile::new();
        assert_eq!(regs.write_fpscr(0x0), RoundingMode::Nearest);
        assert_eq!(regs.write_fpscr(0x1), RoundingMode::TowardZero);
    }
}
