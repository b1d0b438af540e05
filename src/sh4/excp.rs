// SH-4 exception codes, their compile-time metadata, and `enter_exception`.

use super::regs::{Reg, RegisterFile, SR_BL_MASK, SR_FD_MASK, SR_MD_MASK, SR_RB_MASK};
use crate::error::{ErrorKind, WashError, WashResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcpCode {
    PowerOnReset,
    ManualReset,
    HudiReset,
    InstTlbMultHit,
    DataTlbMultHit,
    UserBreakBefore,
    InstAddrErr,
    InstTlbMiss,
    InstTlbProtViol,
    GenIllegalInst,
    SlotIllegalInst,
    GenFpuDisable,
    SlotFpuDisable,
    DataAddrRead,
    DataAddrWrite,
    DataTlbReadMiss,
    DataTlbWriteMiss,
    DataTlbReadProtViol,
    DataTlbWriteProtViol,
    Fpu,
    InitialPageWrite,
    UnconditionalTrap,
    UserBreakAfter,
    Nmi,
    Ext(u8), // 0x0..=0xe, IRL/external interrupt lines
    Tmu0Tuni0,
    Tmu1Tuni1,
    Tmu2Tuni2,
    Tmu2Ticpi2,
    RtcAti,
    RtcPri,
    RtcCui,
    SciEri,
    SciRxi,
    SciTxi,
    SciTei,
    WdtIti,
    RefRcmi,
    RefRovi,
    HudiHudi,
    GpioGpioi,
}

pub struct ExcpMeta {
    pub name: &'static str,
    pub prio_level: u8,
    pub prio_order: u8,
    pub offset: u32,
}

impl ExcpCode {
    /// Metadata indexed by code: name, priority level (1..4), intra-level
    /// ordinal, and VBR offset.
    pub fn meta(self) -> ExcpMeta {
        use ExcpCode::*;
        match self {
            PowerOnReset => ExcpMeta { name: "power_on_reset", prio_level: 1, prio_order: 1, offset: 0 },
            ManualReset => ExcpMeta { name: "manual_reset", prio_level: 1, prio_order: 2, offset: 0 },
            HudiReset => ExcpMeta { name: "hudi_reset", prio_level: 1, prio_order: 1, offset: 0 },
            InstTlbMultHit => ExcpMeta { name: "inst_tlb_mult_hit", prio_level: 1, prio_order: 3, offset: 0 },
            DataTlbMultHit => ExcpMeta { name: "data_tlb_mult_hit", prio_level: 1, prio_order: 4, offset: 0 },
            UserBreakBefore => ExcpMeta { name: "user_break_before", prio_level: 2, prio_order: 0, offset: 0x100 },
            InstAddrErr => ExcpMeta { name: "inst_addr_err", prio_level: 2, prio_order: 1, offset: 0x100 },
            InstTlbMiss => ExcpMeta { name: "inst_tlb_miss", prio_level: 2, prio_order: 2, offset: 0x400 },
            InstTlbProtViol => ExcpMeta { name: "inst_tlb_prot_viol", prio_level: 2, prio_order: 3, offset: 0x100 },
            GenIllegalInst => ExcpMeta { name: "gen_illegal_inst", prio_level: 2, prio_order: 4, offset: 0x100 },
            SlotIllegalInst => ExcpMeta { name: "slot_illegal_inst", prio_level: 2, prio_order: 4, offset: 0x100 },
            GenFpuDisable => ExcpMeta { name: "gen_fpu_disable", prio_level: 2, prio_order: 4, offset: 0x100 },
            SlotFpuDisable => ExcpMeta { name: "slot_fpu_disable", prio_level: 2, prio_order: 4, offset: 0x100 },
            DataAddrRead => ExcpMeta { name: "data_addr_read", prio_level: 2, prio_order: 5, offset: 0x100 },
            DataAddrWrite => ExcpMeta { name: "data_addr_write", prio_level: 2, prio_order: 5, offset: 0x100 },
            DataTlbReadMiss => ExcpMeta { name: "data_tlb_read_miss", prio_level: 2, prio_order: 6, offset: 0x400 },
            DataTlbWriteMiss => ExcpMeta { name: "data_tlb_write_miss", prio_level: 2, prio_order: 6, offset: 0x400 },
            DataTlbReadProtViol => {
                ExcpMeta { name: "data_tlb_read_prot_viol", prio_level: 2, prio_order: 7, offset: 0x100 }
            }
            DataTlbWriteProtViol => {
                ExcpMeta { name: "data_tlb_write_prot_viol", prio_level: 2, prio_order: 7, offset: 0x100 }
            }
            Fpu => ExcpMeta { name: "fpu", prio_level: 2, prio_order: 8, offset: 0x100 },
            InitialPageWrite => ExcpMeta { name: "initial_page_write", prio_level: 2, prio_order: 9, offset: 0x100 },
            UnconditionalTrap => {
                ExcpMeta { name: "unconditional_trap", prio_level: 2, prio_order: 4, offset: 0x100 }
            }
            UserBreakAfter => ExcpMeta { name: "user_break_after", prio_level: 2, prio_order: 10, offset: 0x100 },
            Nmi => ExcpMeta { name: "nmi", prio_level: 3, prio_order: 0, offset: 0x600 },
            Ext(_) => ExcpMeta { name: "ext", prio_level: 4, prio_order: 2, offset: 0x600 },
            Tmu0Tuni0 => ExcpMeta { name: "tmu0_tuni0", prio_level: 4, prio_order: 2, offset: 0x600 },
            Tmu1Tuni1 => ExcpMeta { name: "tmu1_tuni1", prio_level: 4, prio_order: 2, offset: 0x600 },
            Tmu2Tuni2 => ExcpMeta { name: "tmu2_tuni2", prio_level: 4, prio_order: 2, offset: 0x600 },
            Tmu2Ticpi2 => ExcpMeta { name: "tmu2_ticpi2", prio_level: 4, prio_order: 2, offset: 0x600 },
            RtcAti => ExcpMeta { name: "rtc_ati", prio_level: 4, prio_order: 2, offset: 0x600 },
            RtcPri => ExcpMeta { name: "rtc_pri", prio_level: 4, prio_order: 2, offset: 0x600 },
            RtcCui => ExcpMeta { name: "rtc_cui", prio_level: 4, prio_order: 2, offset: 0x600 },
            SciEri => ExcpMeta { name: "sci_eri", prio_level: 4, prio_order: 2, offset: 0x600 },
            SciRxi => ExcpMeta { name: "sci_rxi", prio_level: 4, prio_order: 2, offset: 0x600 },
            SciTxi => ExcpMeta { name: "sci_txi", prio_level: 4, prio_order: 2, offset: 0x600 },
            SciTei => ExcpMeta { name: "sci_tei", prio_level: 4, prio_order: 2, offset: 0x600 },
            WdtIti => ExcpMeta { name: "wdt_iti", prio_level: 4, prio_order: 2, offset: 0x600 },
            RefRcmi => ExcpMeta { name: "ref_rcmi", prio_level: 4, prio_order: 2, offset: 0x600 },
            RefRovi => ExcpMeta { name: "ref_rovi", prio_level: 4, prio_order: 2, offset: 0x600 },
            HudiHudi => ExcpMeta { name: "hudi_hudi", prio_level: 4, prio_order: 2, offset: 0x600 },
            GpioGpioi => ExcpMeta { name: "gpio_gpioi", prio_level: 4, prio_order: 2, offset: 0x600 },
        }
    }

    fn is_reset_family(self) -> bool {
        matches!(self, ExcpCode::PowerOnReset | ExcpCode::ManualReset | ExcpCode::HudiReset | ExcpCode::InstTlbMultHit)
    }
}

/// Enters an exception: saves `SPC`/`SSR`/`SGR`, sets `BL|MD|RB` and clears
/// `FD` in SR (routing through `write_sr` so bank swap and
/// refresh-coalescing side effects fire exactly as a normal SR write
/// would), then sets PC to either the reset vector or `VBR + offset`.
///
/// Raising an exception while a delayed branch is pending is an integrity
/// error -- whatever trapped should never have left `delayed_branch` set.
pub fn enter_exception(regs: &mut RegisterFile, code: ExcpCode) -> WashResult<()> {
    if regs.delayed_branch {
        return Err(crate::raise_error!(ErrorKind::Integrity)
            .with_str("detail", "exception raised with delayed_branch set"));
    }

    let meta = code.meta();

    regs[Reg::Spc] = regs[Reg::Pc];
    regs[Reg::Ssr] = regs[Reg::Sr];
    regs[Reg::Sgr] = regs[Reg::R15];

    let new_sr = (regs[Reg::Sr] | SR_BL_MASK | SR_MD_MASK | SR_RB_MASK) & !SR_FD_MASK;
    regs.write_sr(new_sr);

    regs[Reg::Pc] = if code.is_reset_family() { 0xa000_0000 } else { regs[Reg::Vbr] + meta.offset };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_family_vectors_to_fixed_address() {
        let mut regs = RegisterFile::new();
        enter_exception(&mut regs, ExcpCode::ManualReset).unwrap();
        assert_eq!(regs[Reg::Pc], 0xa000_0000);
    }

    #[test]
    fn general_exception_vectors_to_vbr_plus_offset() {
        let mut regs = RegisterFile::new();
        regs[Reg::Vbr] = 0x8c00_0000;
        let pc_before = 0x8c01_0000;
        regs[Reg::Pc] = pc_before;
        enter_exception(&mut regs, ExcpCode::GenIllegalInst).unwrap();
        assert_eq!(regs[Reg::Pc], 0x8c00_0000 + 0x100);
        assert_eq!(regs[Reg::Spc], pc_before);
    }

    #[test]
    fn tlb_miss_vectors_to_vbr_plus_0x400() {
        let mut regs = RegisterFile::new();
        regs[Reg::Vbr] = 0;
        enter_exception(&mut regs, ExcpCode::DataTlbReadMiss).unwrap();
        assert_eq!(regs[Reg::Pc], 0x400);
    }

    #[test]
    fn delayed_branch_pending_is_an_integrity_error() {
        let mut regs = RegisterFile::new();
        regs.delayed_branch = true;
        let err = enter_exception(&mut regs, ExcpCode::GenIllegalInst).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Integrity);
    }

    #[test]
    fn entry_sets_bl_md_rb_and_clears_fd() {
        let mut regs = RegisterFile::new();
        regs.write_sr(0);
        enter_exception(&mut regs, ExcpCode::GenIllegalInst).unwrap();
        let sr = regs[Reg::Sr];
        assert_ne!(sr & SR_BL_MASK, 0);
        assert_ne!(sr & SR_MD_MASK, 0);
        assert_ne!(sr & SR_RB_MASK, 0);
        assert_eq!(sr & SR_FD_MASK, 0);
    }
}
