// SH-4 interrupt controller: per-line callbacks, IPR/ICR priority lookup,
// and a refresh-coalescing scheme for deferred re-evaluation. Lines 0..11
// are on-chip peripheral sources (RTC, TMU, SCI, REF, WDT, HUDI, SCIF,
// DMAC, GPIO); lines 12..15 are the IRL0..IRL3 group that, when
// `ICR.IRLM` is clear, is instead driven by one external 4-bit IRL line.

use super::excp::ExcpCode;
use super::regs::{Reg, RegisterFile, ICR_IRLM_MASK, SR_BL_MASK, SR_IMASK_SHIFT};
use crate::scheduler::{CycleStamp, Event, Scheduler};
use std::rc::Rc;

pub const IRQ_RTC: usize = 0;
pub const IRQ_TMU2: usize = 1;
pub const IRQ_TMU1: usize = 2;
pub const IRQ_TMU0: usize = 3;
pub const IRQ_RESERVED: usize = 4;
pub const IRQ_SCI1: usize = 5;
pub const IRQ_REF: usize = 6;
pub const IRQ_WDT: usize = 7;
pub const IRQ_HUDI: usize = 8;
pub const IRQ_SCIF: usize = 9;
pub const IRQ_DMAC: usize = 10;
pub const IRQ_GPIO: usize = 11;
pub const IRQ_IRL3: usize = 12;
pub const IRQ_IRL2: usize = 13;
pub const IRQ_IRL1: usize = 14;
pub const IRQ_IRL0: usize = 15;
pub const IRQ_COUNT: usize = 16;

/// One resolved pending interrupt: its exception code and the priority
/// (0..15) that won arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingIrq {
    pub code: ExcpCode,
    pub priority: u8,
}

type LineFn = Box<dyn Fn() -> Option<ExcpCode>>;

/// Holds the per-line source callbacks and the external IRL line callback.
/// Each line callback returns `Some(code)` when asserted; `None` when not.
#[derive(Default)]
pub struct InterruptController {
    lines: Vec<Option<LineFn>>,
    irl_line: Option<Box<dyn Fn() -> u8>>,
    refresh_event: Option<Rc<Event>>,
}

/// The four IPR registers, indexed `line / 4`; nibble `line % 4` holds that
/// line's 4-bit priority.
fn ipr_reg_for_line(line: usize) -> Reg {
    match line / 4 {
        0 => Reg::Ipra,
        1 => Reg::Iprb,
        2 => Reg::Iprc,
        _ => Reg::Iprd,
    }
}

fn ext_irq_meta(irl_val: u8) -> Option<(u8, ExcpCode)> {
    if irl_val > 0xe {
        return None;
    }
    Some((15 - irl_val, ExcpCode::Ext(irl_val)))
}

impl InterruptController {
    pub fn new() -> Self {
        let mut lines = Vec::with_capacity(IRQ_COUNT);
        lines.resize_with(IRQ_COUNT, || None);
        InterruptController { lines, irl_line: None, refresh_event: None }
    }

    pub fn register_line(&mut self, line: usize, callback: impl Fn() -> Option<ExcpCode> + 'static) {
        self.lines[line] = Some(Box::new(callback));
    }

    pub fn register_irl_line(&mut self, callback: impl Fn() -> u8 + 'static) {
        self.irl_line = Some(Box::new(callback));
    }

    /// Resolves the next interrupt to take: `None` while `SR.BL` is set;
    /// otherwise the highest-priority asserted line whose priority exceeds
    /// `SR.IMASK`, folding in the external IRL group unless `ICR.IRLM` is
    /// set (in which case IRL0..IRL3 are ordinary GPIO-style lines instead).
    pub fn get_next_irq_line(&self, regs: &RegisterFile) -> Option<PendingIrq> {
        if regs[Reg::Sr] & SR_BL_MASK != 0 {
            return None;
        }

        let imask = (regs[Reg::Sr] >> SR_IMASK_SHIFT) & 0xf;
        let irlm = regs[Reg::Icr] & ICR_IRLM_MASK != 0;
        let last_line = if irlm { IRQ_COUNT - 1 } else { IRQ_GPIO_LAST };

        let mut best: Option<PendingIrq> = None;
        for line in 0..=last_line {
            let Some(cb) = &self.lines[line] else { continue };
            let Some(code) = cb() else { continue };
            let reg = ipr_reg_for_line(line);
            let shift = 4 * (line % 4) as u32;
            let prio = ((regs[reg] >> shift) & 0xf) as u8;
            if (prio as u32) <= imask {
                continue;
            }
            if best.map_or(true, |b| prio > b.priority) {
                best = Some(PendingIrq { code, priority: prio });
            }
        }

        if !irlm {
            let irl_val = self.irl_line.as_ref().map_or(0xf, |f| f() & 0xf);
            if let Some((prio, code)) = ext_irq_meta(irl_val) {
                if (prio as u32) > imask && best.map_or(true, |b| prio > b.priority) {
                    best = Some(PendingIrq { code, priority: prio });
                }
            }
        }

        best
    }

    /// Posts one idempotent refresh event at the current cycle stamp.
    /// Repeated calls before the event fires collapse to a single
    /// re-evaluation.
    pub fn refresh_deferred(&mut self, sched: &mut Scheduler, now: CycleStamp, on_fire: impl Fn(&Event, CycleStamp) + 'static) {
        if self.refresh_event.as_ref().map_or(false, |e| e.is_scheduled()) {
            return;
        }
        let event = Event::new(on_fire);
        sched.schedule(&event, now);
        self.refresh_event = Some(event);
    }
}

const IRQ_GPIO_LAST: usize = IRQ_GPIO;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bl_set_masks_every_line() {
        let mut intc = InterruptController::new();
        intc.register_line(IRQ_TMU0, || Some(ExcpCode::Tmu0Tuni0));
        let mut regs = RegisterFile::new();
        regs.write_sr(SR_BL_MASK);
        assert_eq!(intc.get_next_irq_line(&regs), None);
    }

    #[test]
    fn clearing_bl_reveals_highest_enabled_priority() {
        let mut intc = InterruptController::new();
        intc.register_line(IRQ_TMU0, || Some(ExcpCode::Tmu0Tuni0));
        intc.register_line(IRQ_TMU1, || Some(ExcpCode::Tmu1Tuni1));
        let mut regs = RegisterFile::new();
        regs.write_sr(0);
        regs[Reg::Ipra] = 0x0;
        regs[Reg::Iprb] = 0x0;
        regs[Reg::Iprc] = 0x7 << 8; // line 2 (TMU1) priority 7
        let pending = intc.get_next_irq_line(&regs).expect("expected a pending irq");
        assert_eq!(pending.code, ExcpCode::Tmu1Tuni1);
        assert_eq!(pending.priority, 7);
    }

    #[test]
    fn priority_at_or_below_imask_is_not_taken() {
        let mut intc = InterruptController::new();
        intc.register_line(IRQ_TMU0, || Some(ExcpCode::Tmu0Tuni0));
        let mut regs = RegisterFile::new();
        regs.write_sr(0xf << SR_IMASK_SHIFT);
        regs[Reg::Iprc] = 0xf << 8;
        assert_eq!(intc.get_next_irq_line(&regs), None);
    }

    #[test]
    fn external_irl_line_maps_value_to_priority_and_code() {
        let mut intc = InterruptController::new();
        intc.register_irl_line(|| 0x0);
        let mut regs = RegisterFile::new();
        regs.write_sr(0);
        regs[Reg::Icr] = 0; // IRLM clear: external IRL group active
        let pending = intc.get_next_irq_line(&regs).unwrap();
        assert_eq!(pending.priority, 15);
        assert_eq!(pending.code, ExcpCode::Ext(0));
    }

    #[test]
    fn irl_value_of_0xf_means_no_interrupt() {
        let mut intc = InterruptController::new();
        intc.register_irl_line(|| 0xf);
        let mut regs = RegisterFile::new();
        regs.write_sr(0);
        regs[Reg::Icr] = 0;
        assert_eq!(intc.get_next_irq_line(&regs), None);
    }

    #[test]
    fn refresh_deferred_is_idempotent_within_one_tick() {
        let mut intc = InterruptController::new();
        let mut sched = Scheduler::new();
        let fire_count = Rc::new(std::cell::Cell::new(0));
        let fc = Rc::clone(&fire_count);
        intc.refresh_deferred(&mut sched, 10, move |_, _| fc.set(fc.get() + 1));
        intc.refresh_deferred(&mut sched, 10, |_, _| panic!("second registration should not replace pending event"));
        intc.refresh_deferred(&mut sched, 10, |_, _| panic!("third registration should not replace pending event"));
        sched.service_next(10);
        assert_eq!(fire_count.get(), 1);
    }
}
