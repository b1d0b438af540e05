// The SH-4 CPU: register file, interrupt controller, operand-cache RAM,
// store queues and TLBs, plus the P0-P4 address-space folding the system
// bus sits behind.

pub mod cache;
pub mod excp;
pub mod intc;
pub mod regs;
pub mod sq;
pub mod tlb;

pub use cache::OperandCache;
pub use excp::{enter_exception, ExcpCode};
pub use intc::InterruptController;
pub use regs::{Reg, RegisterFile, RoundingMode};
pub use sq::StoreQueue;
pub use tlb::{Tlb, TlbAccess, TlbEntry};

/// P4's cache-address-array window: reads return zero, writes are
/// discarded. Guest software pokes these registers but never depends on
/// what comes back.
pub const CACHE_ADDR_ARRAY_START: u32 = 0xf400_0000;
pub const CACHE_ADDR_ARRAY_END: u32 = 0xf4ff_ffff;

pub fn is_cache_addr_array(addr: u32) -> bool {
    (CACHE_ADDR_ARRAY_START..=CACHE_ADDR_ARRAY_END).contains(&addr)
}

/// The store-queue virtual window, per the `0xe0000000` area the guest
/// writes through to reach `StoreQueue`.
pub const SQ_AREA_MASK: u32 = 0xfc00_0000;
pub const SQ_AREA_VAL: u32 = 0xe000_0000;

pub fn is_store_queue_addr(addr: u32) -> bool {
    addr & SQ_AREA_MASK == SQ_AREA_VAL
}

/// Folds P1 (kernel cached), P2 (uncached) and P3 (cached write-through)
/// addresses down onto their P0 equivalent on the system bus. P4 and P0
/// itself pass through unchanged.
pub fn strip_p_area(addr: u32) -> u32 {
    match addr {
        0x8000_0000..=0xbfff_ffff => addr & 0x1fff_ffff,
        0xc000_0000..=0xdfff_ffff => addr & 0x1fff_ffff,
        _ => addr,
    }
}

pub struct Sh4 {
    pub regs: RegisterFile,
    pub intc: InterruptController,
    pub ocache: OperandCache,
    pub sq: StoreQueue,
    pub utlb: Tlb,
    pub itlb: Tlb,
}

impl Default for Sh4 {
    fn default() -> Self {
        Sh4 {
            regs: RegisterFile::new(),
            intc: InterruptController::new(),
            ocache: OperandCache::new(),
            sq: StoreQueue::new(),
            utlb: Tlb::utlb(),
            itlb: Tlb::itlb(),
        }
    }
}

impl Sh4 {
    pub fn new() -> Self {
        Self::default()
    }

    /// The exception the debugger's single-step/breakpoint hook would see
    /// if it checked right now: whatever `intc` currently resolves as the
    /// next interrupt, without taking it. `enter_exception` is still the
    /// only thing that actually transfers control.
    pub fn pending_exception(&self) -> Option<ExcpCode> {
        self.intc.get_next_irq_line(&self.regs).map(|p| p.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p1_p2_p3_all_fold_onto_the_same_p0_address() {
        let p0 = 0x0c00_1234;
        assert_eq!(strip_p_area(0x8c00_1234), p0);
        assert_eq!(strip_p_area(0xac00_1234), p0);
        assert_eq!(strip_p_area(0xcc00_1234), p0);
    }

    #[test]
    fn p4_addresses_pass_through_unchanged() {
        assert_eq!(strip_p_area(0xe000_0020), 0xe000_0020);
    }

    #[test]
    fn cache_address_array_window_is_recognized() {
        assert!(is_cache_addr_array(0xf450_0000));
        assert!(!is_cache_addr_array(0xf300_0000));
    }

    #[test]
    fn store_queue_window_is_recognized() {
        assert!(is_store_queue_addr(0xe000_0000));
        assert!(!is_store_queue_addr(0xe400_0000));
    }
}
