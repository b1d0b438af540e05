// Property-based checks for the round-trip/idempotence invariants spec.md
// §8 calls out explicitly: memory-map read-after-write bit identity,
// scheduler cancel/reschedule/cancel no-ops, and interrupt-refresh
// coalescing.

use proptest::prelude::*;
use std::cell::Cell;
use std::rc::Rc;

use washdc_core::memory::{ram::RamRegion, MemMap, Region, RegionBackend};
use washdc_core::scheduler::{Event, Scheduler};
use washdc_core::sh4::InterruptController;

fn tiny_map() -> MemMap {
    let mut map = MemMap::new();
    map.attach(Region {
        first_addr: 0,
        last_addr: 0xffff,
        mask: 0xffff,
        name: "ram",
        backend: RegionBackend::Ram(RamRegion::new(0x10000)),
    });
    map
}

proptest! {
    #[test]
    fn read_after_write_is_bit_identical_for_any_offset_and_value(offset in 0u32..0x10000, val in any::<u32>()) {
        let mut map = tiny_map();
        let addr = offset & !0x3;
        map.write_u32(addr, val);
        prop_assert_eq!(map.read_u32(addr), val);
    }

    #[test]
    fn cancel_is_idempotent_regardless_of_prior_schedule_count(whens in prop::collection::vec(0u64..1_000_000, 1..20)) {
        let mut sched = Scheduler::new();
        let ev = Event::new(|_, _| {});
        for &w in &whens {
            sched.schedule(&ev, w);
            sched.cancel(&ev);
            prop_assert!(!ev.is_scheduled());
        }
        // cancelling an already-cancelled event is still a silent no-op.
        sched.cancel(&ev);
        prop_assert!(!ev.is_scheduled());
    }

    #[test]
    fn repeated_refresh_requests_before_service_collapse_to_one_fire(now in 0u64..1_000_000, requests in 1usize..10) {
        let mut sched = Scheduler::new();
        let mut intc = InterruptController::new();
        let fire_count = Rc::new(Cell::new(0u32));
        for _ in 0..requests {
            let fire_count = Rc::clone(&fire_count);
            intc.refresh_deferred(&mut sched, now, move |_, _| fire_count.set(fire_count.get() + 1));
        }
        while sched.service_next(now).is_some() {}
        prop_assert_eq!(fire_count.get(), 1);
    }
}
