// The event scheduler: a sorted list of timed callbacks driving every
// time-dependent peripheral (SPG raster timing, the interrupt-refresh
// coalescer, the render-complete interrupt, ...). The population is tens
// of events -- one per hardware module -- so linear-scan insertion is
// plenty; no heap is needed. Ordering mirrors the teacher's device
// `update(&CPU) -> Signal` sweep in `devices.rs`, generalized from "poll
// every device every tick" to "advance to the next timestamp and fire only
// what's due".

use std::cell::Cell;
use std::rc::Rc;

pub type CycleStamp = u64;

/// A scheduled callback. Events are owned by whoever creates them (a
/// device, the SPG, ...); the scheduler only holds a reference and tracks
/// list membership through `scheduled`. Re-scheduling an event that is
/// already in the list is a programming error and panics with an
/// integrity message, matching spec.md's "double-schedule is a fatal
/// integrity error."
pub struct Event {
    pub when: Cell<CycleStamp>,
    scheduled: Cell<bool>,
    handler: Box<dyn Fn(&Event, CycleStamp)>,
}

impl Event {
    pub fn new(handler: impl Fn(&Event, CycleStamp) + 'static) -> Rc<Event> {
        Rc::new(Event { when: Cell::new(0), scheduled: Cell::new(false), handler: Box::new(handler) })
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.get()
    }
}

/// Intrusively-sorted-by-insertion list of pending events, ordered by
/// `when` ascending with FIFO tie-breaking. Events are `Rc`-shared with
/// their owner; the scheduler does not own them, matching spec.md §3's
/// "user-allocated" lifecycle.
#[derive(Default)]
pub struct Scheduler {
    pending: Vec<Rc<Event>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler { pending: Vec::new() }
    }

    /// Inserts `event` so the list stays sorted by `when` ascending, ties
    /// broken FIFO. Panics if `event` is already scheduled.
    pub fn schedule(&mut self, event: &Rc<Event>, when: CycleStamp) {
        if event.scheduled.get() {
            panic!("integrity: event scheduled twice");
        }
        event.when.set(when);
        event.scheduled.set(true);
        let pos = self.pending.iter().position(|e| e.when.get() > when).unwrap_or(self.pending.len());
        self.pending.insert(pos, Rc::clone(event));
    }

    /// Removes `event` from the list. Silently a no-op if the event was
    /// not scheduled, so coalescing call sites (e.g. the interrupt
    /// refresh) can cancel defensively.
    pub fn cancel(&mut self, event: &Rc<Event>) {
        if !event.scheduled.get() {
            return;
        }
        if let Some(pos) = self.pending.iter().position(|e| Rc::ptr_eq(e, event)) {
            self.pending.remove(pos);
        }
        event.scheduled.set(false);
    }

    pub fn peek(&self) -> Option<&Rc<Event>> {
        self.pending.first()
    }

    /// Removes and returns the earliest-due event, if any, already marked
    /// idle.
    pub fn pop(&mut self) -> Option<Rc<Event>> {
        if self.pending.is_empty() {
            return None;
        }
        let event = self.pending.remove(0);
        event.scheduled.set(false);
        Some(event)
    }

    /// Pops the next event (if due by `now`) and runs its handler with
    /// `max(now, event.when)`, mirroring spec.md §5's "the scheduler
    /// advances time to max(now, event.when)".
    pub fn service_next(&mut self, now: CycleStamp) -> Option<CycleStamp> {
        let due = self.peek().map(|e| e.when.get())?;
        if due > now {
            return None;
        }
        let event = self.pop()?;
        let stamp = due.max(now);
        (event.handler)(&event, stamp);
        Some(stamp)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn pop_order_matches_insertion_order_for_ties() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut sched = Scheduler::new();
        let whens = [100u64, 50, 200, 50, 75];
        let mut events = Vec::new();
        for (idx, &w) in whens.iter().enumerate() {
            let order = Rc::clone(&order);
            let ev = Event::new(move |_, _| order.borrow_mut().push(idx));
            events.push(ev);
        }
        for (ev, &w) in events.iter().zip(whens.iter()) {
            sched.schedule(ev, w);
        }
        let mut popped = Vec::new();
        while let Some(ev) = sched.pop() {
            popped.push(ev.when.get());
        }
        assert_eq!(popped, vec![50, 50, 75, 100, 200]);
    }

    #[test]
    fn cancel_then_reschedule_then_cancel_is_a_no_op() {
        let mut sched = Scheduler::new();
        let ev = Event::new(|_, _| {});
        sched.schedule(&ev, 10);
        sched.cancel(&ev);
        assert!(sched.is_empty());
        sched.schedule(&ev, 20);
        sched.cancel(&ev);
        assert!(sched.is_empty());
    }

    #[test]
    fn cancel_of_unscheduled_event_is_silent_no_op() {
        let mut sched = Scheduler::new();
        let ev = Event::new(|_, _| {});
        sched.cancel(&ev);
        assert!(sched.is_empty());
    }

    #[test]
    #[should_panic(expected = "integrity")]
    fn double_schedule_panics() {
        let mut sched = Scheduler::new();
        let ev = Event::new(|_, _| {});
        sched.schedule(&ev, 1);
        sched.schedule(&ev, 2);
    }

    #[test]
    fn service_next_advances_to_max_of_now_and_when() {
        let mut sched = Scheduler::new();
        let fired_at = Rc::new(Cell::new(0u64));
        let fa = Rc::clone(&fired_at);
        let ev = Event::new(move |_, stamp| fa.set(stamp));
        sched.schedule(&ev, 10);
        let stamp = sched.service_next(15).unwrap();
        assert_eq!(stamp, 15);
        assert_eq!(fired_at.get(), 15);
    }
}
