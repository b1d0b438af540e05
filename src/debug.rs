// A debugger attachment point: present but inert until a front-end
// registers interest, per spec.md §5's "the debugger hook is ambient
// infrastructure, not a feature gated behind a build flag." Grounded on
// `original_source/src/libwashdc/dbg/debugger.c`'s break/continue/
// single-step/detach request flags, generalized from that file's global
// statics into an owned, `Arc`-shareable handle so a front-end running on
// another thread can request a break without the core depending on any
// particular UI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// What the core should do the next time it checks in with the debugger,
/// decided by `DebugHandle::poll` after a break request lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    Run,
    SingleStep,
    Detach,
}

struct Inner {
    paused: Mutex<bool>,
    resume: Condvar,
}

/// Shared between the emulation core and a front-end (gdb stub, TUI,
/// whatever). All flags are `AtomicBool`s so a front-end thread can poke
/// them without taking a lock the core might be holding mid-instruction.
#[derive(Clone)]
pub struct DebugHandle {
    request_break: Arc<AtomicBool>,
    request_continue: Arc<AtomicBool>,
    request_detach: Arc<AtomicBool>,
    request_single_step: Arc<AtomicBool>,
    attached: Arc<AtomicBool>,
    inner: Arc<Inner>,
}

impl DebugHandle {
    pub fn new() -> Self {
        DebugHandle {
            request_break: Arc::new(AtomicBool::new(false)),
            request_continue: Arc::new(AtomicBool::new(false)),
            request_detach: Arc::new(AtomicBool::new(false)),
            request_single_step: Arc::new(AtomicBool::new(false)),
            attached: Arc::new(AtomicBool::new(false)),
            inner: Arc::new(Inner { paused: Mutex::new(false), resume: Condvar::new() }),
        }
    }

    pub fn attach(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Front-end side: ask the core to stop at its next instruction
    /// boundary.
    pub fn request_break(&self) {
        self.request_break.store(true, Ordering::SeqCst);
    }

    pub fn request_single_step(&self) {
        self.request_single_step.store(true, Ordering::SeqCst);
    }

    pub fn request_detach(&self) {
        self.request_detach.store(true, Ordering::SeqCst);
    }

    /// Front-end side: release the core from `wait_while_paused`.
    pub fn request_continue(&self) {
        self.request_continue.store(true, Ordering::SeqCst);
        *self.inner.paused.lock().unwrap() = false;
        self.inner.resume.notify_all();
    }

    /// Core side: called at each instruction boundary. Returns the action
    /// to take this step, clearing `request_single_step` if it was set
    /// (single-step is a one-shot request, unlike `request_break`, which
    /// stays until the front-end explicitly continues).
    pub fn poll(&self) -> DebugAction {
        if !self.attached.load(Ordering::SeqCst) {
            return DebugAction::Run;
        }
        if self.request_detach.swap(false, Ordering::SeqCst) {
            self.attached.store(false, Ordering::SeqCst);
            return DebugAction::Detach;
        }
        if self.request_single_step.swap(false, Ordering::SeqCst) {
            return DebugAction::SingleStep;
        }
        DebugAction::Run
    }

    /// Core side: blocks until the front-end calls `request_continue`.
    /// Called once `poll` (or an explicit breakpoint hit) decides the
    /// core should stop.
    pub fn wait_while_paused(&self) {
        self.request_continue.store(false, Ordering::SeqCst);
        let mut paused = self.inner.paused.lock().unwrap();
        *paused = true;
        while *paused && !self.request_continue.load(Ordering::SeqCst) {
            paused = self.inner.resume.wait(paused).unwrap();
        }
    }

    pub fn should_break(&self) -> bool {
        self.attached.load(Ordering::SeqCst) && self.request_break.swap(false, Ordering::SeqCst)
    }
}

impl Default for DebugHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_is_a_no_op_when_nothing_is_attached() {
        let dbg = DebugHandle::new();
        assert_eq!(dbg.poll(), DebugAction::Run);
    }

    #[test]
    fn single_step_request_is_consumed_exactly_once() {
        let dbg = DebugHandle::new();
        dbg.attach();
        dbg.request_single_step();
        assert_eq!(dbg.poll(), DebugAction::SingleStep);
        assert_eq!(dbg.poll(), DebugAction::Run);
    }

    #[test]
    fn detach_clears_attached_state() {
        let dbg = DebugHandle::new();
        dbg.attach();
        dbg.request_detach();
        assert_eq!(dbg.poll(), DebugAction::Detach);
        assert!(!dbg.is_attached());
    }

    #[test]
    fn should_break_fires_once_per_request() {
        let dbg = DebugHandle::new();
        dbg.attach();
        dbg.request_break();
        assert!(dbg.should_break());
        assert!(!dbg.should_break());
    }

    #[test]
    fn continue_releases_a_paused_waiter() {
        let dbg = DebugHandle::new();
        dbg.attach();
        let waiter = dbg.clone();
        let handle = std::thread::spawn(move || waiter.wait_while_paused());
        while !*dbg.inner.paused.lock().unwrap() {
            std::thread::yield_now();
        }
        dbg.request_continue();
        handle.join().unwrap();
    }
}
