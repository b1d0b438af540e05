// Sync Pulse Generator: tracks the current raster position from elapsed
// cycles and schedules HBLANK/VBLANK-in/VBLANK-out events. The 27 MHz
// pixel clock does not divide evenly into the 200 MHz base cycle rate, so
// raster timing here ticks on a fixed 7-cycle divisor and accepts the
// resulting ~6% error rather than accumulating fractional cycles.

use crate::scheduler::{CycleStamp, Event, Scheduler};
use std::rc::Rc;

pub const VCLK_DIV: u64 = 7;

pub struct Spg {
    pub hblank_int: u32,
    pub vblank_int: u32,
    pub load: u32,
    pub control: u32,
    pub pclk_div: u64,
    raster_x: u32,
    raster_y: u32,
    last_sync: CycleStamp,
    hblank_event: Option<Rc<Event>>,
    vblank_in_event: Option<Rc<Event>>,
    vblank_out_event: Option<Rc<Event>>,
}

impl Default for Spg {
    fn default() -> Self {
        Spg {
            hblank_int: 0x31d << 16,
            vblank_int: 0x0015_0104,
            load: (0x106 << 16) | 0x359,
            control: 0,
            pclk_div: 2,
            raster_x: 0,
            raster_y: 0,
            last_sync: 0,
            hblank_event: None,
            vblank_in_event: None,
            vblank_out_event: None,
        }
    }
}

impl Spg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raster_pos(&self) -> (u32, u32) {
        (self.raster_x, self.raster_y)
    }

    pub fn hcount(&self) -> u32 {
        (self.load & 0x3ff) + 1
    }
    pub fn vcount(&self) -> u32 {
        ((self.load >> 16) & 0x3ff) + 1
    }
    fn hblank_int_mode(&self) -> u32 {
        (self.hblank_int >> 12) & 0x3
    }
    fn hblank_int_comp_val(&self) -> u32 {
        self.hblank_int & 0x3ff
    }
    fn vblank_in_line(&self) -> u32 {
        self.vblank_int & 0x3ff
    }
    fn vblank_out_line(&self) -> u32 {
        (self.vblank_int >> 16) & 0x3ff
    }

    /// Advances `(raster_x, raster_y)` by the pixels elapsed since the
    /// last sync, given the current base-cycle stamp.
    pub fn sync(&mut self, now: CycleStamp) {
        let delta_cycles = now - self.last_sync;
        self.last_sync = now;
        let hcount = self.hcount() as u64;
        let vcount = self.vcount() as u64;
        let delta_pixels = delta_cycles / self.pclk_div;
        let mut x = self.raster_x as u64 + delta_pixels;
        let mut y = self.raster_y as u64 + x / hcount;
        x %= hcount;
        y %= vcount;
        self.raster_x = x as u32;
        self.raster_y = y as u32;
    }

    fn video_clk_cycles(&self, now: CycleStamp, pixels_from_now: u64) -> CycleStamp {
        let divisor = VCLK_DIV * self.pclk_div;
        divisor * (pixels_from_now + now / divisor)
    }

    fn next_hblank_pixels(&self) -> u64 {
        let hcount = self.hcount() as u64;
        let vcount = self.vcount() as u64;
        let y = self.raster_y as u64;
        let x = self.raster_x as u64;
        match self.hblank_int_mode() {
            0 => {
                let comp = self.hblank_int_comp_val() as u64;
                if comp <= y {
                    (vcount - y + comp) * hcount - x
                } else {
                    (comp - y) * hcount - x
                }
            }
            1 => {
                let comp = self.hblank_int_comp_val() as u64;
                let next_line = (1 + (y + 1) / comp) * comp - 1;
                if next_line < vcount {
                    (next_line - y) * hcount - x
                } else {
                    (vcount - y + next_line) * hcount - x
                }
            }
            _ => hcount - x,
        }
    }

    fn next_vblank_in_pixels(&self) -> u64 {
        let hcount = self.hcount() as u64;
        let vcount = self.vcount() as u64;
        let y = self.raster_y as u64;
        let line = self.vblank_in_line() as u64;
        let lines = if y <= line { vcount - y + line } else { line - y };
        lines * hcount - self.raster_x as u64
    }

    fn next_vblank_out_pixels(&self) -> u64 {
        let hcount = self.hcount() as u64;
        let vcount = self.vcount() as u64;
        let y = self.raster_y as u64;
        let line = self.vblank_out_line() as u64;
        let lines = if y < line { line - y } else { vcount - y + line };
        lines * hcount - self.raster_x as u64
    }

    fn reschedule(&mut self, sched: &mut Scheduler, now: CycleStamp, on_hblank: impl Fn(&Event, CycleStamp) + 'static, on_vblank_in: impl Fn(&Event, CycleStamp) + 'static, on_vblank_out: impl Fn(&Event, CycleStamp) + 'static) {
        let hblank_when = self.video_clk_cycles(now, self.next_hblank_pixels());
        let vblank_in_when = self.video_clk_cycles(now, self.next_vblank_in_pixels());
        let vblank_out_when = self.video_clk_cycles(now, self.next_vblank_out_pixels());

        let hblank_event = Event::new(on_hblank);
        sched.schedule(&hblank_event, hblank_when);
        self.hblank_event = Some(hblank_event);

        let vblank_in_event = Event::new(on_vblank_in);
        sched.schedule(&vblank_in_event, vblank_in_when);
        self.vblank_in_event = Some(vblank_in_event);

        let vblank_out_event = Event::new(on_vblank_out);
        sched.schedule(&vblank_out_event, vblank_out_when);
        self.vblank_out_event = Some(vblank_out_event);
    }

    pub fn unschedule_all(&mut self, sched: &mut Scheduler) {
        if let Some(e) = self.hblank_event.take() {
            sched.cancel(&e);
        }
        if let Some(e) = self.vblank_in_event.take() {
            sched.cancel(&e);
        }
        if let Some(e) = self.vblank_out_event.take() {
            sched.cancel(&e);
        }
    }

    /// First-time scheduling of all three raster events, e.g. at power-on.
    pub fn schedule_all(&mut self, sched: &mut Scheduler, now: CycleStamp, on_hblank: impl Fn(&Event, CycleStamp) + 'static, on_vblank_in: impl Fn(&Event, CycleStamp) + 'static, on_vblank_out: impl Fn(&Event, CycleStamp) + 'static) {
        self.reschedule(sched, now, on_hblank, on_vblank_in, on_vblank_out);
    }

    /// Writes one of the SPG_HBLANK_INT/SPG_VBLANK_INT/SPG_LOAD registers:
    /// syncs, cancels all three scheduled events, commits the write, then
    /// reschedules all three against the new timing.
    pub fn write_timing_reg(
        &mut self,
        sched: &mut Scheduler,
        now: CycleStamp,
        set: impl FnOnce(&mut Self),
        on_hblank: impl Fn(&Event, CycleStamp) + 'static,
        on_vblank_in: impl Fn(&Event, CycleStamp) + 'static,
        on_vblank_out: impl Fn(&Event, CycleStamp) + 'static,
    ) {
        self.sync(now);
        self.unschedule_all(sched);
        set(self);
        self.sync(now);
        self.reschedule(sched, now, on_hblank, on_vblank_in, on_vblank_out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn sync_advances_raster_position_and_wraps_lines() {
        let mut spg = Spg::new();
        spg.pclk_div = 1;
        let hcount = spg.hcount() as u64;
        spg.sync(hcount * VCLK_DIV + 5 * VCLK_DIV);
        assert_eq!(spg.raster_pos(), (5, 1));
    }

    #[test]
    fn writing_a_timing_register_reschedules_all_three_events() {
        let mut spg = Spg::new();
        let mut sched = Scheduler::new();
        let fires = Rc::new(Cell::new(0));
        let f1 = Rc::clone(&fires);
        let f2 = Rc::clone(&fires);
        let f3 = Rc::clone(&fires);
        spg.schedule_all(
            &mut sched,
            0,
            move |_, _| f1.set(f1.get() + 1),
            move |_, _| f2.set(f2.get() + 1),
            move |_, _| f3.set(f3.get() + 1),
        );
        let f1b = Rc::clone(&fires);
        let f2b = Rc::clone(&fires);
        let f3b = Rc::clone(&fires);
        spg.write_timing_reg(
            &mut sched,
            0,
            |s| s.load = (0x020 << 16) | 0x100,
            move |_, _| f1b.set(f1b.get() + 1),
            move |_, _| f2b.set(f2b.get() + 1),
            move |_, _| f3b.set(f3b.get() + 1),
        );
        assert!(!sched.is_empty());
    }
}
