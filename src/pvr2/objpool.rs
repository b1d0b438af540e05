// Graphics-object pool: host-side texture/framebuffer backing buffers
// referred to by stable integer handles. Allocation linearly scans for a
// free slot, matching the memory map's linear region scan in spirit.

use crate::error::{ErrorKind, WashResult};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ObjState {
    Unused,
    Allocated,
}

struct Obj {
    state: ObjState,
    dat: Option<Vec<u8>>,
    dat_len: usize,
}

impl Default for Obj {
    fn default() -> Self {
        Obj { state: ObjState::Unused, dat: None, dat_len: 0 }
    }
}

#[derive(Default)]
pub struct ObjPool {
    slots: Vec<Obj>,
}

impl ObjPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a handle backed by `len` zeroed bytes, reusing the first
    /// free slot rather than growing the pool when one is available.
    pub fn init_obj(&mut self, len: usize) -> u32 {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.state == ObjState::Unused {
                slot.state = ObjState::Allocated;
                slot.dat = Some(vec![0u8; len]);
                slot.dat_len = len;
                return idx as u32;
            }
        }
        self.slots.push(Obj { state: ObjState::Allocated, dat: Some(vec![0u8; len]), dat_len: len });
        (self.slots.len() - 1) as u32
    }

    pub fn free_obj(&mut self, handle: u32) {
        if let Some(slot) = self.slots.get_mut(handle as usize) {
            slot.state = ObjState::Unused;
            slot.dat = None;
            slot.dat_len = 0;
        }
    }

    pub fn write_obj(&mut self, handle: u32, data: &[u8]) -> WashResult<()> {
        let slot = self.slot_mut(handle)?;
        let dat = slot.dat.as_mut().expect("allocated slot always has backing data");
        let n = data.len().min(dat.len());
        dat[..n].copy_from_slice(&data[..n]);
        Ok(())
    }

    pub fn read_obj(&self, handle: u32, out_len: usize) -> WashResult<Vec<u8>> {
        let slot = self.slot(handle)?;
        let dat = slot.dat.as_ref().expect("allocated slot always has backing data");
        Ok(dat[..out_len.min(dat.len())].to_vec())
    }

    fn slot(&self, handle: u32) -> WashResult<&Obj> {
        match self.slots.get(handle as usize) {
            Some(slot) if slot.state == ObjState::Allocated => Ok(slot),
            _ => Err(crate::raise_error!(ErrorKind::InvalidParam).with_u32("handle", handle)),
        }
    }

    fn slot_mut(&mut self, handle: u32) -> WashResult<&mut Obj> {
        match self.slots.get_mut(handle as usize) {
            Some(slot) if slot.state == ObjState::Allocated => Ok(slot),
            _ => Err(crate::raise_error!(ErrorKind::InvalidParam).with_u32("handle", handle)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut pool = ObjPool::new();
        let h = pool.init_obj(4);
        pool.write_obj(h, &[1, 2, 3, 4]).unwrap();
        assert_eq!(pool.read_obj(h, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn freed_slot_is_reused_by_the_next_allocation() {
        let mut pool = ObjPool::new();
        let a = pool.init_obj(4);
        pool.free_obj(a);
        let b = pool.init_obj(8);
        assert_eq!(a, b);
    }

    #[test]
    fn access_to_a_freed_handle_errors() {
        let mut pool = ObjPool::new();
        let h = pool.init_obj(4);
        pool.free_obj(h);
        assert!(pool.read_obj(h, 4).is_err());
    }
}
