// The PVR2 tile accelerator/GPU complex: display-list capture and replay
// (`ta`), the sync pulse generator driving raster timing (`spg`), the
// framebuffer heap that turns texture memory into presentable pixels
// (`fb`), the host-object pool backing both (`objpool`), and Holly's
// interrupt status bits (`holly_intc`).

pub mod fb;
pub mod holly_intc;
pub mod objpool;
pub mod spg;
pub mod ta;

use crate::gfx_il::GfxIlOp;

pub use fb::{FbHeap, FbPixFmt, ReadGeometry};
pub use holly_intc::{HollyIntc, IstNrm};
pub use objpool::ObjPool;
pub use spg::Spg;
pub use ta::{Command, Header, PolyGroup, Quad, TaVertex, TileAccelerator};

pub const FB_HEAP_SIZE: usize = 4;

/// Bundles the PVR2-side state a `Dreamcast` owns: the tile accelerator's
/// capture/replay state, the raster-timing generator, the framebuffer
/// heap, the object pool both of those allocate from, Holly's interrupt
/// status, the geometry the read path should convert on the next
/// VBLANK-in (set directly by a front-end or test, mirroring how
/// `TileAccelerator::capture_cmd` is driven directly instead of through a
/// decoded MMIO write), and the gfx-IL ops produced since the last drain.
pub struct Pvr2 {
    pub ta: TileAccelerator,
    pub spg: Spg,
    pub fb: FbHeap,
    pub objs: ObjPool,
    pub holly: HollyIntc,
    pub fb_read_geom: Option<ReadGeometry>,
    pub gfx_out: Vec<GfxIlOp>,
}

impl Pvr2 {
    pub fn new() -> Self {
        let mut objs = ObjPool::new();
        let fb = FbHeap::new(FB_HEAP_SIZE, &mut objs);
        Pvr2 {
            ta: TileAccelerator::new(),
            spg: Spg::new(),
            fb,
            objs,
            holly: HollyIntc::new(),
            fb_read_geom: None,
            gfx_out: Vec::new(),
        }
    }
}

impl Default for Pvr2 {
    fn default() -> Self {
        Self::new()
    }
}
