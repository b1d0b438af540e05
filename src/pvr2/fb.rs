// Framebuffer heap: converts the read-side video-output region of texture
// memory into RGBA8888 for presentation, and the write-side render target
// back into texture memory for the guest to read back. A small heap of
// framebuffers lets a render target outlive the frame it was drawn in
// without forcing an immediate sync.

use crate::gfx_il::GfxIlOp;
use crate::pvr2::objpool::ObjPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FbPixFmt {
    Rgb555,
    Rgb565,
    Rgb888,
    Rgb0888,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FbState {
    Invalid,
    Virt,
    Gfx,
    VirtAndGfx,
}

#[derive(Clone)]
pub struct Framebuffer {
    obj_handle: u32,
    fb_read_width: u32,
    fb_read_height: u32,
    linestride: u32,
    addr_first: [u32; 2],
    addr_last: [u32; 2],
    addr_key: u32,
    stamp: u32,
    state: FbState,
    pix_fmt: FbPixFmt,
    vert_flip: bool,
}

impl Framebuffer {
    fn reset(&mut self) {
        let obj_handle = self.obj_handle;
        *self = Framebuffer {
            obj_handle,
            fb_read_width: 0,
            fb_read_height: 0,
            linestride: 0,
            addr_first: [0, 0],
            addr_last: [0, 0],
            addr_key: 0,
            stamp: 0,
            state: FbState::Invalid,
            pix_fmt: FbPixFmt::Rgb555,
            vert_flip: false,
        };
    }
}

/// Geometry decoded from FB_R_SIZE/FB_R_CTRL/FB_R_SOF1/FB_R_SOF2/SPG_CONTROL
/// for a single `framebuffer_render` call.
#[derive(Clone, Copy)]
pub struct ReadGeometry {
    pub width: u32,
    pub height: u32,
    pub sof1: u32,
    pub sof2: u32,
    pub modulus: u32,
    pub concat: u8,
    pub interlace: bool,
    pub pix_fmt: FbPixFmt,
}

fn rgb565_to_rgba8888(pix: u16, concat: u8) -> u32 {
    let c = concat as u32;
    let r = (((pix & 0xf800) as u32 >> 11) << 3) | c;
    let g = (((pix & 0x07e0) as u32 >> 5) << 2) | (c & 3);
    let b = ((pix & 0x001f) as u32) << 3 | c;
    (255 << 24) | (b << 16) | (g << 8) | r
}

fn rgb555_to_rgba8888(pix: u16, concat: u8) -> u32 {
    let c = concat as u32;
    let b = ((pix & 0x001f) as u32) << 3 | c;
    let g = (((pix & 0x03e0) as u32 >> 5) << 3) | c;
    let r = (((pix & 0x7c00) as u32 >> 10) << 3) | c;
    (255 << 24) | (b << 16) | (g << 8) | r
}

fn rgb888_to_rgba8888(bytes: [u8; 3]) -> u32 {
    let [r, g, b] = bytes;
    (255 << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

fn rgb0888_to_rgba8888(pix: u32) -> u32 {
    let r = (pix & 0x00ff_0000) >> 16;
    let g = (pix & 0x0000_ff00) >> 8;
    let b = pix & 0x0000_00ff;
    (255 << 24) | (b << 16) | (g << 8) | r
}

fn read_u16_le(mem: &[u8], offs: usize) -> u16 {
    u16::from_le_bytes([mem[offs], mem[offs + 1]])
}

fn read_u32_le(mem: &[u8], offs: usize) -> u32 {
    u32::from_le_bytes([mem[offs], mem[offs + 1], mem[offs + 2], mem[offs + 3]])
}

/// Converts one field (or the whole progressive frame) of texture memory
/// into RGBA8888, returning pixels in row-major order.
fn convert_field(mem: &[u8], sof: u32, width: u32, height: u32, field_adv: u32, pix_fmt: FbPixFmt, concat: u8) -> Vec<u32> {
    let mut out = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        let row_off = sof as usize + (row * field_adv) as usize;
        for col in 0..width {
            let pix = match pix_fmt {
                FbPixFmt::Rgb565 => rgb565_to_rgba8888(read_u16_le(mem, row_off + (col * 2) as usize), concat),
                FbPixFmt::Rgb555 => rgb555_to_rgba8888(read_u16_le(mem, row_off + (col * 2) as usize), concat),
                FbPixFmt::Rgb888 => {
                    let o = row_off + (col * 3) as usize;
                    rgb888_to_rgba8888([mem[o], mem[o + 1], mem[o + 2]])
                }
                FbPixFmt::Rgb0888 => rgb0888_to_rgba8888(read_u32_le(mem, row_off + (col * 4) as usize)),
            };
            out.push(pix);
        }
    }
    out
}

fn bytes_per_src_pix(pix_fmt: FbPixFmt) -> u32 {
    match pix_fmt {
        FbPixFmt::Rgb555 | FbPixFmt::Rgb565 => 2,
        FbPixFmt::Rgb888 => 3,
        FbPixFmt::Rgb0888 => 4,
    }
}

/// Owns the fixed-size pool of render-target/readback framebuffers.
pub struct FbHeap {
    slots: Vec<Framebuffer>,
    stamp: u32,
}

impl FbHeap {
    /// Allocates `size` graphics objects up front, one per slot, matching
    /// the fixed-capacity heap the hardware-abstraction layer uses.
    pub fn new(size: usize, objs: &mut ObjPool) -> Self {
        let slots = (0..size)
            .map(|_| Framebuffer {
                obj_handle: objs.init_obj(0),
                fb_read_width: 0,
                fb_read_height: 0,
                linestride: 0,
                addr_first: [0, 0],
                addr_last: [0, 0],
                addr_key: 0,
                stamp: 0,
                state: FbState::Invalid,
                pix_fmt: FbPixFmt::Rgb555,
                vert_flip: false,
            })
            .collect();
        FbHeap { slots, stamp: 0 }
    }

    fn pick(&mut self, width: u32, height: u32, addr: u32) -> usize {
        let mut first_invalid = None;
        let mut oldest_idx = None;
        let mut oldest_stamp = self.stamp;
        for (idx, fb) in self.slots.iter().enumerate() {
            if fb.state != FbState::Invalid {
                if fb.fb_read_width == width && fb.fb_read_height == height && fb.addr_key == addr {
                    return idx;
                }
                if fb.stamp <= oldest_stamp {
                    oldest_stamp = fb.stamp;
                    oldest_idx = Some(idx);
                }
            } else if first_invalid.is_none() {
                first_invalid = Some(idx);
            }
        }
        let idx = first_invalid.or(oldest_idx).unwrap_or(0);
        self.slots[idx].reset();
        idx
    }

    /// Finds or allocates the framebuffer matching `geom`, converts texture
    /// memory into it when it isn't already current, and emits the
    /// WRITE_OBJ/POST_FRAMEBUFFER gfx-IL pair for presentation.
    pub fn render(&mut self, tex_mem: &[u8], geom: &ReadGeometry) -> Vec<GfxIlOp> {
        let addr_first = if geom.interlace { geom.sof1.min(geom.sof2) } else { geom.sof1 };

        let mut idx = None;
        for (i, fb) in self.slots.iter().enumerate() {
            if fb.fb_read_width == geom.width
                && fb.fb_read_height == geom.height
                && fb.addr_key == addr_first
                && fb.state != FbState::Invalid
            {
                idx = Some(i);
                break;
            }
        }
        let idx = idx.unwrap_or_else(|| self.pick(geom.width, geom.height, addr_first));

        let needs_sync = !matches!(self.slots[idx].state, FbState::Gfx | FbState::VirtAndGfx);
        let mut ops = Vec::new();
        if needs_sync {
            let pix_sz = bytes_per_src_pix(geom.pix_fmt);
            let field_len = if geom.interlace {
                (geom.width * pix_sz + geom.modulus * 4 - 4) * geom.height
            } else {
                geom.width * pix_sz * geom.height
            };
            let data = if geom.interlace {
                let field_adv = geom.width * pix_sz + geom.modulus * 4 - 4;
                let mut pixels = vec![0u32; (geom.width * geom.height) as usize];
                let field1 = convert_field(tex_mem, geom.sof1, geom.width, geom.height, field_adv, geom.pix_fmt, geom.concat);
                let field2 = convert_field(tex_mem, geom.sof2, geom.width, geom.height, field_adv, geom.pix_fmt, geom.concat);
                for row in 0..geom.height as usize {
                    pixels[row * 2 * geom.width as usize..(row * 2 + 1) * geom.width as usize]
                        .copy_from_slice(&field1[row * geom.width as usize..(row + 1) * geom.width as usize]);
                    pixels[(row * 2 + 1) * geom.width as usize..(row * 2 + 2) * geom.width as usize]
                        .copy_from_slice(&field2[row * geom.width as usize..(row + 1) * geom.width as usize]);
                }
                pixels
            } else {
                convert_field(tex_mem, geom.sof1, geom.width, geom.height, geom.width * pix_sz, geom.pix_fmt, geom.concat)
            };
            let bytes: Vec<u8> = data.iter().flat_map(|p| p.to_le_bytes()).collect();

            let fb = &mut self.slots[idx];
            fb.fb_read_width = geom.width;
            fb.fb_read_height = geom.height;
            fb.addr_key = addr_first;
            fb.addr_first = [geom.sof1, geom.sof2];
            fb.addr_last = [geom.sof1 + field_len, geom.sof2 + field_len];
            fb.state = FbState::VirtAndGfx;
            fb.vert_flip = true;
            fb.pix_fmt = geom.pix_fmt;
            fb.stamp = self.stamp;

            ops.push(GfxIlOp::WriteObj { handle: fb.obj_handle, data: bytes });
        }

        self.stamp += 1;
        self.slots[idx].stamp = self.stamp;

        let mut height = self.slots[idx].fb_read_height;
        if geom.interlace {
            height *= 2;
        }
        ops.push(GfxIlOp::PostFramebuffer {
            obj_handle: self.slots[idx].obj_handle,
            width: self.slots[idx].fb_read_width,
            height,
            vert_flip: self.slots[idx].vert_flip,
        });
        ops
    }

    /// Marks the framebuffer at `idx` as a live render target: the next
    /// STARTRENDER will draw into it and it must be synced back to texture
    /// memory (handled elsewhere) before the guest can read it as a texture.
    pub fn bind_render_target(&mut self, width: u32, height: u32, addr: u32) -> usize {
        let idx = self.pick(width, height, addr);
        let fb = &mut self.slots[idx];
        fb.fb_read_width = width;
        fb.fb_read_height = height;
        fb.addr_key = addr;
        fb.addr_first = [addr, addr];
        fb.addr_last = [addr + width * height * 4, addr + width * height * 4];
        fb.state = FbState::Gfx;
        fb.stamp = self.stamp;
        idx
    }

    pub fn obj_handle(&self, idx: usize) -> u32 {
        self.slots[idx].obj_handle
    }

    fn overlaps(fb: &Framebuffer, start: u32, end: u32) -> bool {
        let fb_start = fb.addr_first[0].min(fb.addr_first[1]);
        let fb_end = fb.addr_last[0].max(fb.addr_last[1]);
        fb_start < end && start < fb_end
    }

    /// A VRAM write overlapping a slot whose GPU-rendered object is
    /// currently authoritative invalidates that object: the write means
    /// VRAM itself now holds data the object doesn't reflect, so the next
    /// `render` must re-read from VRAM rather than trust the object.
    pub fn notify_vram_write(&mut self, addr: u32, len: u32) {
        let end = addr.saturating_add(len);
        for fb in self.slots.iter_mut() {
            if matches!(fb.state, FbState::Gfx | FbState::VirtAndGfx) && Self::overlaps(fb, addr, end) {
                fb.state = FbState::Virt;
            }
        }
    }

    /// A texture sample overlapping a slot whose GPU object hasn't been
    /// synced back to VRAM yet pulls it back via `READ_OBJ` so the sampled
    /// texture data is current, then marks the slot in sync both ways.
    pub fn notify_texture_use(&mut self, addr: u32, len: u32) -> Vec<GfxIlOp> {
        let end = addr.saturating_add(len);
        let mut ops = Vec::new();
        for fb in self.slots.iter_mut() {
            if fb.state == FbState::Gfx && Self::overlaps(fb, addr, end) {
                let fb_start = fb.addr_first[0].min(fb.addr_first[1]);
                let fb_end = fb.addr_last[0].max(fb.addr_last[1]);
                ops.push(GfxIlOp::ReadObj { handle: fb.obj_handle, out_len: (fb_end - fb_start) as usize });
                fb.state = FbState::VirtAndGfx;
            }
        }
        ops
    }
}
