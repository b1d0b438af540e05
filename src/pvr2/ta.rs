// Tile accelerator: captures the 32-byte command stream the guest writes
// into the TA FIFO as a per-polygon-group command list, keyed by the
// current `TA_VERTBUF_POS`, and replays the matching list into a gfx-IL
// stream on STARTRENDER.
//
// Rebuilding the true tile array for every render is impractical for a
// high-level emulation, so STARTRENDER instead key-matches its
// `PARAM_BASE` against the most recently captured lists (within a
// tolerance of `0x100000`) and replays whichever matching list is
// youngest.

use crate::gfx_il::{ClipRange, GfxIlOp, RendParam, Vertex as GfxVertex};
use std::collections::HashMap;

pub const MAX_FRAMES_IN_FLIGHT: usize = 4;
pub const LIST_ROLLBACK_AGE_LIMIT: u32 = 32 * 1024;
pub const KEY_MATCH_TOLERANCE: u32 = 0x0010_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyGroup {
    Opaque = 0,
    OpaqueMod = 1,
    Translucent = 2,
    TranslucentMod = 3,
    PunchThrough = 4,
}

const GROUP_COUNT: usize = 5;
const GROUP_ORDER: [PolyGroup; GROUP_COUNT] =
    [PolyGroup::Opaque, PolyGroup::OpaqueMod, PolyGroup::Translucent, PolyGroup::TranslucentMod, PolyGroup::PunchThrough];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub stride_sel: bool,
    pub tex_enable: bool,
    pub tex_twiddle: bool,
    pub tex_vq_compression: bool,
    pub tex_mipmap: bool,
    pub tex_width_shift: u32,
    pub tex_height_shift: u32,
    pub tex_addr: u32,
    pub tex_palette_start: u32,
    pub pix_fmt: u32,
    pub linestride: u32,
    pub src_blend_factor: u32,
    pub dst_blend_factor: u32,
    pub enable_depth_writes: bool,
    pub depth_func: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaVertex {
    pub pos: [f32; 3],
    pub tex_coord: [f32; 2],
    pub base_color: [f32; 4],
    pub offs_color: [f32; 4],
    pub end_of_strip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub vert_pos: [[f32; 3]; 4],
    pub tex_coords_packed: [u32; 3],
    pub base_color: [f32; 4],
    pub offs_color: [f32; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Header(Header),
    Vertex(TaVertex),
    Quad(Quad),
    EndOfGroup,
}

#[derive(Default, Clone)]
struct Group {
    valid: bool,
    cmds: Vec<Command>,
}

#[derive(Clone)]
struct DisplayList {
    key: u32,
    age_counter: u32,
    valid: bool,
    groups: [Group; GROUP_COUNT],
}

impl Default for DisplayList {
    fn default() -> Self {
        DisplayList { key: 0, age_counter: 0, valid: false, groups: Default::default() }
    }
}

/// `TileAccelerator` owns the capture ring and replays it, grounded on
/// spec.md-free reading of the texture-cache-keying and strip/quad
/// expansion rules from the original renderer.
pub struct TileAccelerator {
    lists: [DisplayList; MAX_FRAMES_IN_FLIGHT],
    counter: u32,
    capture_idx: Option<usize>,
    capture_key: u32,
    tex_cache: HashMap<(u32, u32, u32, u32, u32, u32, bool, bool, bool, bool), u32>,
    next_tex_handle: u32,
}

impl Default for TileAccelerator {
    fn default() -> Self {
        TileAccelerator {
            lists: Default::default(),
            counter: 0,
            capture_idx: None,
            capture_key: 0,
            tex_cache: HashMap::new(),
            next_tex_handle: 0,
        }
    }
}

impl TileAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn list_age(&self, idx: usize) -> u32 {
        self.counter.wrapping_sub(self.lists[idx].age_counter)
    }

    fn lru_slot(&self) -> usize {
        (0..MAX_FRAMES_IN_FLIGHT)
            .filter(|&i| !self.lists[i].valid)
            .next()
            .unwrap_or_else(|| (0..MAX_FRAMES_IN_FLIGHT).max_by_key(|&i| self.list_age(i)).unwrap())
    }

    /// Appends one command to the list currently being captured at
    /// `vertbuf_pos`, starting a new (LRU-evicted) list whenever the key
    /// changes.
    pub fn capture_cmd(&mut self, vertbuf_pos: u32, group: PolyGroup, cmd: Command) {
        if self.capture_idx.is_none() || self.capture_key != vertbuf_pos {
            let idx = self.lru_slot();
            self.lists[idx] = DisplayList { key: vertbuf_pos, valid: true, ..Default::default() };
            self.capture_idx = Some(idx);
            self.capture_key = vertbuf_pos;
        }
        let idx = self.capture_idx.unwrap();
        let g = &mut self.lists[idx].groups[group as usize];
        g.valid = true;
        g.cmds.push(cmd);
    }

    /// Bumps the global age counter, rebasing on overflow: lists younger
    /// than `LIST_ROLLBACK_AGE_LIMIT` have the minimum such age subtracted
    /// from both their stamp and the counter; older lists are invalidated.
    fn inc_age_counter(&mut self) {
        self.counter = self.counter.wrapping_add(1);
        if self.counter != u32::MAX {
            return;
        }
        let oldest_age = (0..MAX_FRAMES_IN_FLIGHT)
            .filter(|&i| self.lists[i].valid && self.list_age(i) < LIST_ROLLBACK_AGE_LIMIT)
            .map(|i| self.lists[i].age_counter)
            .min();
        match oldest_age {
            None => {
                for l in &mut self.lists {
                    l.valid = false;
                }
                self.counter = 0;
            }
            Some(oldest) => {
                for i in 0..MAX_FRAMES_IN_FLIGHT {
                    if !self.lists[i].valid {
                        continue;
                    }
                    if self.list_age(i) < LIST_ROLLBACK_AGE_LIMIT {
                        self.lists[i].age_counter -= oldest;
                    } else {
                        self.lists[i].valid = false;
                    }
                }
                self.counter -= oldest;
            }
        }
    }

    fn find_for_startrender(&self, param_base: u32) -> Option<usize> {
        (0..MAX_FRAMES_IN_FLIGHT)
            .filter(|&i| {
                let l = &self.lists[i];
                l.valid && l.key <= param_base && param_base - l.key < KEY_MATCH_TOLERANCE
            })
            .min_by_key(|&i| self.list_age(i))
    }

    fn resolve_tex_handle(&mut self, hdr: &Header, on_tex_use: &mut impl FnMut(u32, u32) -> Vec<GfxIlOp>, ops: &mut Vec<GfxIlOp>) -> u32 {
        let key = (
            hdr.tex_addr,
            hdr.tex_palette_start,
            hdr.tex_width_shift,
            hdr.tex_height_shift,
            hdr.linestride,
            hdr.pix_fmt,
            hdr.tex_twiddle,
            hdr.tex_vq_compression,
            hdr.tex_mipmap,
            hdr.stride_sel,
        );
        let tex_len = (1u32 << hdr.tex_width_shift) * (1u32 << hdr.tex_height_shift) * 2;
        ops.append(&mut on_tex_use(hdr.tex_addr, tex_len));
        if let Some(&h) = self.tex_cache.get(&key) {
            return h;
        }
        let h = self.next_tex_handle;
        self.next_tex_handle += 1;
        self.tex_cache.insert(key, h);
        h
    }

    /// Replays the list matching `param_base` (per `find_for_startrender`)
    /// into a gfx-IL instruction stream, bumping the age counter as a side
    /// effect of selection. Returns `None` (after logging) if nothing
    /// matches. `on_tex_use` is invoked with `(tex_addr, tex_len_bytes)` for
    /// every textured header so a framebuffer overlapping that range can be
    /// synced back to texture memory before the sample happens.
    pub fn startrender(
        &mut self,
        param_base: u32,
        isp_feed_cfg_order_dependent: bool,
        mut on_tex_use: impl FnMut(u32, u32) -> Vec<GfxIlOp>,
    ) -> Option<Vec<GfxIlOp>> {
        let idx = match self.find_for_startrender(param_base) {
            Some(idx) => idx,
            None => {
                log::error!("startrender: no captured display list matches param_base=0x{:08x}", param_base);
                return None;
            }
        };
        if self.list_age(idx) > 32 {
            log::warn!("startrender: replaying a display list of age {}", self.list_age(idx));
        }
        self.inc_age_counter();
        self.lists[idx].age_counter = self.counter;

        let list = self.lists[idx].clone();
        Some(self.replay(&list, isp_feed_cfg_order_dependent, &mut on_tex_use))
    }

    fn replay(&mut self, list: &DisplayList, isp_feed_cfg_order_dependent: bool, on_tex_use: &mut impl FnMut(u32, u32) -> Vec<GfxIlOp>) -> Vec<GfxIlOp> {
        let mut ops = Vec::new();
        let mut clip_min = 1.0f32;
        let mut clip_max = -1.0f32;
        let mut verts: Vec<GfxVertex> = Vec::new();
        let mut strip: Vec<TaVertex> = Vec::new();

        for group_kind in GROUP_ORDER {
            if matches!(group_kind, PolyGroup::OpaqueMod | PolyGroup::TranslucentMod) {
                continue; // modifier volumes unimplemented
            }
            let group = &list.groups[group_kind as usize];
            if !group.valid {
                continue;
            }

            let sort_mode = matches!(group_kind, PolyGroup::Translucent) && !isp_feed_cfg_order_dependent;
            if sort_mode {
                ops.push(GfxIlOp::BeginDepthSort);
            }

            for cmd in &group.cmds {
                match cmd {
                    Command::Header(hdr) => {
                        if !verts.is_empty() {
                            ops.push(GfxIlOp::DrawArray { verts: std::mem::take(&mut verts) });
                        }
                        strip.clear();
                        let tex_handle =
                            if hdr.tex_enable { Some(self.resolve_tex_handle(hdr, on_tex_use, &mut ops)) } else { None };
                        ops.push(GfxIlOp::SetRendParam(RendParam {
                            tex_enabled: hdr.tex_enable,
                            tex_handle,
                            src_blend: hdr.src_blend_factor,
                            dst_blend: hdr.dst_blend_factor,
                            tex_wrap_mode: [0, 0],
                            enable_depth_writes: hdr.enable_depth_writes,
                            depth_func: hdr.depth_func,
                        }));
                        ops.push(GfxIlOp::SetBlendEnable { enable: matches!(group_kind, PolyGroup::Translucent) });
                    }
                    Command::Vertex(v) => {
                        if strip.len() >= 3 {
                            let a = strip[strip.len() - 2];
                            let b = strip[strip.len() - 1];
                            verts.push(to_gfx_vertex(&a));
                            verts.push(to_gfx_vertex(&b));
                        }
                        let z = v.pos[2];
                        if z != 0.0 {
                            let inv_z = 1.0 / z;
                            clip_min = clip_min.min(inv_z);
                            clip_max = clip_max.max(inv_z);
                        }
                        verts.push(to_gfx_vertex(v));
                        strip.push(*v);
                        if v.end_of_strip {
                            strip.clear();
                        }
                    }
                    Command::Quad(q) => {
                        for corner in &q.vert_pos {
                            let z = corner[2];
                            clip_min = clip_min.min(z);
                            clip_max = clip_max.max(z);
                        }
                        let (v0, v1, v2, v3) = quad_to_triangle_verts(q);
                        verts.push(v0);
                        verts.push(v1);
                        verts.push(v2);
                        verts.push(v1);
                        verts.push(v3);
                        verts.push(v2);
                    }
                    Command::EndOfGroup => {
                        if !verts.is_empty() {
                            ops.push(GfxIlOp::DrawArray { verts: std::mem::take(&mut verts) });
                        }
                    }
                }
            }

            if sort_mode {
                ops.push(GfxIlOp::EndDepthSort);
            }
        }

        ops.push(GfxIlOp::SetClipRange(ClipRange { min_z: clip_min, max_z: clip_max }));
        ops
    }
}

fn to_gfx_vertex(v: &TaVertex) -> GfxVertex {
    GfxVertex { pos: v.pos, base_color: v.base_color, offs_color: v.offs_color, tex_coord: v.tex_coord }
}

/// Unpacks the quad's four corners, deriving the fourth UV by vector
/// addition of the three packed 16-bit UV coordinates: `uv3 = uv1 + uv2 -
/// uv0`.
fn quad_to_triangle_verts(q: &Quad) -> (GfxVertex, GfxVertex, GfxVertex, GfxVertex) {
    let unpack = |packed: u32| -> [f32; 2] {
        let u = ((packed >> 16) & 0xffff) as f32 / 65535.0;
        let v = (packed & 0xffff) as f32 / 65535.0;
        [u, v]
    };
    let uv0 = unpack(q.tex_coords_packed[0]);
    let uv1 = unpack(q.tex_coords_packed[1]);
    let uv2 = unpack(q.tex_coords_packed[2]);
    let uv3 = [uv1[0] + uv2[0] - uv0[0], uv1[1] + uv2[1] - uv0[1]];

    let make = |pos: [f32; 3], tex_coord: [f32; 2]| GfxVertex {
        pos,
        base_color: q.base_color,
        offs_color: q.offs_color,
        tex_coord,
    };
    (make(q.vert_pos[0], uv0), make(q.vert_pos[1], uv1), make(q.vert_pos[2], uv2), make(q.vert_pos[3], uv3))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            stride_sel: false,
            tex_enable: false,
            tex_twiddle: false,
            tex_vq_compression: false,
            tex_mipmap: false,
            tex_width_shift: 0,
            tex_height_shift: 0,
            tex_addr: 0,
            tex_palette_start: 0,
            pix_fmt: 0,
            linestride: 0,
            src_blend_factor: 0,
            dst_blend_factor: 0,
            enable_depth_writes: true,
            depth_func: 0,
        }
    }

    fn vertex(z: f32) -> TaVertex {
        TaVertex { pos: [0.0, 0.0, z], tex_coord: [0.0, 0.0], base_color: [1.0; 4], offs_color: [0.0; 4], end_of_strip: false }
    }

    #[test]
    fn replay_emits_one_rend_param_one_blend_enable_and_matching_vertex_count() {
        let mut ta = TileAccelerator::new();
        ta.capture_cmd(0x0100_0000, PolyGroup::Opaque, Command::Header(header()));
        ta.capture_cmd(0x0100_0000, PolyGroup::Opaque, Command::Vertex(vertex(1.0)));
        ta.capture_cmd(0x0100_0000, PolyGroup::Opaque, Command::Vertex(vertex(1.0)));
        ta.capture_cmd(0x0100_0000, PolyGroup::Opaque, Command::Vertex(vertex(1.0)));
        ta.capture_cmd(0x0100_0000, PolyGroup::Opaque, Command::EndOfGroup);

        let ops = ta.startrender(0x0100_0000, true, |_, _| Vec::new()).expect("expected a matching list");
        let rend_params = ops.iter().filter(|o| matches!(o, GfxIlOp::SetRendParam(_))).count();
        let blend_enables = ops.iter().filter(|o| matches!(o, GfxIlOp::SetBlendEnable { .. })).count();
        let total_verts: usize = ops
            .iter()
            .filter_map(|o| if let GfxIlOp::DrawArray { verts } = o { Some(verts.len()) } else { None })
            .sum();
        assert_eq!(rend_params, 1);
        assert_eq!(blend_enables, 1);
        assert_eq!(total_verts, 3);
    }

    #[test]
    fn startrender_with_no_matching_key_returns_none() {
        let mut ta = TileAccelerator::new();
        ta.capture_cmd(0x0100_0000, PolyGroup::Opaque, Command::Header(header()));
        assert!(ta.startrender(0x0500_0000, true, |_, _| Vec::new()).is_none());
    }

    #[test]
    fn textured_header_invokes_the_tex_use_callback_with_address_and_length() {
        let mut ta = TileAccelerator::new();
        let mut hdr = header();
        hdr.tex_enable = true;
        hdr.tex_addr = 0x3000;
        hdr.tex_width_shift = 3; // 8
        hdr.tex_height_shift = 2; // 4
        ta.capture_cmd(0x0100_0000, PolyGroup::Opaque, Command::Header(hdr));
        ta.capture_cmd(0x0100_0000, PolyGroup::Opaque, Command::EndOfGroup);

        let seen = std::cell::RefCell::new(Vec::new());
        ta.startrender(0x0100_0000, true, |addr, len| {
            seen.borrow_mut().push((addr, len));
            Vec::new()
        });
        assert_eq!(seen.into_inner(), vec![(0x3000, 8 * 4 * 2)]);
    }

    #[test]
    fn age_counter_overflow_rebases_and_preserves_young_lists() {
        let mut ta = TileAccelerator::new();
        ta.capture_cmd(0x0100_0000, PolyGroup::Opaque, Command::Header(header()));
        ta.lists[0].valid = true;
        ta.counter = u32::MAX - 1;
        ta.lists[0].age_counter = u32::MAX - 1;
        ta.inc_age_counter();
        assert!(ta.lists[0].valid);
        assert_eq!(ta.counter, 0);
    }
}
