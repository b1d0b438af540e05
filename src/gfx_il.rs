// Gfx-IL: the wire protocol between the PVR2 core and the host rendering
// collaborator. The core only produces these opcodes; how the host
// rasterizes them is out of scope.

/// Stride, in f32s, of one `DRAW_ARRAY` vertex: 3 position + 4 base color +
/// 4 offset color + 2 texture coord + 1 padding slot.
pub const GFX_VERT_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub base_color: [f32; 4],
    pub offs_color: [f32; 4],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub fn to_array(&self) -> [f32; GFX_VERT_LEN] {
        let mut out = [0.0f32; GFX_VERT_LEN];
        out[0..3].copy_from_slice(&self.pos);
        out[3..7].copy_from_slice(&self.base_color);
        out[7..11].copy_from_slice(&self.offs_color);
        out[11..13].copy_from_slice(&self.tex_coord);
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RendParam {
    pub tex_enabled: bool,
    pub tex_handle: Option<u32>,
    pub src_blend: u32,
    pub dst_blend: u32,
    pub tex_wrap_mode: [u32; 2],
    pub enable_depth_writes: bool,
    pub depth_func: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipRange {
    pub min_z: f32,
    pub max_z: f32,
}

/// One opcode of the gfx-IL stream, each carrying its own typed argument
/// record.
#[derive(Debug, Clone, PartialEq)]
pub enum GfxIlOp {
    SetTex { tex_handle: u32, width: u32, height: u32, pixel_format: u32, data: Vec<u8> },
    FreeTex { tex_handle: u32 },
    BeginRend { screen_width: u32, screen_height: u32, target_handle: u32 },
    EndRend,
    Clear { background_color: [f32; 4] },
    SetBlendEnable { enable: bool },
    SetRendParam(RendParam),
    DrawArray { verts: Vec<Vertex> },
    WriteObj { handle: u32, data: Vec<u8> },
    ReadObj { handle: u32, out_len: usize },
    InitObj { handle: u32, len: usize },
    PostFramebuffer { obj_handle: u32, width: u32, height: u32, vert_flip: bool },
    BindRenderTarget { obj_handle: u32 },
    SetClipRange(ClipRange),
    BeginDepthSort,
    EndDepthSort,
}
