use crate::gfx::RendererType;
use crate::vertex::{Attrib, AttribType, VertexLayout, VertexLayoutError};

/// Position plus a packed `0xAABBGGRR` color, matching the cube layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PosColorVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub abgr: u32,
}

impl PosColorVertex {
    pub const fn new(x: f32, y: f32, z: f32, abgr: u32) -> Self {
        Self { x, y, z, abgr }
    }

    pub fn layout(renderer: RendererType) -> Result<VertexLayout, VertexLayoutError> {
        VertexLayout::begin(renderer)
            .add(Attrib::Position, 3, AttribType::Float, false)
            .add(Attrib::Color0, 4, AttribType::Uint8, true)
            .end()
    }
}

/// Splits a triangle list into index triples. A trailing partial triangle is
/// dropped.
pub fn triangles(indices: &[u32]) -> impl Iterator<Item = [u32; 3]> + '_ {
    indices.chunks_exact(3).map(|tri| [tri[0], tri[1], tri[2]])
}
