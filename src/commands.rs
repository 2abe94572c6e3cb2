use crate::gfx::{IndexBufferHandle, ProgramHandle, VertexBufferHandle, ViewId};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VertexStream {
    pub handle: VertexBufferHandle,
    pub start_vertex: u32,
    pub num_vertices: u32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IndexRange {
    pub handle: IndexBufferHandle,
    pub first_index: u32,
    pub num_indices: u32,
}

/// One submitted draw, waiting for the next `frame`.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub view: ViewId,
    pub program: ProgramHandle,
    pub depth: u32,
    pub vertex: VertexStream,
    pub index: Option<IndexRange>,
    pub transform: glam::Mat4,
}

/// Draw state accumulated between submits.
#[derive(Debug, Clone, Default)]
pub struct DrawState {
    vertex: Option<VertexStream>,
    index: Option<IndexRange>,
    transform: Option<glam::Mat4>,
}

impl DrawState {
    pub fn set_vertex_buffer(&mut self, handle: VertexBufferHandle, start_vertex: u32, num_vertices: u32) {
        self.vertex = Some(VertexStream {
            handle,
            start_vertex,
            num_vertices,
        });
    }

    pub fn set_index_buffer(&mut self, handle: IndexBufferHandle, first_index: u32, num_indices: u32) {
        self.index = Some(IndexRange {
            handle,
            first_index,
            num_indices,
        });
    }

    pub fn set_transform(&mut self, transform: glam::Mat4) {
        self.transform = Some(transform);
    }

    /// Turns the accumulated state into a draw call and resets it. Returns
    /// `None` when there is nothing drawable.
    pub fn submit(&mut self, view: ViewId, program: ProgramHandle, depth: u32) -> Option<DrawCall> {
        let DrawState {
            vertex,
            index,
            transform,
        } = std::mem::take(self);
        let vertex = vertex.filter(|v| v.handle.is_valid())?;
        let index = index.filter(|i| i.handle.is_valid());
        if !program.is_valid() {
            return None;
        }
        Some(DrawCall {
            view,
            program,
            depth,
            vertex,
            index,
            transform: transform.unwrap_or(glam::Mat4::IDENTITY),
        })
    }
}

/// Orders draws by view, then by sort depth. Submission order breaks ties.
pub fn sort_draws(draws: &mut [DrawCall]) {
    draws.sort_by_key(|draw| (draw.view, draw.depth));
}
