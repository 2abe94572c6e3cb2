//! Device that records every call, for checking call order in tests.

use crate::gfx::{
    BufferFlags, ClearFlags, DebugFlags, GraphicsDevice, HandleTable, IndexBufferHandle, Init, ProgramHandle,
    RendererType, ResetFlags, ShaderHandle, VertexBufferHandle, ViewId,
};
use crate::vertex::VertexLayout;
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Init { width: u32, height: u32 },
    Reset { width: u32, height: u32, flags: ResetFlags },
    SetDebug(DebugFlags),
    SetViewClear { view: ViewId, flags: ClearFlags, rgba: u32 },
    SetViewRect { view: ViewId, width: u16, height: u16 },
    SetViewTransform { view: ViewId, view_mtx: glam::Mat4, proj_mtx: glam::Mat4 },
    CreateShader(ShaderHandle),
    DestroyShader(ShaderHandle),
    CreateProgram(ProgramHandle),
    DestroyProgram(ProgramHandle),
    CreateVertexBuffer { handle: VertexBufferHandle, len: usize, layout: VertexLayout },
    DestroyVertexBuffer(VertexBufferHandle),
    CreateIndexBuffer { handle: IndexBufferHandle, len: usize, flags: BufferFlags },
    DestroyIndexBuffer(IndexBufferHandle),
    SetVertexBuffer { handle: VertexBufferHandle, num: u32 },
    SetIndexBuffer { handle: IndexBufferHandle, num: u32 },
    SetTransform(glam::Mat4),
    Submit { view: ViewId, program: ProgramHandle },
    Frame(u32),
    Shutdown,
}

thread_local! {
    static CALLS: RefCell<Vec<Call>> = const { RefCell::new(Vec::new()) };
}

/// Drains the calls recorded on this thread, including ones made by devices
/// that have already been shut down.
pub(crate) fn take_calls() -> Vec<Call> {
    CALLS.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
}

fn record(call: Call) {
    CALLS.with(|calls| calls.borrow_mut().push(call));
}

#[derive(Debug)]
pub(crate) struct RecordingDevice {
    renderer: RendererType,
    shaders: HandleTable<()>,
    programs: HandleTable<()>,
    vertex_buffers: HandleTable<()>,
    index_buffers: HandleTable<()>,
    frame: u32,
}

impl RecordingDevice {
    /// Shader bytes the device refuses to compile.
    pub(crate) const REJECTED: &'static [u8] = b"!rejected";

    /// Calls recorded on this thread so far, without draining them.
    pub(crate) fn calls(&self) -> Vec<Call> {
        CALLS.with(|calls| calls.borrow().clone())
    }
}

impl GraphicsDevice for RecordingDevice {
    fn init(init: &Init) -> anyhow::Result<Self> {
        record(Call::Init {
            width: init.resolution.width,
            height: init.resolution.height,
        });
        let renderer = match init.renderer_type {
            RendererType::Count => RendererType::Vulkan,
            other => other,
        };
        Ok(Self {
            renderer,
            shaders: HandleTable::new(),
            programs: HandleTable::new(),
            vertex_buffers: HandleTable::new(),
            index_buffers: HandleTable::new(),
            frame: 0,
        })
    }

    fn shutdown(self) {
        record(Call::Shutdown);
    }

    fn renderer_type(&self) -> RendererType {
        self.renderer
    }

    fn reset(&mut self, width: u32, height: u32, flags: ResetFlags) {
        record(Call::Reset { width, height, flags });
    }

    fn set_debug(&mut self, flags: DebugFlags) {
        record(Call::SetDebug(flags));
    }

    fn set_view_clear(&mut self, view: ViewId, flags: ClearFlags, rgba: u32, _depth: f32, _stencil: u8) {
        record(Call::SetViewClear { view, flags, rgba });
    }

    fn set_view_rect(&mut self, view: ViewId, _x: u16, _y: u16, width: u16, height: u16) {
        record(Call::SetViewRect { view, width, height });
    }

    fn set_view_transform(&mut self, view: ViewId, view_mtx: &glam::Mat4, proj_mtx: &glam::Mat4) {
        record(Call::SetViewTransform {
            view,
            view_mtx: *view_mtx,
            proj_mtx: *proj_mtx,
        });
    }

    fn create_shader(&mut self, code: &[u8]) -> ShaderHandle {
        let handle = if code.starts_with(Self::REJECTED) {
            ShaderHandle::INVALID
        } else {
            self.shaders
                .insert(())
                .map_or(ShaderHandle::INVALID, |idx| ShaderHandle { idx })
        };
        record(Call::CreateShader(handle));
        handle
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        self.shaders.remove(handle.idx);
        record(Call::DestroyShader(handle));
    }

    fn create_program(&mut self, vsh: ShaderHandle, fsh: ShaderHandle, destroy_shaders: bool) -> ProgramHandle {
        let linked = self.shaders.get(vsh.idx).is_some() && self.shaders.get(fsh.idx).is_some();
        let handle = if linked {
            self.programs
                .insert(())
                .map_or(ProgramHandle::INVALID, |idx| ProgramHandle { idx })
        } else {
            ProgramHandle::INVALID
        };
        record(Call::CreateProgram(handle));
        if destroy_shaders {
            for shader in [vsh, fsh] {
                if shader.is_valid() {
                    self.destroy_shader(shader);
                }
            }
        }
        handle
    }

    fn destroy_program(&mut self, handle: ProgramHandle) {
        self.programs.remove(handle.idx);
        record(Call::DestroyProgram(handle));
    }

    fn create_vertex_buffer(&mut self, data: &[u8], layout: &VertexLayout) -> VertexBufferHandle {
        let handle = self
            .vertex_buffers
            .insert(())
            .map_or(VertexBufferHandle::INVALID, |idx| VertexBufferHandle { idx });
        record(Call::CreateVertexBuffer {
            handle,
            len: data.len(),
            layout: layout.clone(),
        });
        handle
    }

    fn destroy_vertex_buffer(&mut self, handle: VertexBufferHandle) {
        self.vertex_buffers.remove(handle.idx);
        record(Call::DestroyVertexBuffer(handle));
    }

    fn create_index_buffer(&mut self, data: &[u8], flags: BufferFlags) -> IndexBufferHandle {
        let handle = self
            .index_buffers
            .insert(())
            .map_or(IndexBufferHandle::INVALID, |idx| IndexBufferHandle { idx });
        record(Call::CreateIndexBuffer {
            handle,
            len: data.len(),
            flags,
        });
        handle
    }

    fn destroy_index_buffer(&mut self, handle: IndexBufferHandle) {
        self.index_buffers.remove(handle.idx);
        record(Call::DestroyIndexBuffer(handle));
    }

    fn set_vertex_buffer(&mut self, _stream: u8, handle: VertexBufferHandle, _start: u32, num: u32) {
        record(Call::SetVertexBuffer { handle, num });
    }

    fn set_index_buffer(&mut self, handle: IndexBufferHandle, _first: u32, num: u32) {
        record(Call::SetIndexBuffer { handle, num });
    }

    fn set_transform(&mut self, mtx: &glam::Mat4) {
        record(Call::SetTransform(*mtx));
    }

    fn submit(&mut self, view: ViewId, program: ProgramHandle, _depth: u32) {
        record(Call::Submit { view, program });
    }

    fn frame(&mut self) -> u32 {
        self.frame += 1;
        record(Call::Frame(self.frame));
        self.frame
    }
}
