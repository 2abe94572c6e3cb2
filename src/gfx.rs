//! Handle-based graphics API consumed by the render loop.
//!
//! The render loop never touches a backend directly. It drives a
//! [`GraphicsDevice`] through the same call surface every backend shares:
//! init with platform data, create/destroy resources by handle, set per-draw
//! state, `submit`, then `frame`.

use bitflags::bitflags;
use serde::Deserialize;

use crate::platform::PlatformData;
use crate::vertex::VertexLayout;

pub type ViewId = u16;

/// Index value every handle type uses to mark itself invalid.
pub const INVALID_INDEX: u16 = u16::MAX;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            pub idx: u16,
        }

        impl $name {
            pub const INVALID: Self = Self { idx: INVALID_INDEX };

            pub const fn is_valid(self) -> bool {
                self.idx != INVALID_INDEX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }
    };
}

handle!(
    /// Static vertex buffer.
    VertexBufferHandle
);
handle!(
    /// Static index buffer.
    IndexBufferHandle
);
handle!(
    /// Compiled shader stage.
    ShaderHandle
);
handle!(
    /// Linked vertex + fragment program.
    ProgramHandle
);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererType {
    Noop,
    Agc,
    Direct3D11,
    Direct3D12,
    Gnm,
    Metal,
    Nvn,
    OpenGLES,
    OpenGL,
    Vulkan,
    /// Let the device pick.
    #[serde(rename = "auto")]
    Count,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ResetFlags: u32 {
        const MSAA_X2 = 1 << 4;
        const MSAA_X4 = 1 << 5;
        const MSAA_X8 = 1 << 6;
        const MSAA_X16 = 1 << 7;
        const VSYNC = 1 << 8;
        const MAX_ANISOTROPY = 1 << 9;
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u16 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct DebugFlags: u32 {
        const WIREFRAME = 1 << 0;
        const STATS = 1 << 2;
        const TEXT = 1 << 3;
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BufferFlags: u16 {
        const INDEX32 = 1 << 10;
    }
}

impl ResetFlags {
    /// Highest requested MSAA sample count, 1 when multisampling is off.
    pub fn msaa_samples(self) -> u32 {
        if self.contains(Self::MSAA_X16) {
            16
        } else if self.contains(Self::MSAA_X8) {
            8
        } else if self.contains(Self::MSAA_X4) {
            4
        } else if self.contains(Self::MSAA_X2) {
            2
        } else {
            1
        }
    }

    pub fn from_msaa_samples(samples: u32) -> Self {
        match samples {
            0 | 1 => Self::empty(),
            2 => Self::MSAA_X2,
            3 | 4 => Self::MSAA_X4,
            5..=8 => Self::MSAA_X8,
            _ => Self::MSAA_X16,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub reset: ResetFlags,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Limits {
    pub transient_vb_size: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            transient_vb_size: 1024 * 1024 * 24,
        }
    }
}

/// Everything a device needs to come up against a native window.
#[derive(Debug, Clone)]
pub struct Init {
    pub renderer_type: RendererType,
    /// PCI vendor id to prefer, 0 for any.
    pub vendor_id: u16,
    pub resolution: Resolution,
    pub platform_data: PlatformData,
    pub limits: Limits,
}

impl Init {
    pub fn new(platform_data: PlatformData) -> Self {
        Self {
            renderer_type: RendererType::Count,
            vendor_id: 0,
            resolution: Resolution {
                width: 1280,
                height: 720,
                reset: ResetFlags::empty(),
            },
            platform_data,
            limits: Limits::default(),
        }
    }
}

/// The graphics library as the render loop sees it.
///
/// Creation calls return an invalid handle on failure instead of an error;
/// callers check `is_valid()` before destroying. Draw state set through
/// `set_vertex_buffer`/`set_index_buffer`/`set_transform` is consumed by the
/// next `submit`. `frame` blocks on frame pacing and returns the running
/// frame counter.
pub trait GraphicsDevice: Sized {
    fn init(init: &Init) -> anyhow::Result<Self>;
    fn shutdown(self);

    fn renderer_type(&self) -> RendererType;
    fn reset(&mut self, width: u32, height: u32, flags: ResetFlags);
    fn set_debug(&mut self, flags: DebugFlags);

    fn set_view_clear(&mut self, view: ViewId, flags: ClearFlags, rgba: u32, depth: f32, stencil: u8);
    fn set_view_rect(&mut self, view: ViewId, x: u16, y: u16, width: u16, height: u16);
    fn set_view_transform(&mut self, view: ViewId, view_mtx: &glam::Mat4, proj_mtx: &glam::Mat4);

    fn create_shader(&mut self, code: &[u8]) -> ShaderHandle;
    fn destroy_shader(&mut self, handle: ShaderHandle);
    fn create_program(&mut self, vsh: ShaderHandle, fsh: ShaderHandle, destroy_shaders: bool) -> ProgramHandle;
    fn destroy_program(&mut self, handle: ProgramHandle);

    fn create_vertex_buffer(&mut self, data: &[u8], layout: &VertexLayout) -> VertexBufferHandle;
    fn destroy_vertex_buffer(&mut self, handle: VertexBufferHandle);
    fn create_index_buffer(&mut self, data: &[u8], flags: BufferFlags) -> IndexBufferHandle;
    fn destroy_index_buffer(&mut self, handle: IndexBufferHandle);

    fn set_vertex_buffer(&mut self, stream: u8, handle: VertexBufferHandle, start_vertex: u32, num_vertices: u32);
    fn set_index_buffer(&mut self, handle: IndexBufferHandle, first_index: u32, num_indices: u32);
    fn set_transform(&mut self, mtx: &glam::Mat4);
    fn submit(&mut self, view: ViewId, program: ProgramHandle, depth: u32);

    fn frame(&mut self) -> u32;
}

/// Slot storage behind the `u16` handles. Freed slots are reused.
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<u16>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub const CAPACITY: usize = 4096;

    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> Option<u16> {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(value);
            return Some(idx);
        }
        if self.slots.len() >= Self::CAPACITY {
            return None;
        }
        self.slots.push(Some(value));
        Some((self.slots.len() - 1) as u16)
    }

    pub fn get(&self, idx: u16) -> Option<&T> {
        self.slots.get(idx as usize).and_then(Option::as_ref)
    }

    pub fn remove(&mut self, idx: u16) -> Option<T> {
        let value = self.slots.get_mut(idx as usize)?.take()?;
        self.free.push(idx);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
