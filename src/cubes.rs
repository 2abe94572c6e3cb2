//! The spinning cube render loop.
//!
//! Shell-agnostic: shells acquire a native window, hand its [`PlatformData`]
//! to [`CubesApp::initialize`], then call [`CubesApp::update`] once per
//! display refresh. Everything the app creates is torn down before the
//! device shuts down, and the shell must run [`CubesApp::destroy`] before
//! it drops the window.

use anyhow::Context;

use crate::camera::{Camera, FixedCamera, model_transform};
use crate::config::SampleConfig;
use crate::gfx::{
    BufferFlags, ClearFlags, GraphicsDevice, IndexBufferHandle, Init, ProgramHandle, Resolution, VertexBufferHandle,
    ViewId,
};
use crate::mesh::PosColorVertex;
use crate::platform::PlatformData;
use crate::primitives::{CUBE_TRI_LIST, CUBE_VERTICES};
use crate::shader::{AssetSource, load_program, shader_dir};

pub const MAIN_VIEW: ViewId = 0;
const DRAW_DEPTH: u32 = 1000;

pub struct CubesApp<G: GraphicsDevice> {
    config: SampleConfig,
    gfx: Option<G>,
    camera: FixedCamera,
    vbh: VertexBufferHandle,
    ibh: IndexBufferHandle,
    program: ProgramHandle,
    counter: u32,
    width: u32,
    height: u32,
    available: bool,
}

impl<G: GraphicsDevice> std::fmt::Debug for CubesApp<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CubesApp")
            .field("initialized", &self.gfx.is_some())
            .field("vbh", &self.vbh)
            .field("ibh", &self.ibh)
            .field("program", &self.program)
            .field("counter", &self.counter)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("available", &self.available)
            .finish()
    }
}

impl<G: GraphicsDevice> CubesApp<G> {
    pub fn new(config: SampleConfig) -> Self {
        let camera = FixedCamera::for_resolution(config.width, config.height);
        Self {
            width: config.width,
            height: config.height,
            config,
            gfx: None,
            camera,
            vbh: VertexBufferHandle::INVALID,
            ibh: IndexBufferHandle::INVALID,
            program: ProgramHandle::INVALID,
            counter: 0,
            available: false,
        }
    }

    /// Brings the device up against `platform` and uploads the cube.
    ///
    /// Anything from a previous initialization is torn down first. A failing
    /// shader does not fail initialization: the program stays invalid and
    /// nothing is drawn.
    pub fn initialize(
        &mut self,
        platform: PlatformData,
        width: u32,
        height: u32,
        assets: &dyn AssetSource,
    ) -> anyhow::Result<()> {
        self.destroy();
        log::debug!("Initializing {width}x{height}");

        let reset = self.config.reset_flags();
        let mut init = Init::new(platform);
        init.renderer_type = self.config.renderer;
        init.resolution = Resolution { width, height, reset };
        let mut gfx = G::init(&init).context("initializing graphics device")?;

        gfx.reset(width, height, reset);
        gfx.set_debug(self.config.debug_flags());
        Self::configure_view(&mut gfx, self.config.clear_color, width, height);

        let renderer = gfx.renderer_type();
        match shader_dir(renderer) {
            Some(dir) => log::info!("Renderer {renderer:?}, shaders from {dir}/"),
            None => log::warn!("Renderer {renderer:?} has no shaders, nothing will be drawn"),
        }

        let layout = PosColorVertex::layout(renderer).context("building cube vertex layout")?;
        self.program = load_program(&mut gfx, assets, "vs_cubes", "fs_cubes");
        self.vbh = gfx.create_vertex_buffer(bytemuck::cast_slice(CUBE_VERTICES), &layout);
        self.ibh = gfx.create_index_buffer(bytemuck::cast_slice(CUBE_TRI_LIST), BufferFlags::INDEX32);

        self.gfx = Some(gfx);
        self.width = width;
        self.height = height;
        self.camera.update_aspect(glam::UVec2::new(width, height));
        self.available = true;
        Ok(())
    }

    fn configure_view(gfx: &mut G, clear_color: u32, width: u32, height: u32) {
        gfx.set_view_clear(MAIN_VIEW, ClearFlags::COLOR | ClearFlags::DEPTH, clear_color, 1.0, 0);
        gfx.set_view_rect(MAIN_VIEW, 0, 0, clamp_u16(width), clamp_u16(height));
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.camera.update_aspect(glam::UVec2::new(width, height));
        if let Some(gfx) = self.gfx.as_mut() {
            log::debug!("Resize to {width}x{height}");
            gfx.reset(width, height, self.config.reset_flags());
            Self::configure_view(gfx, self.config.clear_color, width, height);
        }
    }

    /// Draws one frame and returns the new frame counter. Does nothing until
    /// initialized, or while the surface is unavailable.
    pub fn update(&mut self) -> Option<u32> {
        if !self.available {
            return None;
        }
        let gfx = self.gfx.as_mut()?;

        gfx.set_view_transform(MAIN_VIEW, self.camera.view_matrix(), self.camera.proj_matrix());
        gfx.set_vertex_buffer(0, self.vbh, 0, CUBE_VERTICES.len() as u32);
        gfx.set_index_buffer(self.ibh, 0, CUBE_TRI_LIST.len() as u32);
        gfx.set_transform(&model_transform(self.counter));
        gfx.submit(MAIN_VIEW, self.program, DRAW_DEPTH);

        self.counter = gfx.frame();
        Some(self.counter)
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available && self.gfx.is_some();
    }

    /// The host went to the background. Rendering stops, resources stay.
    pub fn suspend(&mut self) {
        log::debug!("Suspend");
        self.set_available(false);
    }

    /// Rendering resumes if the device is still up. A lost surface needs a
    /// fresh [`initialize`](Self::initialize) instead.
    pub fn resume(&mut self) {
        log::debug!("Resume");
        self.set_available(true);
    }

    /// Releases everything created by `initialize` and shuts the device
    /// down. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        self.available = false;
        let Some(mut gfx) = self.gfx.take() else {
            return;
        };
        if self.vbh.is_valid() {
            gfx.destroy_vertex_buffer(self.vbh);
            self.vbh = VertexBufferHandle::INVALID;
        }
        if self.ibh.is_valid() {
            gfx.destroy_index_buffer(self.ibh);
            self.ibh = IndexBufferHandle::INVALID;
        }
        if self.program.is_valid() {
            gfx.destroy_program(self.program);
            self.program = ProgramHandle::INVALID;
        }
        gfx.shutdown();
        log::debug!("Graphics device shut down");
    }

    pub fn config(&self) -> &SampleConfig {
        &self.config
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn camera(&self) -> &FixedCamera {
        &self.camera
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }
}

impl<G: GraphicsDevice> Drop for CubesApp<G> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn clamp_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::rotation_angles;
    use crate::gfx::RendererType;
    use crate::platform::tests::xlib_platform;
    use crate::recording::{Call, RecordingDevice, take_calls};
    use crate::shader::tests::MemoryAssets;
    use crate::vertex::{Attrib, AttribType};

    fn config(renderer: RendererType) -> SampleConfig {
        SampleConfig {
            renderer,
            ..SampleConfig::default()
        }
    }

    fn initialized(renderer: RendererType, dir: &str) -> CubesApp<RecordingDevice> {
        let mut app = CubesApp::new(config(renderer));
        app.initialize(xlib_platform(), 1280, 720, &MemoryAssets::with_cubes(dir))
            .unwrap();
        app
    }

    fn position(calls: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
        calls.iter().position(pred).expect("call not recorded")
    }

    #[test]
    fn initialization_follows_call_order() {
        take_calls();
        let app = initialized(RendererType::Vulkan, "spirv");
        assert!(app.program().is_valid());
        let calls = take_calls();

        let init = position(&calls, |c| matches!(c, Call::Init { width: 1280, height: 720 }));
        let reset = position(&calls, |c| matches!(c, Call::Reset { .. }));
        let clear = position(&calls, |c| matches!(c, Call::SetViewClear { rgba: 0x443355FF, .. }));
        let shader = position(&calls, |c| matches!(c, Call::CreateShader(_)));
        let program = position(&calls, |c| matches!(c, Call::CreateProgram(_)));
        let vb = position(&calls, |c| matches!(c, Call::CreateVertexBuffer { .. }));
        let ib = position(&calls, |c| matches!(c, Call::CreateIndexBuffer { .. }));
        assert!(init < reset && reset < clear && clear < shader);
        assert!(shader < program && program < vb && vb < ib);

        match &calls[vb] {
            Call::CreateVertexBuffer { len, layout, .. } => {
                assert_eq!(*len, 8 * 16);
                let attrs = layout.attributes();
                assert_eq!(attrs.len(), 2);
                assert_eq!((attrs[0].attrib, attrs[0].num, attrs[0].ty), (Attrib::Position, 3, AttribType::Float));
                assert_eq!((attrs[1].attrib, attrs[1].num, attrs[1].ty), (Attrib::Color0, 4, AttribType::Uint8));
                assert!(attrs[1].normalized);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &calls[ib] {
            Call::CreateIndexBuffer { len, flags, .. } => {
                assert_eq!(*len, 36 * 4);
                assert_eq!(*flags, BufferFlags::INDEX32);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_before_initialize_draws_nothing() {
        take_calls();
        let mut app: CubesApp<RecordingDevice> = CubesApp::new(SampleConfig::default());
        app.set_available(true);
        assert_eq!(app.update(), None);
        assert!(!app.is_available());
        assert!(take_calls().is_empty());
    }

    #[test]
    fn frame_submits_one_draw_and_advances_counter() {
        let mut app = initialized(RendererType::Vulkan, "spirv");
        take_calls();

        assert_eq!(app.update(), Some(1));
        let calls = take_calls();
        let submits = calls.iter().filter(|c| matches!(c, Call::Submit { .. })).count();
        assert_eq!(submits, 1);
        assert!(calls.contains(&Call::SetVertexBuffer {
            handle: VertexBufferHandle { idx: 0 },
            num: 8
        }));
        assert!(calls.contains(&Call::SetIndexBuffer {
            handle: IndexBufferHandle { idx: 0 },
            num: 36
        }));
        assert!(calls.contains(&Call::SetTransform(glam::Mat4::IDENTITY)));
        assert_eq!(calls.last(), Some(&Call::Frame(1)));

        assert_eq!(app.update(), Some(2));
        let calls = take_calls();
        assert!(calls.contains(&Call::SetTransform(model_transform(1))));
        assert_eq!(rotation_angles(app.counter()), (0.02, 0.02));
    }

    #[test]
    fn view_transform_uses_720p_projection() {
        let mut app = initialized(RendererType::Vulkan, "spirv");
        take_calls();
        app.update();
        let calls = take_calls();
        let proj = calls
            .iter()
            .find_map(|c| match c {
                Call::SetViewTransform { proj_mtx, .. } => Some(*proj_mtx),
                _ => None,
            })
            .unwrap();
        assert_eq!(app.camera().aspect(), 1280.0 / 720.0);
        assert_eq!(app.camera().fovy(), 60_f32.to_radians());
        assert_eq!(proj, *app.camera().proj_matrix());
    }

    #[test]
    fn unavailable_surface_skips_frames() {
        let mut app = initialized(RendererType::Vulkan, "spirv");
        app.suspend();
        take_calls();
        assert_eq!(app.update(), None);
        assert!(take_calls().is_empty());
        app.resume();
        assert_eq!(app.update(), Some(1));
    }

    #[test]
    fn suspended_app_reports_no_frame_until_resumed() {
        let mut app = initialized(RendererType::Vulkan, "spirv");
        assert_eq!(app.update(), Some(1));
        app.suspend();
        take_calls();
        for _ in 0..3 {
            assert_eq!(app.update(), None);
        }
        assert!(!take_calls().iter().any(|c| matches!(c, Call::Frame(_))));
        app.resume();
        assert_eq!(app.update(), Some(2));
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut app = initialized(RendererType::Vulkan, "spirv");
        take_calls();
        app.destroy();
        app.destroy();
        drop(app);

        let calls = take_calls();
        let count = |pred: fn(&Call) -> bool| calls.iter().filter(|c| pred(c)).count();
        assert_eq!(count(|c| matches!(c, Call::DestroyVertexBuffer(_))), 1);
        assert_eq!(count(|c| matches!(c, Call::DestroyIndexBuffer(_))), 1);
        assert_eq!(count(|c| matches!(c, Call::DestroyProgram(_))), 1);
        assert_eq!(count(|c| matches!(c, Call::Shutdown)), 1);
        assert_eq!(calls.last(), Some(&Call::Shutdown));
    }

    #[test]
    fn missing_shaders_leave_program_invalid() {
        take_calls();
        let mut app = initialized(RendererType::Noop, "spirv");
        assert!(!app.program().is_valid());
        assert_eq!(app.update(), Some(1));

        app.destroy();
        let calls = take_calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::DestroyProgram(_))));
        assert!(calls.contains(&Call::Submit {
            view: MAIN_VIEW,
            program: ProgramHandle::INVALID
        }));
    }

    #[test]
    fn reinitialize_tears_down_first() {
        let mut app = initialized(RendererType::Vulkan, "spirv");
        take_calls();
        app.initialize(xlib_platform(), 640, 480, &MemoryAssets::with_cubes("spirv"))
            .unwrap();
        let calls = take_calls();
        let shutdown = position(&calls, |c| matches!(c, Call::Shutdown));
        let init = position(&calls, |c| matches!(c, Call::Init { width: 640, height: 480 }));
        assert!(shutdown < init);
        assert_eq!(app.size(), (640, 480));
    }

    #[test]
    fn resize_resets_device_and_view() {
        let mut app = initialized(RendererType::Vulkan, "spirv");
        take_calls();
        app.resize(1920, 1080);
        app.resize(1920, 1080);
        app.resize(0, 1080);
        let calls = take_calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Reset { .. })).count(), 1);
        assert!(calls.contains(&Call::SetViewRect {
            view: MAIN_VIEW,
            width: 1920,
            height: 1080
        }));
        assert_eq!(app.camera().aspect(), 1920.0 / 1080.0);
    }
}
