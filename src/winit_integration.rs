use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::config::SampleConfig;
use crate::cubes::CubesApp;
use crate::platform::PlatformData;
use crate::shader::AssetSource;
use crate::surface::{SurfaceAction, SurfaceEvent, SurfaceLifecycle};
use crate::wgpu_backend::WgpuDevice;

/// Event-loop shell. The native window may come and go (Android), so the
/// device is only brought up once the surface lifecycle reports it ready.
pub struct App {
    surface: SurfaceLifecycle<Arc<Window>>,
    cubes: CubesApp<WgpuDevice>,
    assets: Box<dyn AssetSource>,
    failure: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: SampleConfig, assets: Box<dyn AssetSource>) -> Self {
        Self {
            surface: SurfaceLifecycle::new(),
            cubes: CubesApp::new(config),
            assets,
            failure: None,
        }
    }

    fn window_attributes(&self) -> winit::window::WindowAttributes {
        let config = self.cubes.config();
        Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
    }

    fn surface_event(&mut self, event_loop: &ActiveEventLoop, event: SurfaceEvent<Arc<Window>>) {
        match self.surface.handle(event) {
            SurfaceAction::None => {}
            SurfaceAction::Bind { width, height } => self.bind(event_loop, width, height),
            SurfaceAction::Resize { width, height } => self.cubes.resize(width, height),
            SurfaceAction::Rebind { released, width, height } => {
                self.cubes.destroy();
                drop(released);
                self.bind(event_loop, width, height);
            }
            SurfaceAction::Unbind { released } => {
                self.cubes.destroy();
                drop(released);
            }
        }
    }

    fn bind(&mut self, event_loop: &ActiveEventLoop, width: u32, height: u32) {
        let Some(window) = self.surface.window().cloned() else {
            return;
        };
        let result = PlatformData::from_window(window.as_ref())
            .map_err(anyhow::Error::from)
            .and_then(|platform| self.cubes.initialize(platform, width, height, self.assets.as_ref()));
        match result {
            Ok(()) => window.request_redraw(),
            Err(e) => {
                log::error!("Unable to initialize graphics: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn request_redraw(&self) {
        if let Some(window) = self.surface.window() {
            window.request_redraw();
        }
    }

    fn is_current(&self, id: WindowId) -> bool {
        self.surface.window().is_some_and(|w| w.id() == id)
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_ready() {
            self.cubes.resume();
            self.request_redraw();
            return;
        }
        let window = match event_loop.create_window(self.window_attributes()) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Unable to create window: {e}");
                self.failure = Some(anyhow::anyhow!("creating window: {e}"));
                event_loop.exit();
                return;
            }
        };
        log::debug!("Winit window created.");
        let size = window.inner_size();
        self.surface_event(event_loop, SurfaceEvent::Created);
        self.surface_event(event_loop, SurfaceEvent::WindowAcquired(window));
        self.surface_event(
            event_loop,
            SurfaceEvent::Changed {
                width: size.width,
                height: size.height,
            },
        );
    }

    fn suspended(&mut self, event_loop: &ActiveEventLoop) {
        // The native window does not outlive a suspend on Android.
        self.cubes.suspend();
        self.surface_event(event_loop, SurfaceEvent::Destroyed);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if !self.is_current(window_id) {
            return;
        }
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => event_loop.exit(),
            WindowEvent::Resized(size) => self.surface_event(
                event_loop,
                SurfaceEvent::Changed {
                    width: size.width,
                    height: size.height,
                },
            ),
            WindowEvent::Occluded(true) => self.cubes.suspend(),
            WindowEvent::Occluded(false) => {
                self.cubes.resume();
                self.request_redraw();
            }
            // Redraws stop while nothing is drawn and restart on resume.
            WindowEvent::RedrawRequested => {
                if self.cubes.update().is_some() {
                    self.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, event_loop: &ActiveEventLoop) {
        self.surface_event(event_loop, SurfaceEvent::Destroyed);
    }
}

/// Runs the sample on `event_loop` until the window closes. Returns the
/// error that stopped the loop, if any.
pub fn run(event_loop: EventLoop<()>, config: SampleConfig, assets: Box<dyn AssetSource>) -> anyhow::Result<()> {
    let mut app = App::new(config, assets);
    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
