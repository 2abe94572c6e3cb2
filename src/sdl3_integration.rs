use crate::config::SampleConfig;
use crate::cubes::CubesApp;
use crate::platform::PlatformData;
use crate::shader::DirAssets;
use crate::wgpu_backend::WgpuDevice;
use anyhow::Context;
use sdl3::event::{Event, WindowEvent};

fn sdl_error<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> anyhow::Error {
    move |e| anyhow::anyhow!("{what}: {e}")
}

fn pixel_size(width: i32, height: i32) -> (u32, u32) {
    (width.max(0) as u32, height.max(0) as u32)
}

/// Desktop loop: drain SDL events, then draw one frame, until quit.
pub fn run(config: SampleConfig) -> anyhow::Result<()> {
    let sdl = sdl3::init().map_err(sdl_error("initializing SDL"))?;
    let video = sdl.video().map_err(sdl_error("initializing SDL video"))?;
    let window = video
        .window(&config.title, config.width, config.height)
        .position_centered()
        .build()
        .context("creating window")?;
    log::debug!("SDL3 window created.");

    let platform = PlatformData::from_window(&window).context("querying window handles")?;
    let assets = DirAssets::resolve(config.shader_root.as_deref()).context("locating shaders")?;
    log::info!("Loading shaders from {}", assets.root().display());

    // The drawable is larger than the logical size on HiDPI displays.
    let (width, height) = window.size_in_pixels();
    let mut app: CubesApp<WgpuDevice> = CubesApp::new(config);
    app.initialize(platform, width, height, &assets)?;

    let mut event_pump = sdl.event_pump().map_err(sdl_error("creating event pump"))?;
    'running: loop {
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => break 'running,
                Event::Window {
                    win_event: WindowEvent::PixelSizeChanged(w, h),
                    ..
                } => {
                    let (width, height) = pixel_size(w, h);
                    app.resize(width, height);
                }
                _ => {}
            }
        }
        app.update();
    }

    app.destroy();
    drop(window);
    Ok(())
}
