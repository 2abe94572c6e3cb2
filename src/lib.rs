pub mod camera;
pub mod commands;
pub mod config;
pub mod cubes;
pub mod gfx;
pub mod mesh;
pub mod platform;
pub mod primitives;
pub mod shader;
pub mod surface;
pub mod vertex;
pub mod wgpu_backend;

#[cfg(feature = "sdl3")]
pub mod sdl3_integration;
#[cfg(feature = "winit")]
pub mod winit_integration;

#[cfg(test)]
mod recording;

#[cfg(all(target_os = "android", feature = "winit"))]
#[unsafe(no_mangle)]
fn android_main(app: winit::platform::android::activity::AndroidApp) {
    use winit::platform::android::EventLoopBuilderExtAndroid;

    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("cubes"),
    );

    let config = config::SampleConfig::default();
    set_window_display(&app, &config);

    let assets = Box::new(shader::AndroidAssets::new(app.clone()));
    let event_loop = match winit::event_loop::EventLoop::builder().with_android_app(app).build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Unable to create event loop: {e}");
            return;
        }
    };
    if let Err(e) = winit_integration::run(event_loop, config, assets) {
        log::error!("{e:#}");
    }
}

#[cfg(all(target_os = "android", feature = "winit"))]
fn set_window_display(app: &winit::platform::android::activity::AndroidApp, config: &config::SampleConfig) {
    use winit::platform::android::activity::WindowManagerFlags;

    let mut flags = WindowManagerFlags::empty();
    flags.set(WindowManagerFlags::KEEP_SCREEN_ON, config.keep_screen_on);
    flags.set(WindowManagerFlags::FULLSCREEN, config.fullscreen);
    log::debug!("Window flags {flags:?}");
    app.set_window_flags(flags, WindowManagerFlags::empty());
}
