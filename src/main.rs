use cubes_rs::config::SampleConfig;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SampleConfig::from_env()?;
    log::info!("Starting {} at {}x{}", config.title, config.width, config.height);
    cubes_rs::sdl3_integration::run(config)
}
