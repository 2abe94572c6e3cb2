//! Sample configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::gfx::{DebugFlags, RendererType, ResetFlags};

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "CUBES_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SampleConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// `0xRRGGBBAA`
    pub clear_color: u32,
    pub vsync: bool,
    pub max_anisotropy: bool,
    pub msaa: u32,
    pub renderer: RendererType,
    pub shader_root: Option<PathBuf>,
    pub debug_stats: bool,
    /// Keep the display awake while the sample runs (Android).
    pub keep_screen_on: bool,
    /// Hide system bars (Android).
    pub fullscreen: bool,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            title: "SDL Bgfx sample".to_string(),
            width: 1280,
            height: 720,
            clear_color: 0x443355FF,
            vsync: true,
            max_anisotropy: true,
            msaa: 16,
            renderer: RendererType::Count,
            shader_root: None,
            debug_stats: true,
            keep_screen_on: true,
            fullscreen: true,
        }
    }
}

impl SampleConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Loads the file named by `CUBES_CONFIG`, or the defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                log::info!("Loading config from {}", Path::new(&path).display());
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn reset_flags(&self) -> ResetFlags {
        let mut flags = ResetFlags::from_msaa_samples(self.msaa);
        flags.set(ResetFlags::VSYNC, self.vsync);
        flags.set(ResetFlags::MAX_ANISOTROPY, self.max_anisotropy);
        flags
    }

    pub fn debug_flags(&self) -> DebugFlags {
        if self.debug_stats {
            DebugFlags::STATS | DebugFlags::TEXT
        } else {
            DebugFlags::empty()
        }
    }
}
