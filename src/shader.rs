//! Precompiled shader lookup and loading.
//!
//! Shaders live under `<root>/<backend dir>/<name>.bin`. The bytes are
//! handed to the device unmodified. Every failure is logged and turned into
//! an invalid handle; nothing here retries.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::gfx::{GraphicsDevice, ProgramHandle, RendererType, ShaderHandle};

/// Directory the compiled shaders for a backend are stored in.
pub fn shader_dir(renderer: RendererType) -> Option<&'static str> {
    match renderer {
        RendererType::Direct3D11 | RendererType::Direct3D12 => Some("dx11"),
        RendererType::Gnm => Some("pssl"),
        RendererType::Metal => Some("metal"),
        RendererType::OpenGL => Some("glsl"),
        RendererType::OpenGLES => Some("essl"),
        RendererType::Vulkan => Some("spirv"),
        RendererType::Noop | RendererType::Agc | RendererType::Nvn | RendererType::Count => None,
    }
}

/// Relative asset path of a shader for a backend directory.
pub fn shader_path(dir: &str, name: &str) -> PathBuf {
    Path::new(dir).join(format!("{name}.bin"))
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("no shader directory for {0:?}")]
    UnsupportedBackend(RendererType),
    #[error("shader file {0} not found")]
    NotFound(PathBuf),
    #[error("shader file {0} is empty")]
    Empty(PathBuf),
    #[error("shader model not supported for {0}")]
    Rejected(PathBuf),
    #[error("could not read shader file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where shader bytes come from. Passed explicitly to the loader.
pub trait AssetSource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Assets rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `shaders/` next to the running executable.
    pub fn beside_executable() -> io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory"))?;
        Ok(Self::new(dir.join("shaders")))
    }

    /// Configured root if any, else `shaders/` beside the executable, else
    /// the in-tree `assets/shaders` for runs from the source checkout.
    pub fn resolve(configured: Option<&Path>) -> io::Result<Self> {
        if let Some(root) = configured {
            return Ok(Self::new(root));
        }
        let beside = Self::beside_executable()?;
        if beside.root.is_dir() {
            return Ok(beside);
        }
        log::debug!("{} missing, using assets/shaders", beside.root.display());
        Ok(Self::new("assets/shaders"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for DirAssets {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(path))
    }
}

/// Assets packaged in the APK, read through the activity's asset manager.
#[cfg(all(target_os = "android", feature = "winit"))]
#[derive(Debug, Clone)]
pub struct AndroidAssets {
    app: winit::platform::android::activity::AndroidApp,
    root: PathBuf,
}

#[cfg(all(target_os = "android", feature = "winit"))]
impl AndroidAssets {
    pub fn new(app: winit::platform::android::activity::AndroidApp) -> Self {
        Self {
            app,
            root: PathBuf::from("shaders"),
        }
    }
}

#[cfg(all(target_os = "android", feature = "winit"))]
impl AssetSource for AndroidAssets {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        use std::io::Read;

        let full = self.root.join(path);
        let name = std::ffi::CString::new(full.to_string_lossy().into_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut asset = self
            .app
            .asset_manager()
            .open(&name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("asset {} not found", full.display())))?;
        let mut bytes = Vec::new();
        asset.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

fn try_load_shader<G: GraphicsDevice>(
    gfx: &mut G,
    assets: &dyn AssetSource,
    name: &str,
) -> Result<ShaderHandle, ShaderError> {
    let renderer = gfx.renderer_type();
    let dir = shader_dir(renderer).ok_or(ShaderError::UnsupportedBackend(renderer))?;
    let path = shader_path(dir, name);

    let bytes = assets.read(&path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ShaderError::NotFound(path.clone()),
        _ => ShaderError::Io {
            path: path.clone(),
            source,
        },
    })?;
    if bytes.is_empty() {
        return Err(ShaderError::Empty(path));
    }

    let handle = gfx.create_shader(&bytes);
    if !handle.is_valid() {
        return Err(ShaderError::Rejected(path));
    }
    log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
    Ok(handle)
}

/// Loads `<name>.bin` for the device's active backend.
pub fn load_shader<G: GraphicsDevice>(gfx: &mut G, assets: &dyn AssetSource, name: &str) -> ShaderHandle {
    match try_load_shader(gfx, assets, name) {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("{e}");
            ShaderHandle::INVALID
        }
    }
}

/// Loads a vertex/fragment pair and links them. The shader handles are
/// released once the program exists.
pub fn load_program<G: GraphicsDevice>(gfx: &mut G, assets: &dyn AssetSource, vs: &str, fs: &str) -> ProgramHandle {
    let vsh = load_shader(gfx, assets, vs);
    let fsh = load_shader(gfx, assets, fs);
    gfx.create_program(vsh, fsh, true)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gfx::{GraphicsDevice, Init};
    use crate::platform::tests::xlib_platform;
    use crate::recording::{Call, RecordingDevice};
    use std::cell::Cell;
    use std::collections::HashMap;

    /// In-memory asset source that counts reads.
    #[derive(Default)]
    pub(crate) struct MemoryAssets {
        pub(crate) files: HashMap<PathBuf, Vec<u8>>,
        pub(crate) reads: Cell<usize>,
    }

    impl MemoryAssets {
        pub(crate) fn with_cubes(dir: &str) -> Self {
            let mut assets = Self::default();
            assets.files.insert(shader_path(dir, "vs_cubes"), b"vertex".to_vec());
            assets.files.insert(shader_path(dir, "fs_cubes"), b"fragment".to_vec());
            assets
        }
    }

    impl AssetSource for MemoryAssets {
        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.reads.set(self.reads.get() + 1);
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
    }

    fn device(renderer: RendererType) -> RecordingDevice {
        let mut init = Init::new(xlib_platform());
        init.renderer_type = renderer;
        RecordingDevice::init(&init).unwrap()
    }

    #[test]
    fn backend_directories() {
        let expected = [
            (RendererType::Direct3D11, "dx11"),
            (RendererType::Direct3D12, "dx11"),
            (RendererType::Gnm, "pssl"),
            (RendererType::Metal, "metal"),
            (RendererType::OpenGL, "glsl"),
            (RendererType::OpenGLES, "essl"),
            (RendererType::Vulkan, "spirv"),
        ];
        for (renderer, dir) in expected {
            assert_eq!(shader_dir(renderer), Some(dir), "{renderer:?}");
        }
        assert_eq!(shader_dir(RendererType::Noop), None);
        assert_eq!(shader_path("spirv", "vs_cubes"), Path::new("spirv/vs_cubes.bin"));
    }

    #[test]
    fn noop_backend_never_reads_assets() {
        let mut gfx = device(RendererType::Noop);
        let assets = MemoryAssets::with_cubes("spirv");
        let handle = load_shader(&mut gfx, &assets, "vs_cubes");
        assert!(!handle.is_valid());
        assert_eq!(assets.reads.get(), 0);
        assert!(!gfx.calls().iter().any(|c| matches!(c, Call::CreateShader(_))));
    }

    #[test]
    fn missing_and_empty_files_are_invalid() {
        let mut gfx = device(RendererType::Vulkan);
        let mut assets = MemoryAssets::default();
        assets.files.insert(shader_path("spirv", "empty"), Vec::new());

        assert!(!load_shader(&mut gfx, &assets, "missing").is_valid());
        assert!(!load_shader(&mut gfx, &assets, "empty").is_valid());
        assert!(matches!(
            try_load_shader(&mut gfx, &assets, "empty"),
            Err(ShaderError::Empty(_))
        ));
        assert!(!gfx.calls().iter().any(|c| matches!(c, Call::CreateShader(_))));
    }

    #[test]
    fn rejected_bytecode_is_invalid() {
        let mut gfx = device(RendererType::Metal);
        let mut assets = MemoryAssets::default();
        assets
            .files
            .insert(shader_path("metal", "vs_cubes"), RecordingDevice::REJECTED.to_vec());
        assert!(matches!(
            try_load_shader(&mut gfx, &assets, "vs_cubes"),
            Err(ShaderError::Rejected(_))
        ));
    }

    #[test]
    fn program_from_valid_pair() {
        let mut gfx = device(RendererType::OpenGLES);
        let assets = MemoryAssets::with_cubes("essl");
        let program = load_program(&mut gfx, &assets, "vs_cubes", "fs_cubes");
        assert!(program.is_valid());
        assert_eq!(assets.reads.get(), 2);
    }

    #[test]
    fn dir_assets_reads_relative_to_root() {
        let root = std::env::temp_dir().join(format!("cubes-rs-assets-{}", std::process::id()));
        std::fs::create_dir_all(root.join("glsl")).unwrap();
        std::fs::write(root.join("glsl/fs_cubes.bin"), b"abc").unwrap();

        let assets = DirAssets::new(&root);
        assert_eq!(assets.read(&shader_path("glsl", "fs_cubes")).unwrap(), b"abc");
        let err = assets.read(&shader_path("glsl", "vs_cubes")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn configured_root_wins() {
        let assets = DirAssets::resolve(Some(Path::new("/opt/cubes/shaders"))).unwrap();
        assert_eq!(assets.root(), Path::new("/opt/cubes/shaders"));
    }
}
