//! Native window/display handle pair handed to the graphics device.
//!
//! The OS family is decided once, from the raw window handle the shell
//! produces. Nothing downstream branches on the platform again.

use raw_window_handle::{
    AndroidDisplayHandle, AppKitDisplayHandle, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WindowsDisplayHandle,
};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
    Android,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unsupported native window handle: {0}")]
    UnsupportedWindow(String),
    #[error("could not query native handles: {0}")]
    Handle(#[from] raw_window_handle::HandleError),
}

/// Display and window handle of the surface the device attaches to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlatformData {
    pub window: RawWindowHandle,
    /// Only X11/Wayland need a display connection.
    pub display: Option<RawDisplayHandle>,
    pub family: OsFamily,
}

impl PlatformData {
    pub fn from_handles(window: RawWindowHandle, display: RawDisplayHandle) -> Result<Self, PlatformError> {
        let (family, display) = match window {
            RawWindowHandle::Xlib(_) | RawWindowHandle::Xcb(_) | RawWindowHandle::Wayland(_) => {
                (OsFamily::Linux, Some(display))
            }
            RawWindowHandle::AppKit(_) => (OsFamily::MacOs, None),
            RawWindowHandle::Win32(_) => (OsFamily::Windows, None),
            RawWindowHandle::AndroidNdk(_) => (OsFamily::Android, None),
            other => return Err(PlatformError::UnsupportedWindow(format!("{other:?}"))),
        };
        log::debug!("Platform data for {family:?}: window {window:?}");
        Ok(Self {
            window,
            display,
            family,
        })
    }

    pub fn from_window<W>(window: &W) -> Result<Self, PlatformError>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        let raw_window = window.window_handle()?.as_raw();
        let raw_display = window.display_handle()?.as_raw();
        Self::from_handles(raw_window, raw_display)
    }

    /// Display handle for surface creation. Families without a display
    /// connection get their empty marker handle.
    pub fn raw_display_handle(&self) -> RawDisplayHandle {
        match (self.display, self.family) {
            (Some(display), _) => display,
            (None, OsFamily::MacOs) => RawDisplayHandle::AppKit(AppKitDisplayHandle::new()),
            (None, OsFamily::Android) => RawDisplayHandle::Android(AndroidDisplayHandle::new()),
            (None, OsFamily::Windows | OsFamily::Linux) => RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
        }
    }
}
