//! Accelerated rendering seam
//!
//! Windows do not know which GPU stack draws into them. A [`RenderBackend`]
//! turns a realized window's `wl_surface` into a [`RenderContext`], which
//! the window owns and destroys before its shell surface.

use wayland_client::protocol::wl_surface::WlSurface;

use crate::error::Result;

/// Factory of per-window rendering contexts
pub trait RenderBackend {
    fn create_context(
        &self,
        surface: &WlSurface,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn RenderContext>>;
}

/// Rendering state bound to one surface
pub trait RenderContext {
    fn resize(&mut self, width: u32, height: u32);

    /// Native window handle handed to the GPU stack (e.g. `wl_egl_window*`)
    fn native_window(&self) -> usize;
}

#[cfg(feature = "egl")]
pub use egl::{EglWindow, EglWindowBackend};

#[cfg(feature = "egl")]
mod egl {
    use log::debug;
    use wayland_client::protocol::wl_surface::WlSurface;
    use wayland_client::Proxy;
    use wayland_egl::WlEglSurface;

    use super::{RenderBackend, RenderContext};
    use crate::error::{DisplayError, Result};

    /// `wl_egl_window` per realized window
    #[derive(Debug, Default, Clone, Copy)]
    pub struct EglWindowBackend;

    pub struct EglWindow {
        window: WlEglSurface,
    }

    impl RenderBackend for EglWindowBackend {
        fn create_context(
            &self,
            surface: &WlSurface,
            width: u32,
            height: u32,
        ) -> Result<Box<dyn RenderContext>> {
            let window = WlEglSurface::new(surface.id(), clamp(width), clamp(height))
                .map_err(|err| DisplayError::Render(err.to_string()))?;
            debug!("Created wl_egl_window {}x{}", width, height);
            Ok(Box::new(EglWindow { window }))
        }
    }

    impl RenderContext for EglWindow {
        fn resize(&mut self, width: u32, height: u32) {
            self.window.resize(clamp(width), clamp(height), 0, 0);
        }

        fn native_window(&self) -> usize {
            self.window.ptr() as usize
        }
    }

    fn clamp(value: u32) -> i32 {
        value.clamp(1, i32::MAX as u32) as i32
    }
}
