//! Windows
//!
//! A [`WaylandWindow`] composes one [`ShellSurface`] (which owns the drawing
//! surface) with one rendering context. Both are created lazily: the shell
//! surface on the first shell attribute assignment or at realization, the
//! rendering context only at realization.
//!
//! Windows live on the caller's thread. Protocol callbacks only ever see a
//! window's [`WidgetHandle`], stored in the surface user data, and that key
//! is cleared before anything else is torn down.

mod handle;
pub mod registry;

use std::sync::Arc;

use log::{debug, warn};
use wayland_client::protocol::wl_surface::WlSurface;

use crate::connection::ConnectionHandle;
use crate::error::{DisplayError, Result};
use crate::render::{RenderBackend, RenderContext};
use crate::surface::{ShellMode, ShellSurface};

pub use handle::WidgetHandle;
pub use registry::WindowRegistry;

/// Rectangle for window positioning and sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub const fn from_loc_and_size((x, y): (i32, i32), (width, height): (u32, u32)) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Allocation of a window that was never resized
pub const DEFAULT_ALLOCATION: Rectangle = Rectangle::from_loc_and_size((0, 0), (1, 1));

pub struct WaylandWindow {
    handle: WidgetHandle,
    connection: ConnectionHandle,
    render_backend: Option<Arc<dyn RenderBackend>>,
    render_context: Option<Box<dyn RenderContext>>,
    shell_surface: Option<ShellSurface>,
    allocation: Rectangle,
}

impl WaylandWindow {
    pub fn new(
        handle: WidgetHandle,
        connection: ConnectionHandle,
        render_backend: Option<Arc<dyn RenderBackend>>,
    ) -> Self {
        Self {
            handle,
            connection,
            render_backend,
            render_context: None,
            shell_surface: None,
            allocation: DEFAULT_ALLOCATION,
        }
    }

    pub fn handle(&self) -> WidgetHandle {
        self.handle
    }

    pub fn allocation(&self) -> Rectangle {
        self.allocation
    }

    /// Current presentation mode, `None` until a shell surface exists
    pub fn shell_mode(&self) -> ShellMode {
        self.shell_surface
            .as_ref()
            .map_or(ShellMode::None, ShellSurface::mode)
    }

    pub fn shell_surface(&self) -> Option<&ShellSurface> {
        self.shell_surface.as_ref()
    }

    pub fn wl_surface(&self) -> Option<&WlSurface> {
        self.shell_surface.as_ref().map(ShellSurface::wl_surface)
    }

    pub fn is_realized(&self) -> bool {
        self.render_context.is_some()
    }

    pub fn native_window(&self) -> Option<usize> {
        self.render_context.as_ref().map(|ctx| ctx.native_window())
    }

    /// Present the window as top-level, fullscreen or maximized.
    ///
    /// The first call creates the shell surface and always sends its
    /// request; later calls are no-ops when the mode does not change.
    pub fn set_shell_attributes(&mut self, mode: ShellMode) -> Result<()> {
        match mode {
            ShellMode::None => {
                return Err(DisplayError::InvalidState(
                    "a shell surface needs a presentation mode",
                ))
            }
            ShellMode::Popup => {
                return Err(DisplayError::InvalidState(
                    "popups are created with set_popup",
                ))
            }
            _ => {}
        }

        match self.shell_surface.as_mut() {
            Some(shell) => {
                shell.transition(crate::surface::Transition::SetMode(mode))?;
            }
            None => {
                self.shell_surface = Some(ShellSurface::new(
                    &self.connection,
                    self.handle,
                    mode,
                    None,
                    (0, 0),
                )?);
            }
        }
        self.connection.flush()
    }

    /// Present the window as a popup of `parent` at (`x`, `y`).
    ///
    /// On first creation the window becomes the grab target of the primary
    /// seat, if there is one.
    pub fn set_popup(&mut self, parent: Option<&WlSurface>, x: i32, y: i32) -> Result<()> {
        let parent =
            parent.ok_or(DisplayError::InvalidState("popup requires a parent surface"))?;

        match self.shell_surface.as_mut() {
            Some(shell) => {
                shell.set_popup(parent, x, y)?;
            }
            None => {
                self.shell_surface = Some(ShellSurface::new(
                    &self.connection,
                    self.handle,
                    ShellMode::Popup,
                    Some(parent.clone()),
                    (x, y),
                )?);

                let handle = self.handle;
                self.connection.with_state_mut(|state| {
                    if let Some(seat) = state.inputs_mut().primary_mut() {
                        seat.set_grab_window(handle, 0);
                    }
                });
            }
        }
        self.connection.flush()
    }

    /// Create the rendering context, giving the window a top-level shell
    /// surface first if it has none.
    pub fn realize(&mut self) -> Result<()> {
        if self.shell_surface.is_none() {
            warn!(
                "Window {} realized without shell attributes, defaulting to top-level",
                self.handle
            );
            self.set_shell_attributes(ShellMode::TopLevel)?;
        }

        if self.render_context.is_some() {
            return Ok(());
        }
        let Some(backend) = self.render_backend.as_ref() else {
            debug!("Window {} has no render backend, nothing to realize", self.handle);
            return Ok(());
        };
        let Some(surface) = self.wl_surface() else {
            return Err(DisplayError::InvalidState("window has no surface"));
        };

        let (width, height) = self.allocation.size();
        let context = backend.create_context(surface, width, height)?;
        self.render_context = Some(context);
        debug!("Window {} realized at {}x{}", self.handle, width, height);
        Ok(())
    }

    /// Change the allocation. Returns false when the size is unchanged.
    ///
    /// The rendering context is resized only once both it and the shell
    /// surface exist; before that only the cached allocation moves.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        if self.allocation.size() == (width, height) {
            return Ok(false);
        }
        self.allocation.width = width;
        self.allocation.height = height;

        if let (Some(_), Some(context)) = (&self.shell_surface, self.render_context.as_mut()) {
            context.resize(width, height);
            self.connection.flush()?;
        }
        debug!("Window {} resized to {}x{}", self.handle, width, height);
        Ok(true)
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.shell_mut("title set before the shell surface exists")?
            .set_title(title);
        self.connection.flush()
    }

    pub fn maximize(&mut self) -> Result<bool> {
        let sent = self.shell_mut("maximize before the shell surface exists")?.maximize()?;
        self.flush_if(sent)
    }

    /// Iconifying is not expressible through `wl_shell`
    pub fn minimize(&mut self) -> Result<bool> {
        Err(DisplayError::Unsupported("minimize"))
    }

    pub fn restore(&mut self) -> Result<bool> {
        let sent = self.shell_mut("restore before the shell surface exists")?.restore()?;
        self.flush_if(sent)
    }

    pub fn set_fullscreen(&mut self) -> Result<bool> {
        let sent = self
            .shell_mut("fullscreen before the shell surface exists")?
            .set_fullscreen()?;
        self.flush_if(sent)
    }

    fn shell_mut(&mut self, context: &'static str) -> Result<&mut ShellSurface> {
        self.shell_surface
            .as_mut()
            .ok_or(DisplayError::InvalidState(context))
    }

    fn flush_if(&self, sent: bool) -> Result<bool> {
        if sent {
            self.connection.flush()?;
        }
        Ok(sent)
    }
}

impl Drop for WaylandWindow {
    fn drop(&mut self) {
        // Callbacks must stop resolving this window before anything goes away.
        if let Some(shell) = &self.shell_surface {
            shell.drawing_surface().data().clear();
        }
        drop(self.render_context.take());
        drop(self.shell_surface.take());

        let handle = self.handle;
        self.connection
            .with_state_mut(|state| state.inputs_mut().release_grab_for(handle));
        if let Err(err) = self.connection.flush() {
            debug!("Flush after destroying window {} failed: {}", handle, err);
        }
    }
}

impl std::fmt::Debug for WaylandWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaylandWindow")
            .field("handle", &self.handle)
            .field("allocation", &self.allocation)
            .field("mode", &self.shell_mode())
            .field("realized", &self.is_realized())
            .finish()
    }
}
