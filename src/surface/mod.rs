//! Drawing surfaces
//!
//! A [`DrawingSurface`] is one `wl_surface`, owned by exactly one
//! [`ShellSurface`]. The only user data attached to the protocol object is
//! a [`SurfaceData`] holding the owning window's handle, so callbacks look
//! windows up by key instead of holding a reference to them.

pub mod shell;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use wayland_client::protocol::wl_surface::{self, WlSurface};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use crate::connection::{ConnectionHandle, WaylandState};
use crate::error::{DisplayError, Result};
use crate::window::WidgetHandle;

pub use shell::{resolve, ShellMode, ShellSurface, Transition};

/// User data of every `wl_surface` created here
#[derive(Debug, Default)]
pub struct SurfaceData {
    window: AtomicU32,
}

impl SurfaceData {
    pub fn new(window: WidgetHandle) -> Self {
        Self {
            window: AtomicU32::new(window.get()),
        }
    }

    /// Owning window, or [`WidgetHandle::NULL`] once cleared
    pub fn window(&self) -> WidgetHandle {
        WidgetHandle::from_raw(self.window.load(Ordering::Acquire))
    }

    pub fn set_window(&self, window: WidgetHandle) {
        self.window.store(window.get(), Ordering::Release);
    }

    /// Detach the surface from its window
    pub fn clear(&self) {
        self.window.store(0, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct DrawingSurface {
    surface: WlSurface,
    data: Arc<SurfaceData>,
}

impl DrawingSurface {
    /// Create a `wl_surface` from the bound compositor global
    pub fn new(connection: &ConnectionHandle, window: WidgetHandle) -> Result<Self> {
        let compositor = connection
            .with_state(|state| state.registry().compositor().cloned())
            .ok_or(DisplayError::MissingGlobal("wl_compositor"))?;

        let data = Arc::new(SurfaceData::new(window));
        let surface = compositor.create_surface(connection.queue_handle(), data.clone());
        debug!("Created surface {} for window {}", surface.id(), window);

        Ok(Self { surface, data })
    }

    pub fn wl_surface(&self) -> &WlSurface {
        &self.surface
    }

    pub fn data(&self) -> &Arc<SurfaceData> {
        &self.data
    }

    pub fn window(&self) -> WidgetHandle {
        self.data.window()
    }
}

impl Drop for DrawingSurface {
    fn drop(&mut self) {
        self.data.clear();
        if self.surface.is_alive() {
            self.surface.destroy();
        }
        trace!("Destroyed surface {}", self.surface.id());
    }
}

impl Dispatch<WlSurface, Arc<SurfaceData>> for WaylandState {
    fn event(
        _state: &mut Self,
        surface: &WlSurface,
        event: wl_surface::Event,
        data: &Arc<SurfaceData>,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_surface::Event::Enter { output } => {
                trace!(
                    "Surface {} (window {}) entered output {}",
                    surface.id(),
                    data.window(),
                    output.id()
                );
            }
            wl_surface::Event::Leave { output } => {
                trace!(
                    "Surface {} (window {}) left output {}",
                    surface.id(),
                    data.window(),
                    output.id()
                );
            }
            _ => {}
        }
    }
}
