//! Shell surfaces and their presentation modes
//!
//! Mode changes go through [`resolve`], a pure function deciding whether a
//! requested transition produces a request to the compositor at all. Two
//! paths bypass it: [`ShellSurface::new`] always issues its first request,
//! and [`ShellSurface::set_popup`] also compares parent and position.

use log::{debug, warn};
use wayland_client::protocol::wl_shell_surface::{self, WlShellSurface};
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use std::sync::Arc;

use super::{DrawingSurface, SurfaceData};
use crate::connection::{ConnectionHandle, WaylandState};
use crate::error::{DisplayError, Result};
use crate::window::WidgetHandle;

/// How the compositor presents a surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ShellMode {
    #[default]
    None,
    TopLevel,
    Popup,
    Fullscreen,
    Maximized,
}

/// A requested change of presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    SetMode(ShellMode),
    Maximize,
    Fullscreen,
    Restore,
}

/// Mode a transition leads to from `current`, or `None` when nothing
/// should be sent.
///
/// Fullscreen absorbs maximize and restore; it only ends by an explicit
/// `SetMode`. Restoring a maximized surface yields a top-level one, any
/// other restore re-issues the current mode.
pub fn resolve(current: ShellMode, transition: Transition) -> Option<ShellMode> {
    match transition {
        Transition::SetMode(mode) if mode == current => None,
        Transition::SetMode(mode) => Some(mode),
        Transition::Maximize => match current {
            ShellMode::Fullscreen | ShellMode::Maximized => None,
            _ => Some(ShellMode::Maximized),
        },
        Transition::Fullscreen => match current {
            ShellMode::Fullscreen => None,
            _ => Some(ShellMode::Fullscreen),
        },
        Transition::Restore => match current {
            ShellMode::Fullscreen | ShellMode::None => None,
            ShellMode::Maximized => Some(ShellMode::TopLevel),
            other => Some(other),
        },
    }
}

/// `wl_shell_surface` bound to exactly one [`DrawingSurface`]
#[derive(Debug)]
pub struct ShellSurface {
    // Declared before `surface`: the role object goes away before the
    // wl_surface it is attached to.
    shell_surface: WlShellSurface,
    surface: DrawingSurface,
    connection: ConnectionHandle,
    mode: ShellMode,
    parent: Option<WlSurface>,
    position: (i32, i32),
    title: String,
}

impl ShellSurface {
    /// Create the drawing surface and its shell role, and issue the request
    /// for `mode` unconditionally.
    pub fn new(
        connection: &ConnectionHandle,
        window: WidgetHandle,
        mode: ShellMode,
        parent: Option<WlSurface>,
        position: (i32, i32),
    ) -> Result<Self> {
        if mode == ShellMode::None {
            return Err(DisplayError::InvalidState(
                "a shell surface needs a presentation mode",
            ));
        }
        if mode == ShellMode::Popup && parent.is_none() {
            return Err(DisplayError::InvalidState("popup requires a parent surface"));
        }

        let shell = connection
            .with_state(|state| state.registry().shell().cloned())
            .ok_or(DisplayError::MissingGlobal("wl_shell"))?;
        let surface = DrawingSurface::new(connection, window)?;
        let shell_surface = shell.get_shell_surface(
            surface.wl_surface(),
            connection.queue_handle(),
            surface.data().clone(),
        );

        let mut shell_surface = Self {
            shell_surface,
            surface,
            connection: connection.clone(),
            mode: ShellMode::None,
            parent,
            position,
            title: String::new(),
        };
        shell_surface.issue(mode)?;
        shell_surface.mode = mode;
        debug!("Window {} shell surface created as {:?}", window, mode);
        Ok(shell_surface)
    }

    /// Apply `transition`. Returns whether a request was sent.
    ///
    /// A shell surface cannot go back to having no mode.
    pub fn transition(&mut self, transition: Transition) -> Result<bool> {
        if transition == Transition::SetMode(ShellMode::None) {
            return Err(DisplayError::InvalidState(
                "a shell surface needs a presentation mode",
            ));
        }
        let Some(target) = resolve(self.mode, transition) else {
            debug!(
                "Window {}: {:?} ignored in {:?}",
                self.window(),
                transition,
                self.mode
            );
            return Ok(false);
        };

        if transition == Transition::Restore {
            self.position = (0, 0);
        }
        self.issue(target)?;
        self.mode = target;
        Ok(true)
    }

    pub fn set_toplevel(&mut self) -> Result<bool> {
        self.transition(Transition::SetMode(ShellMode::TopLevel))
    }

    /// Turn into a popup of `parent` at (`x`, `y`) in parent coordinates.
    ///
    /// An existing popup is re-issued when its parent or position changes.
    pub fn set_popup(&mut self, parent: &WlSurface, x: i32, y: i32) -> Result<bool> {
        let unchanged = self.parent.as_ref() == Some(parent) && self.position == (x, y);
        if self.mode == ShellMode::Popup && unchanged {
            return Ok(false);
        }

        let previous = (self.parent.replace(parent.clone()), self.position);
        self.position = (x, y);
        if let Err(err) = self.issue(ShellMode::Popup) {
            (self.parent, self.position) = previous;
            return Err(err);
        }
        self.mode = ShellMode::Popup;
        Ok(true)
    }

    pub fn maximize(&mut self) -> Result<bool> {
        self.transition(Transition::Maximize)
    }

    pub fn restore(&mut self) -> Result<bool> {
        self.transition(Transition::Restore)
    }

    pub fn set_fullscreen(&mut self) -> Result<bool> {
        self.transition(Transition::Fullscreen)
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        self.shell_surface.set_title(self.title.clone());
    }

    pub fn mode(&self) -> ShellMode {
        self.mode
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn parent(&self) -> Option<&WlSurface> {
        self.parent.as_ref()
    }

    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    pub fn drawing_surface(&self) -> &DrawingSurface {
        &self.surface
    }

    pub fn wl_surface(&self) -> &WlSurface {
        self.surface.wl_surface()
    }

    pub fn window(&self) -> WidgetHandle {
        self.surface.window()
    }

    fn issue(&self, mode: ShellMode) -> Result<()> {
        let (x, y) = self.position;
        match mode {
            ShellMode::None => {}
            ShellMode::TopLevel => self.shell_surface.set_toplevel(),
            ShellMode::Popup => {
                let parent = self
                    .parent
                    .as_ref()
                    .ok_or(DisplayError::InvalidState("popup requires a parent surface"))?;
                let (seat, serial) = self.connection.with_state(|state| {
                    let seat = state.inputs().primary().and_then(|d| d.seat().cloned());
                    (seat, state.serial())
                });

                match seat {
                    Some(seat) => self.shell_surface.set_popup(
                        &seat,
                        serial,
                        parent,
                        x,
                        y,
                        wl_shell_surface::Transient::empty(),
                    ),
                    None => {
                        warn!(
                            "No seat for popup of window {}, mapping it as transient",
                            self.window()
                        );
                        self.shell_surface.set_transient(
                            parent,
                            x,
                            y,
                            wl_shell_surface::Transient::empty(),
                        );
                    }
                }
            }
            ShellMode::Fullscreen => self.shell_surface.set_fullscreen(
                wl_shell_surface::FullscreenMethod::Default,
                0,
                None,
            ),
            ShellMode::Maximized => self.shell_surface.set_maximized(None),
        }
        Ok(())
    }
}

impl Dispatch<WlShellSurface, Arc<SurfaceData>> for WaylandState {
    fn event(
        state: &mut Self,
        shell_surface: &WlShellSurface,
        event: wl_shell_surface::Event,
        data: &Arc<SurfaceData>,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_shell_surface::Event::Ping { serial } => {
                shell_surface.pong(serial);
            }
            wl_shell_surface::Event::Configure { width, height, .. } => {
                debug!(
                    "Shell surface {} (window {}) configure {}x{}",
                    shell_surface.id(),
                    data.window(),
                    width,
                    height
                );
            }
            wl_shell_surface::Event::PopupDone => {
                let window = data.window();
                debug!("Popup of window {} dismissed", window);
                if !window.is_null() {
                    state.inputs.release_grab_for(window);
                }
            }
            _ => {}
        }
    }
}
