//! Display façade
//!
//! [`WaylandDisplay`] is the one object the platform layer talks to. It owns
//! the connection, the poll thread and every window, and tears them down in
//! that dependency order: poll thread, windows, globals, connection.
//!
//! There is no process-wide instance. Whoever needs a display constructs
//! one and passes it around; tests create as many independent ones as they
//! like.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::DisplayConfig;
use crate::connection::{
    ConnectionHandle, DisplayTarget, GlobalInfo, GlobalKind, RegistrationMode,
};
use crate::error::{DisplayError, Result};
use crate::output::OutputInfo;
use crate::platform::{
    OutputChangeObserver, WidgetState, WidgetType, WindowStateChangeHandler,
};
use crate::poll::EventPollThread;
use crate::render::RenderBackend;
use crate::surface::ShellMode;
use crate::window::{WaylandWindow, WidgetHandle, WindowRegistry};

pub struct WaylandDisplay {
    config: DisplayConfig,
    render_backend: Option<Arc<dyn RenderBackend>>,
    observer: Option<Arc<dyn OutputChangeObserver>>,
    // Field order is teardown order for Drop as well.
    poll_thread: EventPollThread,
    windows: WindowRegistry,
    connection: Option<ConnectionHandle>,
}

impl WaylandDisplay {
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            config,
            render_backend: None,
            observer: None,
            poll_thread: EventPollThread::new(),
            windows: WindowRegistry::new(),
            connection: None,
        }
    }

    /// Backend used to create rendering contexts at realization
    pub fn with_render_backend(mut self, backend: Arc<dyn RenderBackend>) -> Self {
        self.render_backend = Some(backend);
        self
    }

    /// Observer told about output size changes. Takes effect at the next
    /// initialization.
    pub fn with_output_observer(mut self, observer: Arc<dyn OutputChangeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Connect to the configured compositor. Failures are logged and
    /// reported as `false`.
    pub fn initialize_hardware(&mut self) -> bool {
        let target = self.config.display_target();
        let mode = self.config.connection.registration;
        match self.initialize_with(target, mode) {
            Ok(()) => true,
            Err(err) => {
                error!("Failed to initialize wayland display: {}", err);
                false
            }
        }
    }

    pub fn initialize(&mut self, target: DisplayTarget) -> Result<()> {
        self.initialize_with(target, self.config.connection.registration)
    }

    /// Connect, register globals with `mode` and start event processing if
    /// configured.
    pub fn initialize_with(&mut self, target: DisplayTarget, mode: RegistrationMode) -> Result<()> {
        if self.connection.is_some() {
            return Err(DisplayError::InvalidState("display is already initialized"));
        }

        let connection = ConnectionHandle::connect(target, self.observer.clone())?;
        connection.register(mode)?;
        // Outputs announce their geometry in response to the bind.
        connection.round_trip()?;

        let (outputs, seats) =
            connection.with_state(|state| (state.outputs().len(), state.inputs().len()));
        info!(
            "Wayland display ready: {} outputs, {} seats ({:?})",
            outputs, seats, mode
        );

        self.connection = Some(connection);
        if self.config.events.start_processing {
            self.start_processing_events()?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.connection.is_some()
    }

    /// Stop polling, destroy windows, release globals and disconnect.
    /// Repeated calls do nothing.
    pub fn shutdown_hardware(&mut self) {
        self.poll_thread.stop();
        self.windows.clear();

        if let Some(connection) = self.connection.take() {
            connection.release_globals();
            info!("Wayland display shut down");
        }
    }

    /// Start the poll thread, with the look-ahead round-trip if enabled
    pub fn start_processing_events(&mut self) -> Result<()> {
        let connection = self.connection()?.clone();
        let events = &self.config.events;
        self.poll_thread
            .start(&connection, events.look_ahead_delay(), &events.thread_name)
    }

    pub fn stop_processing_events(&mut self) {
        self.poll_thread.stop();
    }

    pub fn is_processing_events(&self) -> bool {
        self.poll_thread.is_running()
    }

    pub fn flush_display(&self) -> Result<()> {
        self.connection()?.flush()
    }

    /// Block until the compositor has handled every request sent so far
    pub fn sync_display(&self) -> Result<()> {
        self.connection()?.round_trip()
    }

    /// Opaque connection identity for the rendering backend, 0 when not
    /// initialized
    pub fn native_display(&self) -> usize {
        self.connection
            .as_ref()
            .map_or(0, ConnectionHandle::native_handle)
    }

    pub fn connection_handle(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    pub fn outputs(&self) -> Vec<OutputInfo> {
        self.connection
            .as_ref()
            .map(|c| c.with_state(|state| state.outputs().snapshot()))
            .unwrap_or_default()
    }

    pub fn primary_output(&self) -> Option<OutputInfo> {
        self.connection
            .as_ref()?
            .with_state(|state| state.outputs().primary().map(|o| o.info()))
    }

    pub fn input_count(&self) -> usize {
        self.connection
            .as_ref()
            .map_or(0, |c| c.with_state(|state| state.inputs().len()))
    }

    /// Window holding the primary seat's grab
    pub fn grab_window(&self) -> Option<WidgetHandle> {
        self.connection
            .as_ref()?
            .with_state(|state| state.inputs().primary()?.grab_window())
    }

    pub fn is_bound(&self, kind: GlobalKind) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.with_state(|state| state.registry().is_bound(kind)))
    }

    /// Every global the compositor advertised
    pub fn globals(&self) -> Vec<GlobalInfo> {
        self.connection
            .as_ref()
            .map(|c| c.with_state(|state| state.registry().globals().to_vec()))
            .unwrap_or_default()
    }

    /// Add a window under `handle`. A handle still in use is rejected.
    pub fn create_accelerated_surface(&mut self, handle: WidgetHandle) -> Result<&mut WaylandWindow> {
        if handle.is_null() {
            return Err(DisplayError::InvalidState("the null handle cannot name a window"));
        }
        let connection = self.connection()?.clone();
        let window = WaylandWindow::new(handle, connection, self.render_backend.clone());
        let window = self.windows.insert(window)?;
        debug!("Window {} created", handle);
        Ok(window)
    }

    /// Destroy the window under `handle`, if any
    pub fn destroy_window(&mut self, handle: WidgetHandle) {
        if !self.windows.remove(handle) {
            debug!("Destroy of unknown window {} ignored", handle);
        }
    }

    /// A fresh process-unique handle
    pub fn get_accelerated_widget(&self) -> WidgetHandle {
        WidgetHandle::allocate()
    }

    pub fn realize_accelerated_widget(&mut self, handle: WidgetHandle) -> Result<WidgetHandle> {
        self.window_mut(handle)?.realize()?;
        Ok(handle)
    }

    pub fn window(&self, handle: WidgetHandle) -> Option<&WaylandWindow> {
        self.windows.get(handle)
    }

    pub fn window_mut(&mut self, handle: WidgetHandle) -> Result<&mut WaylandWindow> {
        self.windows
            .get_mut(handle)
            .ok_or(DisplayError::UnknownHandle(handle))
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    fn connection(&self) -> Result<&ConnectionHandle> {
        self.connection
            .as_ref()
            .ok_or(DisplayError::InvalidState("display is not initialized"))
    }
}

impl WindowStateChangeHandler for WaylandDisplay {
    fn set_widget_state(
        &mut self,
        widget: WidgetHandle,
        state: WidgetState,
        width: u32,
        height: u32,
    ) -> Result<()> {
        debug!("Window {} state {:?} ({}x{})", widget, state, width, height);
        match state {
            WidgetState::Create => {
                self.create_accelerated_surface(widget)?;
            }
            WidgetState::Fullscreen => {
                let window = self.window_mut(widget)?;
                window.set_fullscreen()?;
                window.resize(width, height)?;
            }
            WidgetState::Maximized => {
                self.window_mut(widget)?.maximize()?;
            }
            WidgetState::Minimized => {
                self.window_mut(widget)?.minimize()?;
            }
            WidgetState::Restore => {
                let window = self.window_mut(widget)?;
                window.restore()?;
                window.resize(width, height)?;
            }
            WidgetState::Resize => {
                self.window_mut(widget)?.resize(width, height)?;
            }
            WidgetState::Destroyed => self.destroy_window(widget),
            WidgetState::Active => return Err(DisplayError::Unsupported("activating a window")),
            WidgetState::Inactive => {
                return Err(DisplayError::Unsupported("deactivating a window"))
            }
            WidgetState::Show => return Err(DisplayError::Unsupported("showing a window")),
            WidgetState::Hide => return Err(DisplayError::Unsupported("hiding a window")),
        }
        Ok(())
    }

    fn set_widget_title(&mut self, widget: WidgetHandle, title: &str) -> Result<()> {
        self.window_mut(widget)?.set_title(title)
    }

    fn set_widget_attributes(
        &mut self,
        widget: WidgetHandle,
        parent: WidgetHandle,
        x: i32,
        y: i32,
        kind: WidgetType,
    ) -> Result<()> {
        match kind {
            WidgetType::Window => self.window_mut(widget)?.set_shell_attributes(ShellMode::TopLevel),
            WidgetType::WindowFrameless => Err(DisplayError::Unsupported("frameless windows")),
            WidgetType::Popup => {
                let parent_surface = if parent.is_null() {
                    None
                } else {
                    let parent_window = self
                        .windows
                        .get(parent)
                        .ok_or(DisplayError::UnknownHandle(parent))?;
                    let surface = parent_window.wl_surface().cloned();
                    if surface.is_none() {
                        warn!("Popup parent {} has no shell surface yet", parent);
                    }
                    surface
                };
                self.window_mut(widget)?
                    .set_popup(parent_surface.as_ref(), x, y)
            }
        }
    }
}

impl Drop for WaylandDisplay {
    fn drop(&mut self) {
        self.shutdown_hardware();
    }
}

impl std::fmt::Debug for WaylandDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaylandDisplay")
            .field("initialized", &self.is_initialized())
            .field("poll_thread", &self.poll_thread)
            .field("windows", &self.windows.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_display() {
        let mut display = WaylandDisplay::new(DisplayConfig::default());

        assert!(!display.is_initialized());
        assert_eq!(display.native_display(), 0);
        assert!(display.outputs().is_empty());
        assert_eq!(display.input_count(), 0);
        assert!(matches!(
            display.flush_display(),
            Err(DisplayError::InvalidState(_))
        ));
        assert!(matches!(
            display.create_accelerated_surface(WidgetHandle::allocate()),
            Err(DisplayError::InvalidState(_))
        ));
    }

    #[test]
    fn test_shutdown_without_initialize_is_harmless() {
        let mut display = WaylandDisplay::new(DisplayConfig::default());
        display.stop_processing_events();
        display.shutdown_hardware();
        display.shutdown_hardware();
        assert!(!display.is_processing_events());
    }

    #[test]
    fn test_destroy_unknown_window_is_noop() {
        let mut display = WaylandDisplay::new(DisplayConfig::default());
        display.destroy_window(WidgetHandle::from_raw(77));
        assert_eq!(display.window_count(), 0);
    }

    #[test]
    fn test_realize_unknown_handle_fails() {
        let mut display = WaylandDisplay::new(DisplayConfig::default());
        let handle = display.get_accelerated_widget();
        assert!(matches!(
            display.realize_accelerated_widget(handle),
            Err(DisplayError::UnknownHandle(h)) if h == handle
        ));
    }

    #[test]
    fn test_widget_handles_are_fresh() {
        let display = WaylandDisplay::new(DisplayConfig::default());
        let a = display.get_accelerated_widget();
        let b = display.get_accelerated_widget();
        assert_ne!(a, b);
        assert!(!a.is_null());
    }
}
