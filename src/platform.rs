//! Interfaces shared with the platform layer
//!
//! The platform layer drives window creation and state changes through
//! [`WindowStateChangeHandler`] (implemented by
//! [`WaylandDisplay`](crate::display::WaylandDisplay)) and learns about
//! output geometry through [`OutputChangeObserver`].

use crate::error::Result;
use crate::window::WidgetHandle;

/// Receives output geometry changes.
///
/// Called synchronously from the event dispatch path, on whichever thread
/// is dispatching (normally the poll thread). Implementations must only
/// record the change; calling back into the display from here deadlocks.
pub trait OutputChangeObserver: Send + Sync {
    fn on_output_size_changed(&self, width: u32, height: u32);
}

/// Window state requested by the platform layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Create,
    Fullscreen,
    Maximized,
    Minimized,
    Restore,
    Active,
    Inactive,
    Show,
    Hide,
    Resize,
    Destroyed,
}

/// Kind of window the platform layer wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetType {
    Window,
    WindowFrameless,
    Popup,
}

/// Entry points used by the platform layer to create windows and change
/// their presentation without depending on the window types themselves.
pub trait WindowStateChangeHandler {
    fn set_widget_state(
        &mut self,
        widget: WidgetHandle,
        state: WidgetState,
        width: u32,
        height: u32,
    ) -> Result<()>;

    fn set_widget_title(&mut self, widget: WidgetHandle, title: &str) -> Result<()>;

    fn set_widget_attributes(
        &mut self,
        widget: WidgetHandle,
        parent: WidgetHandle,
        x: i32,
        y: i32,
        kind: WidgetType,
    ) -> Result<()>;
}
