//! Handle → window map owned by the display

use std::collections::HashMap;

use log::debug;

use super::{WaylandWindow, WidgetHandle};
use crate::error::{DisplayError, Result};

#[derive(Debug, Default)]
pub struct WindowRegistry {
    windows: HashMap<WidgetHandle, WaylandWindow>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a window under its own handle. A live handle is never replaced.
    pub fn insert(&mut self, window: WaylandWindow) -> Result<&mut WaylandWindow> {
        let handle = window.handle();
        match self.windows.entry(handle) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(DisplayError::DuplicateHandle(handle))
            }
            std::collections::hash_map::Entry::Vacant(slot) => Ok(slot.insert(window)),
        }
    }

    /// Remove and destroy a window. Absent handles are ignored.
    pub fn remove(&mut self, handle: WidgetHandle) -> bool {
        match self.windows.remove(&handle) {
            Some(window) => {
                drop(window);
                debug!("Window {} destroyed", handle);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, handle: WidgetHandle) -> Option<&WaylandWindow> {
        self.windows.get(&handle)
    }

    pub fn get_mut(&mut self, handle: WidgetHandle) -> Option<&mut WaylandWindow> {
        self.windows.get_mut(&handle)
    }

    pub fn contains(&self, handle: WidgetHandle) -> bool {
        self.windows.contains_key(&handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = WidgetHandle> + '_ {
        self.windows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Destroy every window
    pub fn clear(&mut self) {
        if !self.windows.is_empty() {
            debug!("Destroying {} windows", self.windows.len());
        }
        self.windows.clear();
    }
}
