//! Input seats
//!
//! Only enough of the seat protocol is handled to route popup grabs: the
//! pointer and keyboard are acquired so that their enter/button/key events
//! can refresh the connection serial and the focused window.

use log::{debug, trace};
use wayland_client::protocol::wl_keyboard::{self, WlKeyboard};
use wayland_client::protocol::wl_pointer::{self, WlPointer};
use wayland_client::protocol::wl_seat::{self, WlSeat};
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};

use crate::connection::WaylandState;
use crate::surface::SurfaceData;
use crate::window::WidgetHandle;

/// Window holding the implicit grab of a seat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grab {
    pub window: WidgetHandle,
    pub button: u32,
}

#[derive(Debug)]
pub struct InputDevice {
    global_name: u32,
    seat: Option<WlSeat>,
    pointer: Option<WlPointer>,
    keyboard: Option<WlKeyboard>,
    name: String,
    grab: Option<Grab>,
    focus: Option<WidgetHandle>,
}

impl InputDevice {
    pub fn new(global_name: u32, seat: Option<WlSeat>) -> Self {
        Self {
            global_name,
            seat,
            pointer: None,
            keyboard: None,
            name: String::new(),
            grab: None,
            focus: None,
        }
    }

    pub fn global_name(&self) -> u32 {
        self.global_name
    }

    pub fn seat(&self) -> Option<&WlSeat> {
        self.seat.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_pointer(&self) -> bool {
        self.pointer.is_some()
    }

    pub fn has_keyboard(&self) -> bool {
        self.keyboard.is_some()
    }

    /// Window currently under the pointer or holding keyboard focus
    pub fn focus(&self) -> Option<WidgetHandle> {
        self.focus
    }

    pub fn set_grab_window(&mut self, window: WidgetHandle, button: u32) {
        debug!("Seat {} grab -> window {}", self.global_name, window);
        self.grab = Some(Grab { window, button });
    }

    pub fn release_grab(&mut self) {
        self.grab = None;
    }

    pub fn grab_window(&self) -> Option<WidgetHandle> {
        self.grab.map(|g| g.window)
    }

    fn release(&mut self) {
        if let Some(pointer) = self.pointer.take() {
            if pointer.version() >= 3 {
                pointer.release();
            }
        }
        if let Some(keyboard) = self.keyboard.take() {
            if keyboard.version() >= 3 {
                keyboard.release();
            }
        }
        if let Some(seat) = self.seat.take() {
            if seat.version() >= 5 {
                seat.release();
            }
        }
    }
}

/// Seats in discovery order; the first is primary
#[derive(Debug, Default)]
pub struct InputSet {
    devices: Vec<InputDevice>,
}

impl InputSet {
    pub fn insert(&mut self, device: InputDevice) {
        debug!(
            "Seat {} registered (primary: {})",
            device.global_name,
            self.devices.is_empty()
        );
        self.devices.push(device);
    }

    pub fn remove(&mut self, global_name: u32) -> Option<InputDevice> {
        let index = self
            .devices
            .iter()
            .position(|d| d.global_name == global_name)?;
        let mut device = self.devices.remove(index);
        device.release();
        Some(device)
    }

    pub fn primary(&self) -> Option<&InputDevice> {
        self.devices.first()
    }

    pub fn primary_mut(&mut self) -> Option<&mut InputDevice> {
        self.devices.first_mut()
    }

    pub fn get(&self, global_name: u32) -> Option<&InputDevice> {
        self.devices.iter().find(|d| d.global_name == global_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputDevice> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Drop every grab held by `window`
    pub fn release_grab_for(&mut self, window: WidgetHandle) {
        for device in &mut self.devices {
            if device.grab_window() == Some(window) {
                device.release_grab();
            }
        }
    }

    pub(crate) fn release_all(&mut self) {
        while let Some(mut device) = self.devices.pop() {
            device.release();
        }
    }

    fn find_mut(&mut self, global_name: u32) -> Option<&mut InputDevice> {
        self.devices
            .iter_mut()
            .find(|d| d.global_name == global_name)
    }
}

fn window_of(surface: &WlSurface) -> Option<WidgetHandle> {
    surface
        .data::<std::sync::Arc<SurfaceData>>()
        .map(|data| data.window())
        .filter(|handle| !handle.is_null())
}

impl Dispatch<WlSeat, u32> for WaylandState {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        global_name: &u32,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let Some(device) = state.inputs.find_mut(*global_name) else {
            return;
        };

        match event {
            wl_seat::Event::Capabilities {
                capabilities: WEnum::Value(caps),
            } => {
                let pointer = caps.contains(wl_seat::Capability::Pointer);
                let keyboard = caps.contains(wl_seat::Capability::Keyboard);

                if pointer && device.pointer.is_none() {
                    device.pointer = Some(seat.get_pointer(qh, *global_name));
                } else if !pointer {
                    if let Some(old) = device.pointer.take() {
                        if old.version() >= 3 {
                            old.release();
                        }
                    }
                }

                if keyboard && device.keyboard.is_none() {
                    device.keyboard = Some(seat.get_keyboard(qh, *global_name));
                } else if !keyboard {
                    if let Some(old) = device.keyboard.take() {
                        if old.version() >= 3 {
                            old.release();
                        }
                    }
                }
                trace!(
                    "Seat {} capabilities: pointer={} keyboard={}",
                    global_name,
                    pointer,
                    keyboard
                );
            }
            wl_seat::Event::Name { name } => device.name = name,
            _ => {}
        }
    }
}

impl Dispatch<WlPointer, u32> for WaylandState {
    fn event(
        state: &mut Self,
        _pointer: &WlPointer,
        event: wl_pointer::Event,
        global_name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let (serial, focus) = match event {
            wl_pointer::Event::Enter {
                serial, surface, ..
            } => (serial, Some(window_of(&surface))),
            wl_pointer::Event::Leave { serial, .. } => (serial, Some(None)),
            wl_pointer::Event::Button { serial, .. } => (serial, None),
            _ => return,
        };

        state.serial = serial;
        if let (Some(focus), Some(device)) = (focus, state.inputs.find_mut(*global_name)) {
            device.focus = focus;
        }
    }
}

impl Dispatch<WlKeyboard, u32> for WaylandState {
    fn event(
        state: &mut Self,
        _keyboard: &WlKeyboard,
        event: wl_keyboard::Event,
        global_name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let (serial, focus) = match event {
            wl_keyboard::Event::Enter {
                serial, surface, ..
            } => (serial, Some(window_of(&surface))),
            wl_keyboard::Event::Leave { serial, .. } => (serial, Some(None)),
            wl_keyboard::Event::Key { serial, .. } => (serial, None),
            _ => return,
        };

        state.serial = serial;
        if let (Some(focus), Some(device)) = (focus, state.inputs.find_mut(*global_name)) {
            device.focus = focus;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seat_is_primary() {
        let mut inputs = InputSet::default();
        assert!(inputs.primary().is_none());

        inputs.insert(InputDevice::new(7, None));
        inputs.insert(InputDevice::new(8, None));
        assert_eq!(inputs.primary().map(InputDevice::global_name), Some(7));
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn test_grab_lifecycle() {
        let window = WidgetHandle::from_raw(3);
        let mut device = InputDevice::new(1, None);
        assert_eq!(device.grab_window(), None);

        device.set_grab_window(window, 0);
        assert_eq!(device.grab_window(), Some(window));

        device.release_grab();
        assert_eq!(device.grab_window(), None);
    }

    #[test]
    fn test_release_grab_for_only_touches_matching_window() {
        let popup = WidgetHandle::from_raw(10);
        let other = WidgetHandle::from_raw(11);

        let mut inputs = InputSet::default();
        inputs.insert(InputDevice::new(1, None));
        inputs.insert(InputDevice::new(2, None));
        inputs.primary_mut().unwrap().set_grab_window(popup, 0);
        inputs.find_mut(2).unwrap().set_grab_window(other, 0);

        inputs.release_grab_for(popup);
        assert_eq!(inputs.get(1).unwrap().grab_window(), None);
        assert_eq!(inputs.get(2).unwrap().grab_window(), Some(other));
    }

    #[test]
    fn test_removing_seat_shifts_primary() {
        let mut inputs = InputSet::default();
        inputs.insert(InputDevice::new(1, None));
        inputs.insert(InputDevice::new(2, None));

        assert!(inputs.remove(1).is_some());
        assert_eq!(inputs.primary().map(InputDevice::global_name), Some(2));
        assert!(inputs.remove(1).is_none());
    }
}
