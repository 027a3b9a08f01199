//! Registration handshake and bound globals
//!
//! The server advertises every global once through `wl_registry.global`
//! during the first round-trip after the registry is created. Each
//! advertisement is classified by interface name and either bound (if the
//! current [`RegistrationMode`] wants it), turned into an
//! [`Output`](crate::output::Output) / [`InputDevice`](crate::input::InputDevice),
//! or ignored.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_client::protocol::wl_output::WlOutput;
use wayland_client::protocol::wl_registry::{self, WlRegistry};
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::protocol::wl_shell::WlShell;
use wayland_client::protocol::wl_shm::{self, WlShm};
use wayland_client::{delegate_noop, Connection, Dispatch, QueueHandle, WEnum};

use super::WaylandState;
use crate::input::InputDevice;
use crate::output::Output;

const COMPOSITOR_VERSION: u32 = 4;
const SHELL_VERSION: u32 = 1;
const SHM_VERSION: u32 = 1;
const OUTPUT_VERSION: u32 = 3;
const SEAT_VERSION: u32 = 5;

/// Which advertised globals the handshake binds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationMode {
    /// Bind compositor, shell, shm, outputs and seats
    #[default]
    #[serde(rename = "as-needed")]
    RegisterAsNeeded,
    /// Bind outputs only; used for screen probing without a window stack
    #[serde(rename = "output-only")]
    RegisterOutputOnly,
}

impl RegistrationMode {
    pub fn accepts(self, kind: GlobalKind) -> bool {
        match self {
            RegistrationMode::RegisterAsNeeded => true,
            RegistrationMode::RegisterOutputOnly => kind == GlobalKind::Output,
        }
    }
}

/// Interfaces the display layer knows how to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalKind {
    Compositor,
    Shell,
    Shm,
    Output,
    Seat,
}

impl GlobalKind {
    pub fn from_interface(interface: &str) -> Option<Self> {
        match interface {
            "wl_compositor" => Some(GlobalKind::Compositor),
            "wl_shell" => Some(GlobalKind::Shell),
            "wl_shm" => Some(GlobalKind::Shm),
            "wl_output" => Some(GlobalKind::Output),
            "wl_seat" => Some(GlobalKind::Seat),
            _ => None,
        }
    }

    pub fn interface(self) -> &'static str {
        match self {
            GlobalKind::Compositor => "wl_compositor",
            GlobalKind::Shell => "wl_shell",
            GlobalKind::Shm => "wl_shm",
            GlobalKind::Output => "wl_output",
            GlobalKind::Seat => "wl_seat",
        }
    }

    /// Singletons may only be bound once per connection
    pub fn is_singleton(self) -> bool {
        matches!(
            self,
            GlobalKind::Compositor | GlobalKind::Shell | GlobalKind::Shm
        )
    }
}

/// One advertisement seen on the registry, bound or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalInfo {
    pub name: u32,
    pub interface: String,
    pub version: u32,
    pub bound: bool,
}

/// Bound singleton globals plus a log of everything the server advertised
#[derive(Debug, Default)]
pub struct GlobalRegistry {
    mode: RegistrationMode,
    registry: Option<WlRegistry>,
    compositor: Option<WlCompositor>,
    shell: Option<WlShell>,
    shm: Option<WlShm>,
    shm_formats: Vec<wl_shm::Format>,
    advertised: Vec<GlobalInfo>,
    conflict: Option<&'static str>,
}

impl GlobalRegistry {
    pub fn mode(&self) -> RegistrationMode {
        self.mode
    }

    pub fn compositor(&self) -> Option<&WlCompositor> {
        self.compositor.as_ref()
    }

    pub fn shell(&self) -> Option<&WlShell> {
        self.shell.as_ref()
    }

    pub fn shm(&self) -> Option<&WlShm> {
        self.shm.as_ref()
    }

    /// Pixel formats the server announced on `wl_shm`
    pub fn shm_formats(&self) -> &[wl_shm::Format] {
        &self.shm_formats
    }

    pub fn globals(&self) -> &[GlobalInfo] {
        &self.advertised
    }

    pub fn is_registered(&self) -> bool {
        self.registry.is_some()
    }

    pub fn is_bound(&self, kind: GlobalKind) -> bool {
        match kind {
            GlobalKind::Compositor => self.compositor.is_some(),
            GlobalKind::Shell => self.shell.is_some(),
            GlobalKind::Shm => self.shm.is_some(),
            GlobalKind::Output | GlobalKind::Seat => self
                .advertised
                .iter()
                .any(|g| g.bound && g.interface == kind.interface()),
        }
    }

    pub(crate) fn begin(&mut self, registry: WlRegistry, mode: RegistrationMode) {
        self.mode = mode;
        self.registry = Some(registry);
    }

    pub(crate) fn take_conflict(&mut self) -> Option<&'static str> {
        self.conflict.take()
    }

    /// Drop the singleton bindings, then the registry itself.
    ///
    /// None of the singletons bound here have a destructor request at the
    /// versions we bind, so dropping the proxy is all that is left to do.
    pub(crate) fn release(&mut self) {
        self.shm_formats.clear();
        self.shm = None;
        self.shell = None;
        self.compositor = None;
        self.registry = None;
        self.advertised.clear();
        self.conflict = None;
    }

    /// Forget the advertisement `name`, dropping its binding if it was one
    /// of the singletons.
    pub(crate) fn withdraw(&mut self, name: u32) {
        let Some(index) = self.advertised.iter().position(|g| g.name == name) else {
            return;
        };
        let info = self.advertised.remove(index);
        if !info.bound {
            return;
        }

        match GlobalKind::from_interface(&info.interface) {
            Some(GlobalKind::Compositor) => self.compositor = None,
            Some(GlobalKind::Shell) => self.shell = None,
            Some(GlobalKind::Shm) => {
                self.shm = None;
                self.shm_formats.clear();
            }
            _ => return,
        }
        warn!("{} withdrawn by the compositor", info.interface);
    }

    /// Returns false if `kind` is a singleton that already has a binding
    fn reserve(&mut self, kind: GlobalKind) -> bool {
        if kind.is_singleton() && self.is_bound(kind) {
            warn!("{} advertised more than once", kind.interface());
            self.conflict.get_or_insert(kind.interface());
            return false;
        }
        true
    }
}

impl Dispatch<WlRegistry, ()> for WaylandState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                let mut info = GlobalInfo {
                    name,
                    interface,
                    version,
                    bound: false,
                };

                let Some(kind) = GlobalKind::from_interface(&info.interface) else {
                    trace!("Ignoring global {} ({})", info.interface, name);
                    state.registry.advertised.push(info);
                    return;
                };

                if !state.registry.mode.accepts(kind) || !state.registry.reserve(kind) {
                    trace!("Not binding {} ({})", info.interface, name);
                    state.registry.advertised.push(info);
                    return;
                }

                match kind {
                    GlobalKind::Compositor => {
                        let proxy = registry.bind::<WlCompositor, _, _>(
                            name,
                            version.min(COMPOSITOR_VERSION),
                            qh,
                            (),
                        );
                        state.registry.compositor = Some(proxy);
                    }
                    GlobalKind::Shell => {
                        let proxy =
                            registry.bind::<WlShell, _, _>(name, SHELL_VERSION, qh, ());
                        state.registry.shell = Some(proxy);
                    }
                    GlobalKind::Shm => {
                        let proxy = registry.bind::<WlShm, _, _>(name, SHM_VERSION, qh, ());
                        state.registry.shm = Some(proxy);
                    }
                    GlobalKind::Output => {
                        let proxy = registry.bind::<WlOutput, _, _>(
                            name,
                            version.min(OUTPUT_VERSION),
                            qh,
                            name,
                        );
                        state.outputs.insert(Output::new(name, Some(proxy)));
                    }
                    GlobalKind::Seat => {
                        let proxy = registry.bind::<WlSeat, _, _>(
                            name,
                            version.min(SEAT_VERSION),
                            qh,
                            name,
                        );
                        state.inputs.insert(InputDevice::new(name, Some(proxy)));
                    }
                }

                debug!("Bound {} v{} ({})", info.interface, version, name);
                info.bound = true;
                state.registry.advertised.push(info);
            }
            wl_registry::Event::GlobalRemove { name } => {
                debug!("Global {} withdrawn", name);
                state.outputs.remove(name);
                state.inputs.remove(name);
                state.registry.withdraw(name);
            }
            _ => {}
        }
    }
}

impl Dispatch<WlShm, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _shm: &WlShm,
        event: wl_shm::Event,
        _: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format {
            format: WEnum::Value(format),
        } = event
        {
            trace!("wl_shm format {:?}", format);
            state.registry.shm_formats.push(format);
        }
    }
}

delegate_noop!(WaylandState: WlCompositor);
delegate_noop!(WaylandState: WlShell);
