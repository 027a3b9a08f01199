//! Shared fixtures for integration tests
//!
//! [`TestCompositor`] is a minimal in-process compositor built on
//! `wayland-server`, running its own `calloop` loop on a background thread.
//! It advertises a configurable set of core globals, records every request
//! the client sends, and can be told to emit events (mode changes, pings,
//! popup dismissal).

#![allow(dead_code)]

use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use calloop::channel;
use calloop::generic::Generic;
use calloop::ping::{make_ping, Ping};
use calloop::{EventLoop, Interest, Mode, PostAction};
use parking_lot::Mutex;
use wayland_server::backend::{ClientData, ClientId, DisconnectReason, GlobalId};
use wayland_server::protocol::{
    wl_compositor, wl_output, wl_pointer, wl_seat, wl_shell, wl_shell_surface, wl_shm,
    wl_surface,
};
use wayland_server::{
    Client, DataInit, Dispatch, Display, DisplayHandle, GlobalDispatch, New, Resource,
};

use ozone_wayland::surface::SurfaceData;
use ozone_wayland::{
    DisplayConfig, DisplayTarget, OutputChangeObserver, RenderBackend, RenderContext,
    WidgetHandle,
};

/// A request the client sent, as seen by the compositor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateSurface,
    DestroySurface,
    GetShellSurface,
    SetToplevel,
    SetPopup { x: i32, y: i32 },
    SetTransient { x: i32, y: i32 },
    SetFullscreen,
    SetMaximized,
    SetTitle(String),
    Pong,
    GetPointer,
}

impl Request {
    /// Requests that change how a shell surface is presented
    pub fn is_mode_change(&self) -> bool {
        matches!(
            self,
            Request::SetToplevel
                | Request::SetPopup { .. }
                | Request::SetTransient { .. }
                | Request::SetFullscreen
                | Request::SetMaximized
        )
    }
}

/// Which globals the compositor advertises
#[derive(Debug, Clone)]
pub struct TestGlobals {
    pub compositors: usize,
    pub shell: bool,
    pub shm: bool,
    pub outputs: Vec<(u32, u32)>,
    pub seats: usize,
}

impl Default for TestGlobals {
    fn default() -> Self {
        Self {
            compositors: 1,
            shell: true,
            shm: true,
            outputs: vec![(1920, 1080)],
            seats: 1,
        }
    }
}

enum Command {
    AddClient(UnixStream, mpsc::Sender<()>),
    ResizeOutputs(u32, u32, mpsc::Sender<()>),
    PingShellSurfaces(mpsc::Sender<()>),
    DismissPopups(mpsc::Sender<()>),
    WithdrawShell(mpsc::Sender<()>),
}

#[derive(Debug, Clone, Copy)]
struct OutputGlobal {
    x: i32,
    width: u32,
    height: u32,
}

struct ServerState {
    log: Arc<Mutex<Vec<Request>>>,
    outputs: Vec<wl_output::WlOutput>,
    shell_surfaces: Vec<wl_shell_surface::WlShellSurface>,
    popups: Vec<wl_shell_surface::WlShellSurface>,
    shell_global: Option<GlobalId>,
    next_serial: u32,
}

impl ServerState {
    fn record(&self, request: Request) {
        self.log.lock().push(request);
    }
}

struct LoopData {
    display: Display<ServerState>,
    state: ServerState,
}

struct TestClient;

impl ClientData for TestClient {
    fn initialized(&self, _client_id: ClientId) {}
    fn disconnected(&self, _client_id: ClientId, _reason: DisconnectReason) {}
}

pub struct TestCompositor {
    commands: channel::Sender<Command>,
    stop: Ping,
    thread: Option<JoinHandle<()>>,
    log: Arc<Mutex<Vec<Request>>>,
}

impl TestCompositor {
    pub fn new() -> Self {
        Self::with_globals(TestGlobals::default())
    }

    pub fn with_globals(globals: TestGlobals) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (commands, channel) = channel::channel();
        let (stop, stop_source) = make_ping().expect("ping source");
        let (ready_tx, ready_rx) = mpsc::channel();

        let server_log = log.clone();
        let thread = thread::Builder::new()
            .name("test-compositor".into())
            .spawn(move || {
                let mut event_loop: EventLoop<'static, LoopData> =
                    EventLoop::try_new().expect("server event loop");
                let handle = event_loop.handle();

                let mut display = Display::<ServerState>::new().expect("server display");
                let dh = display.handle();
                let shell_global = create_globals(&dh, &globals);

                let fd = display
                    .backend()
                    .poll_fd()
                    .try_clone_to_owned()
                    .expect("server poll fd");
                handle
                    .insert_source(
                        Generic::new(fd, Interest::READ, Mode::Level),
                        |_, _, data: &mut LoopData| {
                            data.display.dispatch_clients(&mut data.state)?;
                            data.display.flush_clients()?;
                            Ok(PostAction::Continue)
                        },
                    )
                    .expect("display source");

                let signal = event_loop.get_signal();
                handle
                    .insert_source(stop_source, move |_, _, _| signal.stop())
                    .expect("stop source");
                handle
                    .insert_source(channel, handle_command)
                    .expect("command source");

                let mut data = LoopData {
                    display,
                    state: ServerState {
                        log: server_log,
                        outputs: Vec::new(),
                        shell_surfaces: Vec::new(),
                        popups: Vec::new(),
                        shell_global,
                        next_serial: 1,
                    },
                };
                let _ = ready_tx.send(());
                event_loop
                    .run(None, &mut data, |_| {})
                    .expect("server loop");
            })
            .expect("spawn test compositor");

        ready_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("test compositor did not start");

        Self {
            commands,
            stop,
            thread: Some(thread),
            log,
        }
    }

    /// A fresh client socket connected to this compositor
    pub fn connect(&self) -> UnixStream {
        let (client, server) = UnixStream::pair().expect("socket pair");
        self.call(|done| Command::AddClient(server, done));
        client
    }

    pub fn target(&self) -> DisplayTarget {
        DisplayTarget::Socket(self.connect())
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Request) -> bool) -> usize {
        self.log.lock().iter().filter(|r| predicate(r)).count()
    }

    pub fn clear_requests(&self) {
        self.log.lock().clear();
    }

    /// Announce a new current mode on every bound output
    pub fn resize_outputs(&self, width: u32, height: u32) {
        self.call(|done| Command::ResizeOutputs(width, height, done));
    }

    pub fn ping_shell_surfaces(&self) {
        self.call(Command::PingShellSurfaces);
    }

    pub fn dismiss_popups(&self) {
        self.call(Command::DismissPopups);
    }

    /// Remove the `wl_shell` global, announcing `global_remove` to clients
    pub fn withdraw_shell(&self) {
        self.call(Command::WithdrawShell);
    }

    fn call(&self, command: impl FnOnce(mpsc::Sender<()>) -> Command) {
        let (done, wait) = mpsc::channel();
        self.commands
            .send(command(done))
            .expect("test compositor gone");
        wait.recv_timeout(Duration::from_secs(5))
            .expect("test compositor did not answer");
    }
}

impl Drop for TestCompositor {
    fn drop(&mut self) {
        self.stop.ping();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Returns the id of the `wl_shell` global, if one was created
fn create_globals(dh: &DisplayHandle, globals: &TestGlobals) -> Option<GlobalId> {
    for _ in 0..globals.compositors {
        dh.create_global::<ServerState, wl_compositor::WlCompositor, ()>(4, ());
    }
    let shell = globals
        .shell
        .then(|| dh.create_global::<ServerState, wl_shell::WlShell, ()>(1, ()));
    if globals.shm {
        dh.create_global::<ServerState, wl_shm::WlShm, ()>(1, ());
    }
    let mut x = 0;
    for &(width, height) in &globals.outputs {
        dh.create_global::<ServerState, wl_output::WlOutput, OutputGlobal>(
            3,
            OutputGlobal { x, width, height },
        );
        x += width as i32;
    }
    for _ in 0..globals.seats {
        dh.create_global::<ServerState, wl_seat::WlSeat, ()>(5, ());
    }
    shell
}

fn handle_command(event: channel::Event<Command>, _: &mut (), data: &mut LoopData) {
    let channel::Event::Msg(command) = event else {
        return;
    };

    let done = match command {
        Command::AddClient(stream, done) => {
            data.display
                .handle()
                .insert_client(stream, Arc::new(TestClient))
                .expect("insert client");
            done
        }
        Command::ResizeOutputs(width, height, done) => {
            for output in data.state.outputs.iter().filter(|o| o.is_alive()) {
                output.mode(
                    wl_output::Mode::Current | wl_output::Mode::Preferred,
                    width as i32,
                    height as i32,
                    60_000,
                );
                output.done();
            }
            done
        }
        Command::PingShellSurfaces(done) => {
            for surface in data.state.shell_surfaces.iter().filter(|s| s.is_alive()) {
                surface.ping(data.state.next_serial);
                data.state.next_serial += 1;
            }
            done
        }
        Command::DismissPopups(done) => {
            for popup in data.state.popups.drain(..).filter(|p| p.is_alive()) {
                popup.popup_done();
            }
            done
        }
        Command::WithdrawShell(done) => {
            if let Some(id) = data.state.shell_global.take() {
                data.display.handle().remove_global::<ServerState>(id);
            }
            done
        }
    };

    let _ = data.display.flush_clients();
    let _ = done.send(());
}

impl GlobalDispatch<wl_compositor::WlCompositor, ()> for ServerState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_compositor::WlCompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<wl_compositor::WlCompositor, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_compositor::WlCompositor,
        request: wl_compositor::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_compositor::Request::CreateSurface { id } = request {
            data_init.init(id, ());
            state.record(Request::CreateSurface);
        }
    }
}

impl Dispatch<wl_surface::WlSurface, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_surface::WlSurface,
        request: wl_surface::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_surface::Request::Destroy = request {
            state.record(Request::DestroySurface);
        }
    }
}

impl GlobalDispatch<wl_shell::WlShell, ()> for ServerState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_shell::WlShell>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<wl_shell::WlShell, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_shell::WlShell,
        request: wl_shell::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shell::Request::GetShellSurface { id, .. } = request {
            let shell_surface = data_init.init(id, ());
            state.shell_surfaces.push(shell_surface);
            state.record(Request::GetShellSurface);
        }
    }
}

impl Dispatch<wl_shell_surface::WlShellSurface, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &wl_shell_surface::WlShellSurface,
        request: wl_shell_surface::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let recorded = match request {
            wl_shell_surface::Request::Pong { .. } => Request::Pong,
            wl_shell_surface::Request::SetToplevel => Request::SetToplevel,
            wl_shell_surface::Request::SetPopup { x, y, .. } => {
                state.popups.push(resource.clone());
                Request::SetPopup { x, y }
            }
            wl_shell_surface::Request::SetTransient { x, y, .. } => {
                Request::SetTransient { x, y }
            }
            wl_shell_surface::Request::SetFullscreen { .. } => Request::SetFullscreen,
            wl_shell_surface::Request::SetMaximized { .. } => Request::SetMaximized,
            wl_shell_surface::Request::SetTitle { title } => Request::SetTitle(title),
            _ => return,
        };
        state.record(recorded);
    }
}

impl GlobalDispatch<wl_shm::WlShm, ()> for ServerState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_shm::WlShm>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let shm = data_init.init(resource, ());
        shm.format(wl_shm::Format::Argb8888);
        shm.format(wl_shm::Format::Xrgb8888);
    }
}

impl Dispatch<wl_shm::WlShm, ()> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_shm::WlShm,
        _request: wl_shm::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl GlobalDispatch<wl_output::WlOutput, OutputGlobal> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_output::WlOutput>,
        global: &OutputGlobal,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let output = data_init.init(resource, ());
        output.geometry(
            global.x,
            0,
            520,
            290,
            wl_output::Subpixel::Unknown,
            "Ozone".into(),
            "Virtual".into(),
            wl_output::Transform::Normal,
        );
        output.mode(
            wl_output::Mode::Current | wl_output::Mode::Preferred,
            global.width as i32,
            global.height as i32,
            60_000,
        );
        if output.version() >= 2 {
            output.done();
        }
        state.outputs.push(output);
    }
}

impl Dispatch<wl_output::WlOutput, ()> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_output::WlOutput,
        _request: wl_output::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl GlobalDispatch<wl_seat::WlSeat, ()> for ServerState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_seat::WlSeat>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let seat = data_init.init(resource, ());
        seat.capabilities(wl_seat::Capability::Pointer);
        if seat.version() >= 2 {
            seat.name("seat0".into());
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_seat::WlSeat,
        request: wl_seat::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_seat::Request::GetPointer { id } = request {
            data_init.init(id, ());
            state.record(Request::GetPointer);
        }
    }
}

impl Dispatch<wl_pointer::WlPointer, ()> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_pointer::WlPointer,
        _request: wl_pointer::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

/// What the recording renderer saw happen to its contexts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Created { width: u32, height: u32 },
    Resized { width: u32, height: u32 },
    /// `surface_alive` and `window` are sampled as the context is dropped
    Dropped {
        surface_alive: bool,
        window: WidgetHandle,
    },
}

#[derive(Clone, Default)]
pub struct RecordingRenderer {
    events: Arc<Mutex<Vec<RenderEvent>>>,
}

impl RecordingRenderer {
    pub fn events(&self) -> Vec<RenderEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&RenderEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

struct RecordingContext {
    surface: wayland_client::protocol::wl_surface::WlSurface,
    events: Arc<Mutex<Vec<RenderEvent>>>,
}

impl RenderBackend for RecordingRenderer {
    fn create_context(
        &self,
        surface: &wayland_client::protocol::wl_surface::WlSurface,
        width: u32,
        height: u32,
    ) -> ozone_wayland::Result<Box<dyn RenderContext>> {
        self.events
            .lock()
            .push(RenderEvent::Created { width, height });
        Ok(Box::new(RecordingContext {
            surface: surface.clone(),
            events: self.events.clone(),
        }))
    }
}

impl RenderContext for RecordingContext {
    fn resize(&mut self, width: u32, height: u32) {
        self.events
            .lock()
            .push(RenderEvent::Resized { width, height });
    }

    fn native_window(&self) -> usize {
        0x5eed
    }
}

impl Drop for RecordingContext {
    fn drop(&mut self) {
        use wayland_client::Proxy;

        let window = self
            .surface
            .data::<Arc<SurfaceData>>()
            .map(|data| data.window())
            .unwrap_or_default();
        self.events.lock().push(RenderEvent::Dropped {
            surface_alive: self.surface.is_alive(),
            window,
        });
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    sizes: Mutex<Vec<(u32, u32)>>,
}

impl RecordingObserver {
    pub fn sizes(&self) -> Vec<(u32, u32)> {
        self.sizes.lock().clone()
    }
}

impl OutputChangeObserver for RecordingObserver {
    fn on_output_size_changed(&self, width: u32, height: u32) {
        self.sizes.lock().push((width, height));
    }
}

/// Configuration for tests: no automatic poll thread, no look-ahead
pub fn quiet_config() -> DisplayConfig {
    let mut config = DisplayConfig::default();
    config.events.start_processing = false;
    config.events.look_ahead = false;
    config
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
