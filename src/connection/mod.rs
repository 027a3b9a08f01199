//! Connection to the compositor
//!
//! [`ConnectionHandle`] owns the `wayland_client::Connection`, its single
//! event queue and the dispatch state every protocol callback writes into.
//! Handles are cheap clones of one shared inner value: the caller's thread
//! and the poll thread each hold one.
//!
//! Dispatch state sits behind a mutex. Callbacks run with the mutex held, so
//! they are limited to updating [`WaylandState`] and raising observer
//! notifications; they never reach window objects.

pub mod registry;

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace};
use parking_lot::{Condvar, Mutex};
use wayland_client::backend::WaylandError;
use wayland_client::protocol::wl_callback::{self, WlCallback};
use wayland_client::{ConnectError, Connection, Dispatch, EventQueue, QueueHandle};

use crate::error::{DisplayError, Result};
use crate::input::InputSet;
use crate::output::OutputSet;
use crate::platform::OutputChangeObserver;

pub use registry::{GlobalInfo, GlobalKind, GlobalRegistry, RegistrationMode};

/// Where to find the compositor
#[derive(Debug)]
pub enum DisplayTarget {
    /// `WAYLAND_DISPLAY` / `WAYLAND_SOCKET` from the environment
    Default,
    /// Socket name relative to `XDG_RUNTIME_DIR`, or an absolute path
    Named(String),
    /// An already connected socket
    Socket(UnixStream),
}

impl DisplayTarget {
    /// `None` means "use the environment"
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some(name) if !name.is_empty() => DisplayTarget::Named(name.to_string()),
            _ => DisplayTarget::Default,
        }
    }
}

/// Everything protocol callbacks are allowed to touch
#[derive(Debug)]
pub struct WaylandState {
    pub(crate) registry: GlobalRegistry,
    pub(crate) outputs: OutputSet,
    pub(crate) inputs: InputSet,
    pub(crate) serial: u32,
}

impl WaylandState {
    fn new(observer: Option<Arc<dyn OutputChangeObserver>>) -> Self {
        Self {
            registry: GlobalRegistry::default(),
            outputs: OutputSet::new(observer),
            inputs: InputSet::default(),
            serial: 0,
        }
    }

    pub fn registry(&self) -> &GlobalRegistry {
        &self.registry
    }

    pub fn outputs(&self) -> &OutputSet {
        &self.outputs
    }

    pub fn inputs(&self) -> &InputSet {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut InputSet {
        &mut self.inputs
    }

    /// Serial of the last input event, used for popup grabs
    pub fn serial(&self) -> u32 {
        self.serial
    }
}

struct Dispatcher {
    queue: EventQueue<WaylandState>,
    state: WaylandState,
}

struct Inner {
    conn: Connection,
    qh: QueueHandle<WaylandState>,
    dispatcher: Mutex<Dispatcher>,
    /// Set while the poll thread owns reading from the socket
    polling: AtomicBool,
}

/// Shared handle on the live compositor connection
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

impl ConnectionHandle {
    pub fn connect(
        target: DisplayTarget,
        observer: Option<Arc<dyn OutputChangeObserver>>,
    ) -> Result<Self> {
        let conn = match target {
            DisplayTarget::Default => Connection::connect_to_env()?,
            DisplayTarget::Named(name) => {
                let path = socket_path(&name)?;
                debug!("Connecting to {}", path.display());
                let stream = UnixStream::connect(&path).map_err(|err| {
                    debug!("Cannot reach {}: {}", path.display(), err);
                    ConnectError::NoCompositor
                })?;
                Connection::from_socket(stream)?
            }
            DisplayTarget::Socket(stream) => Connection::from_socket(stream)?,
        };

        let queue = conn.new_event_queue();
        let qh = queue.handle();
        info!("Connected to wayland compositor");

        Ok(Self {
            inner: Arc::new(Inner {
                conn,
                qh,
                dispatcher: Mutex::new(Dispatcher {
                    queue,
                    state: WaylandState::new(observer),
                }),
                polling: AtomicBool::new(false),
            }),
        })
    }

    /// Run the registration handshake.
    ///
    /// Creates the registry and performs one round-trip so every advertised
    /// global has been offered before this returns.
    pub fn register(&self, mode: RegistrationMode) -> Result<()> {
        if self.is_polling() {
            return Err(DisplayError::InvalidState(
                "registration must happen before event polling starts",
            ));
        }

        let mut guard = self.inner.dispatcher.lock();
        let Dispatcher { queue, state } = &mut *guard;
        if state.registry.is_registered() {
            return Err(DisplayError::InvalidState("globals are already registered"));
        }

        let registry = self.inner.conn.display().get_registry(&self.inner.qh, ());
        state.registry.begin(registry, mode);
        queue.roundtrip(state)?;

        if let Some(interface) = state.registry.take_conflict() {
            return Err(DisplayError::RegistrationConflict { interface });
        }

        debug!(
            "Registration complete ({:?}): {} outputs, {} seats",
            mode,
            state.outputs.len(),
            state.inputs.len()
        );
        Ok(())
    }

    /// Push queued requests to the server without blocking
    pub fn flush(&self) -> Result<()> {
        match self.inner.conn.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {
                trace!("Flush would block, leaving requests queued");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Block until the server has processed every request sent so far.
    ///
    /// While the poll thread is running it is the only reader of the socket,
    /// so the caller waits for a `wl_display.sync` callback that the poll
    /// thread dispatches. If polling stops in the meantime the wait falls
    /// back to reading the socket itself.
    pub fn round_trip(&self) -> Result<()> {
        if !self.is_polling() {
            return self.blocking_round_trip();
        }

        let done = Arc::new(SyncDone::default());
        self.inner.conn.display().sync(&self.inner.qh, done.clone());
        self.flush()?;

        if done.wait_while(|| self.is_polling()) {
            Ok(())
        } else {
            self.blocking_round_trip()
        }
    }

    /// Round-trip on the calling thread's own read of the socket
    pub(crate) fn blocking_round_trip(&self) -> Result<()> {
        let mut guard = self.inner.dispatcher.lock();
        let Dispatcher { queue, state } = &mut *guard;
        queue.roundtrip(state)?;
        Ok(())
    }

    /// Read whatever is available on the socket into the queue
    pub fn read_events(&self) -> Result<()> {
        let guard = self.inner.dispatcher.lock();
        let Some(read) = guard.queue.prepare_read() else {
            // Events are already queued, dispatch them first.
            return Ok(());
        };

        match read.read() {
            Ok(count) => {
                trace!("Read {} events", count);
                Ok(())
            }
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Run the callbacks of every queued event
    pub fn dispatch_pending(&self) -> Result<usize> {
        let mut guard = self.inner.dispatcher.lock();
        let Dispatcher { queue, state } = &mut *guard;
        Ok(queue.dispatch_pending(state)?)
    }

    /// Duplicate of the connection fd, for readiness polling
    pub fn poll_fd(&self) -> Result<OwnedFd> {
        Ok(self.inner.conn.backend().poll_fd().try_clone_to_owned()?)
    }

    /// Opaque identity of the connection for the rendering backend.
    ///
    /// This is the `wl_display*` when the system library backs the
    /// connection, otherwise the address of the shared connection state.
    /// The value carries no ownership.
    pub fn native_handle(&self) -> usize {
        #[cfg(feature = "egl")]
        {
            self.inner.conn.backend().display_ptr() as usize
        }
        #[cfg(not(feature = "egl"))]
        {
            Arc::as_ptr(&self.inner) as usize
        }
    }

    pub fn serial(&self) -> u32 {
        self.inner.dispatcher.lock().state.serial
    }

    pub fn set_serial(&self, serial: u32) {
        self.inner.dispatcher.lock().state.serial = serial;
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&WaylandState) -> R) -> R {
        f(&self.inner.dispatcher.lock().state)
    }

    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut WaylandState) -> R) -> R {
        f(&mut self.inner.dispatcher.lock().state)
    }

    pub fn queue_handle(&self) -> &QueueHandle<WaylandState> {
        &self.inner.qh
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.conn
    }

    pub fn is_polling(&self) -> bool {
        self.inner.polling.load(Ordering::Acquire)
    }

    pub(crate) fn set_polling(&self, polling: bool) {
        self.inner.polling.store(polling, Ordering::Release);
    }

    /// Release every binding, seats and outputs first, then the singletons
    /// and the registry.
    pub fn release_globals(&self) {
        self.with_state_mut(|state| {
            state.inputs.release_all();
            state.outputs.release_all();
            state.registry.release();
        });
        if let Err(err) = self.flush() {
            debug!("Flush after releasing globals failed: {}", err);
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("polling", &self.is_polling())
            .finish_non_exhaustive()
    }
}

fn socket_path(name: &str) -> std::result::Result<PathBuf, ConnectError> {
    let path = PathBuf::from(name);
    if path.is_absolute() {
        return Ok(path);
    }
    let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR").ok_or(ConnectError::NoCompositor)?;
    Ok(PathBuf::from(runtime_dir).join(path))
}

/// Completion flag for a `wl_display.sync` issued by [`ConnectionHandle::round_trip`]
#[derive(Default)]
pub(crate) struct SyncDone {
    done: Mutex<bool>,
    cond: Condvar,
}

impl SyncDone {
    const RECHECK: Duration = Duration::from_millis(50);

    fn signal(&self) {
        *self.done.lock() = true;
        self.cond.notify_all();
    }

    /// Wait for the callback. Gives up and returns false once `keep_waiting`
    /// turns false before the callback fired.
    fn wait_while(&self, keep_waiting: impl Fn() -> bool) -> bool {
        let mut done = self.done.lock();
        while !*done {
            if self.cond.wait_for(&mut done, Self::RECHECK).timed_out()
                && !*done
                && !keep_waiting()
            {
                return false;
            }
        }
        true
    }
}

impl Dispatch<WlCallback, Arc<SyncDone>> for WaylandState {
    fn event(
        _state: &mut Self,
        _callback: &WlCallback,
        event: wl_callback::Event,
        done: &Arc<SyncDone>,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            done.signal();
        }
    }
}
