//! Background event polling
//!
//! One named thread runs a `calloop` event loop with three sources:
//! readiness of the connection fd (read, dispatch, flush), a ping used to
//! stop the loop, and an optional one-shot look-ahead timer that performs an
//! extra round-trip shortly after start to pick up late output geometry.
//!
//! The thread only touches [`WaylandState`](crate::connection::WaylandState)
//! through dispatch; windows stay with the caller.

use std::os::fd::OwnedFd;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use calloop::generic::Generic;
use calloop::ping::{make_ping, Ping, PingSource};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, Interest, LoopSignal, Mode, PostAction};
use log::{debug, error, info, warn};

use crate::connection::ConnectionHandle;
use crate::error::{DisplayError, Result};

pub const DEFAULT_THREAD_NAME: &str = "wayland-events";

struct Worker {
    ping: Ping,
    thread: JoinHandle<Result<()>>,
    connection: ConnectionHandle,
}

/// At most one poll thread per display
#[derive(Default)]
pub struct EventPollThread {
    worker: Option<Worker>,
}

struct LoopData {
    connection: ConnectionHandle,
    signal: LoopSignal,
    failure: Option<DisplayError>,
}

impl EventPollThread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the poll thread. Does nothing if one is already running; a
    /// thread that exited on its own is reaped and replaced.
    pub fn start(
        &mut self,
        connection: &ConnectionHandle,
        look_ahead: Option<Duration>,
        thread_name: &str,
    ) -> Result<()> {
        if self.is_running() {
            debug!("Poll thread already running");
            return Ok(());
        }
        if let Some(worker) = self.worker.take() {
            warn!("Event poll thread had exited, restarting it");
            Self::join(worker);
        }

        let fd = connection.poll_fd()?;
        let (ping, stop) = make_ping()?;
        let worker_connection = connection.clone();

        // Set before the thread exists so no caller races the socket with it.
        connection.set_polling(true);
        let spawned = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run(worker_connection, fd, stop, look_ahead));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(err) => {
                connection.set_polling(false);
                return Err(err.into());
            }
        };

        info!("Started event poll thread {:?}", thread_name);
        self.worker = Some(Worker {
            ping,
            thread,
            connection: connection.clone(),
        });
        Ok(())
    }

    /// Stop and join the poll thread. Safe to call when it is not running.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.ping.ping();
        Self::join(worker);
    }

    /// False once the thread has exited, whether stopped or failed
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.thread.is_finished())
    }

    fn join(worker: Worker) {
        match worker.thread.join() {
            Ok(Ok(())) => debug!("Event poll thread stopped"),
            Ok(Err(err)) => warn!("Event poll thread exited with error: {}", err),
            Err(_) => error!("Event poll thread panicked"),
        }
        worker.connection.set_polling(false);
    }
}

impl Drop for EventPollThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for EventPollThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPollThread")
            .field("running", &self.is_running())
            .finish()
    }
}

fn run(
    connection: ConnectionHandle,
    fd: OwnedFd,
    stop: PingSource,
    look_ahead: Option<Duration>,
) -> Result<()> {
    let mut event_loop: EventLoop<'static, LoopData> = EventLoop::try_new()?;
    let handle = event_loop.handle();

    handle
        .insert_source(stop, |_, _, data| data.signal.stop())
        .map_err(|e| e.error)?;

    handle
        .insert_source(
            Generic::new(fd, Interest::READ, Mode::Level),
            |_, _, data| match pump(&data.connection) {
                Ok(()) => Ok(PostAction::Continue),
                Err(err) => {
                    error!("Event dispatch failed: {}", err);
                    data.failure = Some(err);
                    data.signal.stop();
                    Ok(PostAction::Remove)
                }
            },
        )
        .map_err(|e| e.error)?;

    if let Some(delay) = look_ahead {
        handle
            .insert_source(Timer::from_duration(delay), |_, _, data| {
                debug!("Look-ahead round-trip");
                if let Err(err) = data.connection.blocking_round_trip() {
                    warn!("Look-ahead round-trip failed: {}", err);
                }
                TimeoutAction::Drop
            })
            .map_err(|e| e.error)?;
    }

    let mut data = LoopData {
        signal: event_loop.get_signal(),
        connection,
        failure: None,
    };

    // Anything queued before the thread started goes out first.
    let result = pump(&data.connection)
        .and_then(|()| Ok(event_loop.run(None, &mut data, |_| {})?));

    // Let waiters in round_trip() fall back to reading the socket themselves.
    data.connection.set_polling(false);
    result?;
    data.failure.map_or(Ok(()), Err)
}

fn pump(connection: &ConnectionHandle) -> Result<()> {
    connection.read_events()?;
    connection.dispatch_pending()?;
    connection.flush()
}
