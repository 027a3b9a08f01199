//! Error types for the display layer
//!
//! Every fallible operation in the crate returns [`DisplayError`]. Transport
//! failures from `wayland-client` and `calloop` convert into it with `?`;
//! the remaining variants describe misuse of the window/registry API.

use thiserror::Error;
use wayland_client::backend::WaylandError;
use wayland_client::{ConnectError, DispatchError};

use crate::window::WidgetHandle;

/// Errors raised by the connection, registry, poll thread and window layers
#[derive(Debug, Error)]
pub enum DisplayError {
    /// The compositor could not be reached
    #[error("failed to connect to the compositor: {0}")]
    Connection(#[from] ConnectError),

    /// The wire transport failed (broken socket, protocol error)
    #[error("wayland transport error: {0}")]
    Backend(#[from] WaylandError),

    /// Reading or dispatching events failed
    #[error("failed to dispatch wayland events: {0}")]
    Dispatch(#[from] DispatchError),

    /// A singleton global was advertised more than once
    #[error("global {interface} was advertised more than once")]
    RegistrationConflict { interface: &'static str },

    /// An operation needs a global the compositor never offered
    #[error("required global {0} is not bound")]
    MissingGlobal(&'static str),

    /// No window is registered under this handle
    #[error("unknown widget handle {0}")]
    UnknownHandle(WidgetHandle),

    /// A window is already registered under this handle
    #[error("widget handle {0} is already in use")]
    DuplicateHandle(WidgetHandle),

    /// The object is not in a state that allows the operation
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The operation has no implementation on this backend
    #[error("{0} is not supported by the wayland backend")]
    Unsupported(&'static str),

    /// The poll thread's event loop failed
    #[error("event loop error: {0}")]
    EventLoop(#[from] calloop::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The accelerated rendering backend refused to create a context
    #[error("render context error: {0}")]
    Render(String),
}

pub type Result<T, E = DisplayError> = std::result::Result<T, E>;
