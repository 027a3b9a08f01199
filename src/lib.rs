//! # ozone-wayland
//!
//! Client side of the Wayland display protocol for a windowing platform
//! layer: connect to a compositor, bind its globals, keep its events flowing
//! on a background thread, and manage windows backed by an accelerated
//! rendering context.
//!
//! ## Architecture
//!
//! - `connection`: the compositor connection, flush / round-trip and the
//!   registration handshake
//! - `poll`: the background thread dispatching events
//! - `output` / `input`: outputs and seats discovered during registration
//! - `surface`: drawing surfaces and their shell roles
//! - `window`: windows, their handles and the handle registry
//! - `render`: the seam to the accelerated rendering backend
//! - `display`: the façade owning all of the above
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ozone_wayland::{DisplayConfig, ShellMode, WaylandDisplay};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut display = WaylandDisplay::new(DisplayConfig::default());
//!     if !display.initialize_hardware() {
//!         anyhow::bail!("no compositor");
//!     }
//!
//!     let handle = display.get_accelerated_widget();
//!     let window = display.create_accelerated_surface(handle)?;
//!     window.set_shell_attributes(ShellMode::TopLevel)?;
//!     window.resize(640, 480)?;
//!     display.realize_accelerated_widget(handle)?;
//!
//!     display.shutdown_hardware();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod display;
pub mod error;
pub mod input;
pub mod output;
pub mod platform;
pub mod poll;
pub mod render;
pub mod surface;
pub mod window;

pub use config::DisplayConfig;
pub use connection::{ConnectionHandle, DisplayTarget, GlobalKind, RegistrationMode};
pub use display::WaylandDisplay;
pub use error::{DisplayError, Result};
pub use output::OutputInfo;
pub use platform::{OutputChangeObserver, WidgetState, WidgetType, WindowStateChangeHandler};
pub use render::{RenderBackend, RenderContext};
pub use surface::{ShellMode, Transition};
pub use window::{Rectangle, WaylandWindow, WidgetHandle};
