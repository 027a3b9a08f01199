//! Output (screen) tracking
//!
//! Outputs are kept in discovery order. The first output discovered becomes
//! primary; size changes of the current mode are forwarded to the registered
//! [`OutputChangeObserver`] straight from the dispatch path.

use std::sync::Arc;

use log::{debug, trace};
use wayland_client::protocol::wl_output::{self, WlOutput};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};

use crate::connection::WaylandState;
use crate::platform::OutputChangeObserver;

/// One output advertised by the compositor
#[derive(Debug)]
pub struct Output {
    global_name: u32,
    proxy: Option<WlOutput>,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    make: String,
    model: String,
    primary: bool,
}

impl Output {
    pub fn new(global_name: u32, proxy: Option<WlOutput>) -> Self {
        Self {
            global_name,
            proxy,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            make: String::new(),
            model: String::new(),
            primary: false,
        }
    }

    /// Registry name the output was advertised under
    pub fn global_name(&self) -> u32 {
        self.global_name
    }

    pub fn proxy(&self) -> Option<&WlOutput> {
        self.proxy.as_ref()
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn info(&self) -> OutputInfo {
        OutputInfo {
            global_name: self.global_name,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            make: self.make.clone(),
            model: self.model.clone(),
            primary: self.primary,
        }
    }

    fn release(&mut self) {
        if let Some(proxy) = self.proxy.take() {
            if proxy.version() >= 3 {
                proxy.release();
            }
        }
    }
}

/// Owned snapshot of an [`Output`], safe to hand out of the dispatch lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub global_name: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub make: String,
    pub model: String,
    pub primary: bool,
}

/// Registered outputs in discovery order
#[derive(Default)]
pub struct OutputSet {
    outputs: Vec<Output>,
    observer: Option<Arc<dyn OutputChangeObserver>>,
}

impl OutputSet {
    pub fn new(observer: Option<Arc<dyn OutputChangeObserver>>) -> Self {
        Self {
            outputs: Vec::new(),
            observer,
        }
    }

    /// Append a newly discovered output. The first one becomes primary.
    pub fn insert(&mut self, mut output: Output) {
        output.primary = self.outputs.is_empty();
        debug!(
            "Output {} registered (primary: {})",
            output.global_name, output.primary
        );
        self.outputs.push(output);
    }

    /// Forget an output withdrawn by the compositor. If it was primary, the
    /// next output in discovery order takes over.
    pub fn remove(&mut self, global_name: u32) -> Option<Output> {
        let index = self
            .outputs
            .iter()
            .position(|o| o.global_name == global_name)?;
        let mut removed = self.outputs.remove(index);
        removed.release();

        if removed.primary {
            if let Some(next) = self.outputs.first_mut() {
                next.primary = true;
            }
        }
        debug!("Output {} removed", global_name);
        Some(removed)
    }

    /// Make `global_name` the primary output. Returns false if it is unknown.
    pub fn set_primary(&mut self, global_name: u32) -> bool {
        if !self.outputs.iter().any(|o| o.global_name == global_name) {
            return false;
        }
        for output in &mut self.outputs {
            output.primary = output.global_name == global_name;
        }
        true
    }

    pub fn primary(&self) -> Option<&Output> {
        self.outputs.iter().find(|o| o.primary)
    }

    pub fn get(&self, global_name: u32) -> Option<&Output> {
        self.outputs.iter().find(|o| o.global_name == global_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Output> {
        self.outputs.iter()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn snapshot(&self) -> Vec<OutputInfo> {
        self.outputs.iter().map(Output::info).collect()
    }

    pub(crate) fn update_geometry(&mut self, global_name: u32, x: i32, y: i32, make: String, model: String) {
        if let Some(output) = self.find_mut(global_name) {
            output.x = x;
            output.y = y;
            output.make = make;
            output.model = model;
        }
    }

    /// Apply the current mode of an output. Notifies the observer when the
    /// size actually changed; returns whether it did.
    pub(crate) fn update_mode(&mut self, global_name: u32, width: u32, height: u32) -> bool {
        let Some(output) = self.find_mut(global_name) else {
            return false;
        };
        if output.width == width && output.height == height {
            return false;
        }

        output.width = width;
        output.height = height;
        debug!("Output {} size changed to {}x{}", global_name, width, height);

        if let Some(observer) = &self.observer {
            observer.on_output_size_changed(width, height);
        }
        true
    }

    /// Release every output binding, newest first
    pub(crate) fn release_all(&mut self) {
        while let Some(mut output) = self.outputs.pop() {
            output.release();
        }
    }

    fn find_mut(&mut self, global_name: u32) -> Option<&mut Output> {
        self.outputs.iter_mut().find(|o| o.global_name == global_name)
    }
}

impl std::fmt::Debug for OutputSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSet")
            .field("outputs", &self.outputs)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Dispatch<WlOutput, u32> for WaylandState {
    fn event(
        state: &mut Self,
        _output: &WlOutput,
        event: wl_output::Event,
        global_name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_output::Event::Geometry {
                x, y, make, model, ..
            } => {
                state.outputs.update_geometry(*global_name, x, y, make, model);
            }
            wl_output::Event::Mode {
                flags,
                width,
                height,
                ..
            } => {
                let current = matches!(flags, WEnum::Value(f) if f.contains(wl_output::Mode::Current));
                if current {
                    state
                        .outputs
                        .update_mode(*global_name, width.max(0) as u32, height.max(0) as u32);
                }
            }
            wl_output::Event::Done => {
                trace!("Output {} configuration done", global_name);
            }
            _ => {}
        }
    }
}
