//! Opaque widget handles

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide source of widget handles. Starts at 1 so that 0 stays the null handle.
static NEXT_HANDLE: AtomicU32 = AtomicU32::new(1);

/// Opaque unsigned identifier of a window, independent of object addresses.
///
/// Handles are what the platform layer holds on to; internally they double
/// as the lookup key stored in surface user data, so protocol callbacks never
/// carry a pointer to a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WidgetHandle(u32);

impl WidgetHandle {
    /// The "no widget" sentinel
    pub const NULL: Self = Self(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Allocate a fresh, process-unique handle
    pub fn allocate() -> Self {
        loop {
            let raw = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
            // Skip the sentinel if the counter ever wraps.
            if raw != 0 {
                return Self(raw);
            }
        }
    }
}

impl From<u32> for WidgetHandle {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
