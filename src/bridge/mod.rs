//! Bridge abstraction
//!
//! The engine talks to light hardware exclusively through the
//! [`BridgeClient`] trait, sending fully-resolved [`LightState`] snapshots.
//! Everything above this seam is device-agnostic; the simulator binary and
//! the test suite plug in mock clients.

mod queue;

pub use queue::UpdateQueue;

use std::fmt;

use futures::future::BoxFuture;

use crate::color::Color;
use crate::error::BridgeError;

/// Identifier of one physical light on the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LightId(String);

impl LightId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Alert (breathe) mode of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertMode {
    #[default]
    None,
    /// One breathe cycle.
    Select,
    /// Breathe cycles for 15 seconds or until cleared.
    LSelect,
}

/// One state write destined for a single light. Fields left `None` are not
/// part of the write and keep their current value on the device.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LightState {
    pub on: Option<bool>,
    pub brightness: Option<u8>,
    pub color: Option<Color>,
    pub alert: Option<AlertMode>,
    /// Transition time in 100 ms units.
    pub transition_time: Option<u16>,
}

impl LightState {
    /// True if the write carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self.on.is_none()
            && self.brightness.is_none()
            && self.color.is_none()
            && self.alert.is_none()
    }
}

/// Client-side view of the light bridge. Implementations must be cheap to
/// query for connectivity; `write_state` performs the actual device I/O.
pub trait BridgeClient: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Write one state snapshot to one light.
    fn write_state(
        &self,
        light: &LightId,
        state: &LightState,
    ) -> BoxFuture<'static, Result<(), BridgeError>>;
}
