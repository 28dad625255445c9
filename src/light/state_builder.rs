//! StateBuilder - accumulates pending deltas for one flush
//!
//! Effects and controllers write into the builder during a tick; the light
//! converts it into at most one queued [`LightState`] at flush time. A
//! builder with no fields set builds to nothing, so empty ticks cost no
//! bridge traffic.

use crate::bridge::{AlertMode, LightState};
use crate::color::Color;

#[derive(Debug, Clone, Default)]
pub struct StateBuilder {
    transition_time: u16,
    brightness: Option<u8>,
    color: Option<Color>,
    on: Option<bool>,
    alert: bool,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transition_time(transition_time: u16) -> Self {
        Self {
            transition_time,
            ..Self::default()
        }
    }

    pub fn set_on(&mut self, on: bool) {
        self.on = Some(on);
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        self.brightness = Some(brightness);
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = Some(color);
    }

    pub fn set_alert(&mut self) {
        self.alert = true;
    }

    /// Merge another builder's pending fields into this one. Fields the
    /// source never set are left untouched.
    pub fn copy_from(&mut self, other: &StateBuilder) {
        if other.is_default() && other.transition_time == 0 {
            return;
        }

        if other.transition_time > 0 {
            self.transition_time = other.transition_time;
        }
        if let Some(brightness) = other.brightness {
            self.brightness = Some(brightness);
        }
        if let Some(color) = other.color {
            self.color = Some(color);
        }
        if let Some(on) = other.on {
            self.on = Some(on);
        }
        if other.alert {
            self.alert = true;
        }
    }

    /// True if no visible field has been set.
    pub fn is_default(&self) -> bool {
        self.brightness.is_none() && self.color.is_none() && self.on.is_none() && !self.alert
    }

    /// Produce the state write, or `None` when nothing was set.
    pub fn build(&self) -> Option<LightState> {
        if self.is_default() {
            return None;
        }

        Some(LightState {
            on: self.on,
            brightness: self.brightness,
            color: self.color,
            alert: self.alert.then_some(AlertMode::LSelect),
            transition_time: Some(self.transition_time),
        })
    }
}
