//! Attribute controllers with effect reservations
//!
//! Each light owns one controller per attribute family (color, brightness,
//! strobe). Effects reserve a controller by their pipeline id; while a
//! reservation is held, mutations from other effects are ignored. Claiming
//! a controller you already hold is a no-op that reports success.

use crate::color::Color;
use crate::light::state_builder::StateBuilder;
use crate::orchestrator::TaskHandle;

/// Identifier of an effect within the pipeline (its position).
pub type EffectId = usize;

/// Reservation slot shared by all controller kinds.
#[derive(Debug, Default)]
pub struct Reservation {
    controlling: Option<EffectId>,
}

impl Reservation {
    /// True if `effect` may mutate the guarded values.
    pub fn can_control(&self, effect: EffectId) -> bool {
        self.controlling.is_none() || self.controlling == Some(effect)
    }

    /// Reserve for `effect`. First claim wins; re-claiming is idempotent.
    pub fn claim(&mut self, effect: EffectId) -> bool {
        if self.controlling == Some(effect) {
            return true;
        }
        if self.controlling.is_none() {
            self.controlling = Some(effect);
            return true;
        }
        false
    }

    /// Release the reservation if `effect` holds it.
    pub fn release(&mut self, effect: EffectId) -> bool {
        if self.controlling == Some(effect) {
            self.controlling = None;
            return true;
        }
        false
    }
}

/// Controls a light's beat color and fade color.
#[derive(Debug, Default)]
pub struct ColorController {
    pub reservation: Reservation,

    color: Option<Color>,
    fade_color: Option<Color>,

    last_set: Option<Color>,
    color_updated: bool,
    fade_color_updated: bool,
}

impl ColorController {
    pub fn set_color(&mut self, effect: EffectId, color: Color) {
        if self.reservation.can_control(effect) {
            self.color_updated = true;
            self.color = Some(color);
        }
    }

    pub fn set_fade_color(&mut self, effect: EffectId, fade_color: Color) {
        if self.reservation.can_control(effect) {
            self.fade_color_updated = self.fade_color != Some(fade_color);
            self.fade_color = Some(fade_color);
        }
    }

    /// Drop this tick's pending color changes without flushing them.
    pub fn undo_color_change(&mut self, effect: EffectId) {
        if self.reservation.can_control(effect) {
            self.color_updated = false;
            self.fade_color_updated = false;
        }
    }

    pub fn apply_updates(&mut self, builder: &mut StateBuilder) {
        if self.color_updated {
            self.update_color(self.color, builder);
            self.color_updated = false;
        }
    }

    pub fn apply_fade_updates(&mut self, builder: &mut StateBuilder) {
        self.update_color(self.fade_color, builder);
        self.fade_color_updated = false;
    }

    pub fn last_set(&self) -> Option<Color> {
        self.last_set
    }

    fn update_color(&mut self, color: Option<Color>, builder: &mut StateBuilder) {
        if let Some(color) = color {
            if self.last_set != Some(color) {
                builder.set_color(color);
                self.last_set = Some(color);
            }
        }
    }
}

/// Controls a light's beat brightness and fade brightness. Brightness is
/// never reserved; every effect may write it.
#[derive(Debug)]
pub struct BrightnessController {
    brightness: u8,
    fade_brightness: u8,

    /// `None` only after a forced refresh; a fresh light counts as 0 so the
    /// first fade pass does not emit a zero write.
    last_set: Option<u8>,
    increased: bool,
    do_alert: bool,
}

impl Default for BrightnessController {
    fn default() -> Self {
        Self {
            brightness: 0,
            fade_brightness: 0,
            last_set: Some(0),
            increased: false,
            do_alert: false,
        }
    }
}

impl BrightnessController {
    /// Set this light's beat and fade brightness for the coming flush.
    pub fn set_brightness(&mut self, brightness: u8, fade_brightness: u8) {
        self.increased = brightness > self.brightness;
        self.brightness = brightness;
        self.fade_brightness = fade_brightness;
    }

    /// Queue a breathe alert for the next flush.
    pub fn set_alert_mode(&mut self) {
        self.increased = true;
        self.do_alert = true;
    }

    /// Force the next flush to re-send brightness even if unchanged.
    pub fn force_update(&mut self) {
        self.increased = true;
        self.last_set = None;
    }

    pub fn was_increased(&self) -> bool {
        self.increased
    }

    pub fn last_set(&self) -> Option<u8> {
        self.last_set
    }

    pub fn apply_updates(&mut self, builder: &mut StateBuilder) {
        self.update_brightness(self.brightness, builder);
        if self.do_alert {
            builder.set_alert();
            self.do_alert = false;
        }
        self.increased = false;
    }

    pub fn apply_fade_updates(&mut self, builder: &mut StateBuilder) {
        self.update_brightness(self.fade_brightness, builder);
    }

    fn update_brightness(&mut self, new_brightness: u8, builder: &mut StateBuilder) {
        if self.last_set != Some(new_brightness) {
            builder.set_brightness(new_brightness);
            self.last_set = Some(new_brightness);
        }
    }
}

/// Strobe scheduling state. The flip/restore choreography itself lives in
/// the light's flush path, which owns the on/off flag the strobe toggles.
#[derive(Debug, Default)]
pub struct StrobeController {
    pub reservation: Reservation,

    pending_on: Option<bool>,
    pending_delay_ms: Option<u64>,
    active: Option<TaskHandle>,
}

impl StrobeController {
    /// Mark this light to be strobed. `time_since_last_beat_ms` sets the
    /// strobe duration: halved until at most 500 ms, floored at 250 ms.
    pub fn request_strobe(&mut self, effect: EffectId, time_since_last_beat_ms: u64) -> bool {
        if !self.reservation.can_control(effect) {
            return false;
        }

        let mut delay = time_since_last_beat_ms;
        while delay > 500 {
            delay /= 2;
        }
        self.pending_delay_ms = Some(delay.max(250));
        true
    }

    /// Request an on/off change on the next flush. Two opposing requests
    /// within one tick cancel each other out.
    pub fn request_on(&mut self, on: bool) {
        match self.pending_on {
            Some(pending) if pending != on => self.pending_on = None,
            _ => self.pending_on = Some(on),
        }
    }

    pub fn take_pending_on(&mut self) -> Option<bool> {
        self.pending_on.take()
    }

    pub fn take_pending_delay(&mut self) -> Option<u64> {
        self.pending_delay_ms.take()
    }

    pub fn set_active(&mut self, handle: TaskHandle) {
        self.active = Some(handle);
    }

    pub fn is_strobing(&self) -> bool {
        self.active
            .as_ref()
            .map_or(false, |handle| !handle.has_run() && !handle.is_cancelled())
    }

    /// Cancel a running strobe. Returns true if the restore callback had not
    /// yet run, meaning the light is still in its flipped state.
    pub fn cancel_strobe(&mut self) -> bool {
        if let Some(handle) = self.active.take() {
            if !handle.has_run() && !handle.is_cancelled() {
                handle.cancel();
                return !handle.has_run();
            }
        }
        false
    }
}
