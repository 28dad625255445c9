//! Strobe effect - all lights off, one active, the rest strobing
//!
//! Takes strobe control of every light, keeps a single light lit and rotates
//! it every handful of beats, while the main lights strobe on the beat. The
//! random side channel briefly strobes all but one lit light.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::EffectError;
use crate::light::{EffectId, Light};
use crate::visualizer::effect::{release_all, GateAction, ThresholdGate};
use crate::visualizer::light_update::LightUpdate;

pub struct StrobeEffect {
    gate: ThresholdGate,
    random_probability: f64,
    rng: SmallRng,

    active_light: Option<Arc<Light>>,
    next_light_in_beats: i32,
}

impl StrobeEffect {
    pub fn new(
        brightness_threshold: f64,
        activation_probability: f64,
        random_probability: f64,
    ) -> Self {
        Self {
            gate: ThresholdGate::with_deactivation_offset(
                "StrobeEffect",
                brightness_threshold,
                activation_probability,
                -0.2,
            ),
            random_probability,
            rng: SmallRng::from_entropy(),
            active_light: None,
            next_light_in_beats: 0,
        }
    }

    pub fn beat_received(&mut self, id: EffectId, update: &LightUpdate) -> Result<(), EffectError> {
        let was_active = self.gate.is_active();

        match self.gate.on_beat(update, &mut self.rng) {
            GateAction::Activate => {
                self.active_light = None;
                self.next_light_in_beats = 0;
                self.execute(id, update);
            }
            GateAction::Run => self.execute(id, update),
            GateAction::Deactivate => release_all(id, update),
            GateAction::Skip => {}
        }

        if !was_active && self.rng.gen::<f64>() < self.random_probability {
            log::info!("[Effect] StrobeEffect was executed once");
            self.execute_once_randomly(id, update);
        }
        Ok(())
    }

    pub fn no_beat_received(
        &mut self,
        id: EffectId,
        update: &LightUpdate,
    ) -> Result<(), EffectError> {
        if self.gate.on_no_beat(update.now()) {
            release_all(id, update);
        }
        Ok(())
    }

    fn execute(&mut self, id: EffectId, update: &LightUpdate) {
        let controllable: Vec<Arc<Light>> = update
            .lights()
            .iter()
            .filter(|light| light.can_control_strobe(id))
            .cloned()
            .collect();
        if controllable.is_empty() {
            return;
        }

        if self.next_light_in_beats <= 0 {
            match &self.active_light {
                Some(active) => active.strobe_set_on(false),
                None => {
                    // first pass takes control and darkens everything
                    for light in &controllable {
                        light.strobe_set_on(false);
                        light.claim_strobe(id);
                    }
                }
            }

            for light in &controllable {
                let is_active = self
                    .active_light
                    .as_ref()
                    .is_some_and(|active| Arc::ptr_eq(active, light));
                if !is_active {
                    light.strobe_set_on(true);
                    self.active_light = Some(Arc::clone(light));
                    break;
                }
            }

            self.next_light_in_beats = 5 + self.rng.gen_range(0..6);
        } else {
            self.next_light_in_beats -= 1;

            if let Some(active) = &self.active_light {
                active.set_alert_mode();
            }

            for light in update.main_lights() {
                let is_active = self
                    .active_light
                    .as_ref()
                    .is_some_and(|active| Arc::ptr_eq(active, light));
                let is_controllable = controllable
                    .iter()
                    .any(|candidate| Arc::ptr_eq(candidate, light));
                if is_controllable && !is_active && !light.is_strobing() {
                    light.do_strobe(id, update.time_since_last_beat());
                }
            }
        }
    }

    fn execute_once_randomly(&mut self, id: EffectId, update: &LightUpdate) {
        if update.is_brightness_change() || update.brightness_percentage() < 0.5 {
            return;
        }

        // strobe every lit light but the first
        for light in update.lights_turned_on().iter().skip(1) {
            light.do_strobe(id, update.time_since_last_beat());
        }
    }
}
