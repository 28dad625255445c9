//! Strobe chain effect - lights strobe one by one in order

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::error::EffectError;
use crate::light::{EffectId, Light};
use crate::visualizer::effect::{release_all, GateAction, ThresholdGate};
use crate::visualizer::light_update::LightUpdate;

pub struct StrobeChainEffect {
    gate: ThresholdGate,
    rng: SmallRng,

    lights_in_order: Vec<Arc<Light>>,
    current_index: usize,
}

impl StrobeChainEffect {
    pub fn new(brightness_threshold: f64, activation_probability: f64) -> Self {
        Self {
            gate: ThresholdGate::with_deactivation_offset(
                "StrobeChainEffect",
                brightness_threshold,
                activation_probability,
                -0.1,
            ),
            rng: SmallRng::from_entropy(),
            lights_in_order: Vec::new(),
            current_index: 0,
        }
    }

    pub fn beat_received(&mut self, id: EffectId, update: &LightUpdate) -> Result<(), EffectError> {
        match self.gate.on_beat(update, &mut self.rng) {
            GateAction::Activate => {
                self.lights_in_order.clear();
                self.current_index = 0;
                self.execute(id, update);
            }
            GateAction::Run => self.execute(id, update),
            GateAction::Deactivate => {
                self.lights_in_order.clear();
                release_all(id, update);
            }
            GateAction::Skip => {}
        }
        Ok(())
    }

    pub fn no_beat_received(
        &mut self,
        id: EffectId,
        update: &LightUpdate,
    ) -> Result<(), EffectError> {
        if self.gate.on_no_beat(update.now()) {
            self.lights_in_order.clear();
            release_all(id, update);
        }
        Ok(())
    }

    fn execute(&mut self, id: EffectId, update: &LightUpdate) {
        if self.lights_in_order.is_empty() {
            for light in update.lights() {
                if light.claim_strobe(id) {
                    light.strobe_set_on(false);
                    self.lights_in_order.push(Arc::clone(light));
                }
            }
            return;
        }

        for _ in 0..update.main_lights().len() {
            self.lights_in_order[self.current_index].do_strobe(id, update.time_since_last_beat());
            self.current_index = (self.current_index + 1) % self.lights_in_order.len();
        }
    }
}
