//! Color chain effect - one color travels through the lights in order

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::color::Color;
use crate::error::EffectError;
use crate::light::{EffectId, Light};
use crate::visualizer::effect::{GateAction, ThresholdGate};
use crate::visualizer::light_update::LightUpdate;

pub struct ColorChainEffect {
    gate: ThresholdGate,
    rng: SmallRng,

    lights_in_order: Vec<Arc<Light>>,
    current_index: Option<usize>,
    current_color: Option<Color>,
    current_fade_color: Option<Color>,
}

impl ColorChainEffect {
    pub fn new(brightness_threshold: f64, activation_probability: f64) -> Self {
        Self {
            gate: ThresholdGate::new(
                "ColorChainEffect",
                brightness_threshold,
                activation_probability,
            ),
            rng: SmallRng::from_entropy(),
            lights_in_order: Vec::new(),
            current_index: None,
            current_color: None,
            current_fade_color: None,
        }
    }

    pub fn beat_received(&mut self, id: EffectId, update: &LightUpdate) -> Result<(), EffectError> {
        match self.gate.on_beat(update, &mut self.rng) {
            GateAction::Activate => {
                self.lights_in_order.clear();
                self.current_index = None;
                self.current_color = None;
                self.execute(id, update);
            }
            GateAction::Run => self.execute(id, update),
            GateAction::Deactivate => self.execution_done(id),
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
            self.execution_done(id);
        }
        Ok(())
    }

    fn execute(&mut self, id: EffectId, update: &LightUpdate) {
        if self.lights_in_order.is_empty() {
            for light in update.lights() {
                if light.claim_color(id) {
                    light.undo_color_change(id);
                    self.lights_in_order.push(Arc::clone(light));
                }
            }
            if self.lights_in_order.is_empty() {
                return;
            }
        }

        for _ in 0..update.main_lights().len() {
            match self.current_index {
                Some(index) if index < self.lights_in_order.len() - 1 => {
                    self.current_index = Some(index + 1);
                }
                _ => {
                    // chain completed a full pass, pick the next color pair
                    self.current_color = match self.current_color {
                        Some(_) => self.current_fade_color,
                        None => Some(update.color_set().next_color()),
                    };
                    self.current_fade_color = Some(
                        update
                            .color_set()
                            .next_color_different_from(self.current_color.as_ref()),
                    );
                    self.current_index = Some(0);
                }
            }

            let index = self.current_index.unwrap_or(0);
            let light = &self.lights_in_order[index];
            if let (Some(color), Some(fade_color)) = (self.current_color, self.current_fade_color) {
                light.set_color(id, color);
                light.set_fade_color(id, fade_color);
            }
            light.force_brightness_update();
        }
    }

    fn execution_done(&mut self, id: EffectId) {
        for light in self.lights_in_order.drain(..) {
            if let Some(fade_color) = self.current_fade_color {
                light.set_fade_color(id, fade_color);
            }
            light.release_color(id);
        }
    }
}
