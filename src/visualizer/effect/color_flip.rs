//! Color flip effect - lights alternate between two colors

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::color::Color;
use crate::error::EffectError;
use crate::light::{EffectId, Light};
use crate::visualizer::effect::{GateAction, ThresholdGate};
use crate::visualizer::light_update::LightUpdate;

pub struct ColorFlipEffect {
    gate: ThresholdGate,
    rng: SmallRng,

    /// Claimed lights with their flip direction: true flips to the first
    /// color of the pair next.
    lights: Vec<(Arc<Light>, bool)>,
    next_colors_in_beats: i32,
    color1: Option<Color>,
    color2: Option<Color>,
}

impl ColorFlipEffect {
    pub fn new(brightness_threshold: f64, activation_probability: f64) -> Self {
        Self {
            gate: ThresholdGate::new(
                "ColorFlipEffect",
                brightness_threshold,
                activation_probability,
            ),
            rng: SmallRng::from_entropy(),
            lights: Vec::new(),
            next_colors_in_beats: 0,
            color1: None,
            color2: None,
        }
    }

    pub fn beat_received(&mut self, id: EffectId, update: &LightUpdate) -> Result<(), EffectError> {
        match self.gate.on_beat(update, &mut self.rng) {
            GateAction::Activate => {
                self.initialize(update);
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

    fn initialize(&mut self, update: &LightUpdate) {
        let color1 = update.color_set().next_color();
        self.color2 = Some(update.color_set().next_color_different_from(Some(&color1)));
        self.color1 = Some(color1);

        self.lights.clear();
        self.next_colors_in_beats = 0;
    }

    fn execute(&mut self, id: EffectId, update: &LightUpdate) {
        if self.lights.is_empty() {
            for light in update.lights() {
                if light.claim_color(id) {
                    light.undo_color_change(id);
                    self.lights.push((Arc::clone(light), self.rng.gen()));
                }
            }
            if self.lights.is_empty() {
                return;
            }
        }

        self.next_colors_in_beats -= 1;
        if self.next_colors_in_beats <= 0 {
            self.next_colors_in_beats = 4 + self.rng.gen_range(0..4);

            self.color1 = self.color2;
            self.color2 = Some(
                update
                    .color_set()
                    .next_color_different_from(self.color1.as_ref()),
            );

            for index in 0..self.lights.len() {
                let direction = self.rng.gen();
                self.flip_light_color(id, index, direction);
            }
        } else {
            for index in 0..self.lights.len() {
                let direction = self.lights[index].1;
                self.flip_light_color(id, index, direction);
            }
        }
    }

    fn flip_light_color(&mut self, id: EffectId, index: usize, use_color1: bool) {
        let fade_color = if use_color1 { self.color2 } else { self.color1 };
        let (light, direction) = &mut self.lights[index];
        if let Some(fade_color) = fade_color {
            light.set_fade_color(id, fade_color);
        }
        light.force_brightness_update();
        *direction = !use_color1;
    }

    fn execution_done(&mut self, id: EffectId) {
        for (light, _) in self.lights.drain(..) {
            if let Some(color1) = self.color1 {
                light.set_fade_color(id, color1);
            }
            light.release_color(id);
        }
    }
}
