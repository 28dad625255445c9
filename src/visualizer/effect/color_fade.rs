//! Color fade effect - one shared color fading across all lights

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::color::Color;
use crate::error::EffectError;
use crate::light::EffectId;
use crate::visualizer::effect::{release_all, GateAction, ThresholdGate};
use crate::visualizer::light_update::LightUpdate;

pub struct ColorFadeEffect {
    gate: ThresholdGate,
    rng: SmallRng,

    last_color: Option<Color>,
}

impl ColorFadeEffect {
    pub fn new(brightness_threshold: f64, activation_probability: f64) -> Self {
        Self {
            gate: ThresholdGate::new(
                "ColorFadeEffect",
                brightness_threshold,
                activation_probability,
            ),
            rng: SmallRng::from_entropy(),
            last_color: None,
        }
    }

    pub fn beat_received(&mut self, id: EffectId, update: &LightUpdate) -> Result<(), EffectError> {
        match self.gate.on_beat(update, &mut self.rng) {
            GateAction::Activate => {
                self.last_color = None;
                self.execute(id, update);
            }
            GateAction::Run => self.execute(id, update),
            GateAction::Deactivate => release_all(id, update),
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
            release_all(id, update);
        }
        Ok(())
    }

    fn execute(&mut self, id: EffectId, update: &LightUpdate) {
        let color = update
            .color_set()
            .next_color_different_from(self.last_color.as_ref());
        self.last_color = Some(color);

        for light in update.lights() {
            if light.claim_color(id) {
                // main lights also jump to the color on the beat itself
                if update.is_main_light(light) {
                    light.set_color(id, color);
                }
                light.set_fade_color(id, color);
            }
        }
    }
}
