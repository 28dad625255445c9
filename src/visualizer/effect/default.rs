//! Base effect driving color and brightness for every tick
//!
//! Always first in the pipeline, so every later effect can override what it
//! set. Colors rotate whenever brightness was increased; brightness itself
//! follows the calibrator data on change ticks and on every no-beat tick.

use crate::color::Color;
use crate::error::EffectError;
use crate::light::EffectId;
use crate::visualizer::light_update::LightUpdate;

#[derive(Default)]
pub struct DefaultEffect {
    color: Option<Color>,
    fade_color: Option<Color>,
}

impl DefaultEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat_received(&mut self, id: EffectId, update: &LightUpdate) -> Result<(), EffectError> {
        if self.color.is_none() {
            self.update_color(id, update);
        }

        if update.is_brightness_change() {
            self.update_brightness(id, update);
        }

        if let Some(color) = self.color {
            for light in update.main_lights() {
                light.set_color(id, color);
            }
        }
        Ok(())
    }

    pub fn no_beat_received(
        &mut self,
        id: EffectId,
        update: &LightUpdate,
    ) -> Result<(), EffectError> {
        self.update_brightness(id, update);
        Ok(())
    }

    fn update_color(&mut self, id: EffectId, update: &LightUpdate) {
        let fade_color = update
            .color_set()
            .next_color_different_from(self.fade_color.as_ref());
        let color = update.color_set().next_color_different_from(Some(&fade_color));
        self.fade_color = Some(fade_color);
        self.color = Some(color);

        for light in update.lights() {
            light.set_fade_color(id, fade_color);
        }
    }

    fn update_brightness(&mut self, id: EffectId, update: &LightUpdate) {
        let mut brightness_was_increased = false;
        for light in update.lights() {
            light.set_brightness(update.brightness(), update.brightness_fade());
            brightness_was_increased = light.brightness_was_increased();
        }

        // rising brightness doubles as the trigger for fresh colors
        if brightness_was_increased {
            self.update_color(id, update);
        }
    }
}
