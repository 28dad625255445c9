//! Color strobe effect - rapid color cycling on one light
//!
//! Claims the color of all lights and drives one main light through a trio
//! of colors with a periodic task whose period follows the beat. The trio
//! rotates every few seconds.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::color::Color;
use crate::error::EffectError;
use crate::light::{EffectId, Light};
use crate::orchestrator::{TaskHandle, TaskOrchestrator};
use crate::util::TimeThreshold;
use crate::visualizer::effect::{GateAction, ThresholdGate};
use crate::visualizer::light_update::LightUpdate;

const COLOR_CHANGE_INTERVAL: Duration = Duration::from_secs(5);
const MAXIMUM_STROBE_DELAY_MS: u64 = 1000;

pub struct ColorStrobeEffect {
    gate: ThresholdGate,
    rng: SmallRng,
    orchestrator: Arc<TaskOrchestrator>,

    new_color_threshold: TimeThreshold,
    colors: Option<[Color; 3]>,
    current_task: Option<TaskHandle>,
    current_light: Option<Arc<Light>>,
}

impl ColorStrobeEffect {
    pub fn new(
        orchestrator: Arc<TaskOrchestrator>,
        brightness_threshold: f64,
        activation_probability: f64,
    ) -> Self {
        Self {
            gate: ThresholdGate::new(
                "ColorStrobeEffect",
                brightness_threshold,
                activation_probability,
            ),
            rng: SmallRng::from_entropy(),
            orchestrator,
            new_color_threshold: TimeThreshold::disarmed(),
            colors: None,
            current_task: None,
            current_light: None,
        }
    }

    pub fn beat_received(&mut self, id: EffectId, update: &LightUpdate) -> Result<(), EffectError> {
        match self.gate.on_beat(update, &mut self.rng) {
            GateAction::Activate => {
                self.new_color_threshold = TimeThreshold::armed(update.now(), Duration::ZERO);
                self.execute(id, update)?;
            }
            GateAction::Run => self.execute(id, update)?,
            GateAction::Deactivate => self.execution_done(id, update),
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
            self.execution_done(id, update);
        }
        Ok(())
    }

    fn execute(&mut self, id: EffectId, update: &LightUpdate) -> Result<(), EffectError> {
        if let Some(task) = self.current_task.take() {
            task.cancel();
            if let (Some(light), Some(colors)) = (&self.current_light, &self.colors) {
                light.set_fade_color(id, colors[0]);
            }
        }

        if self.new_color_threshold.is_met(update.now()) {
            self.pick_new_colors(id, update);
        }

        self.current_light = update
            .main_lights()
            .iter()
            .find(|light| light.can_control_color(id))
            .cloned();
        let Some(light) = self.current_light.clone() else {
            return Ok(());
        };

        let mut delay = update.time_since_last_beat().as_millis() as u64;
        while delay > MAXIMUM_STROBE_DELAY_MS {
            delay /= 2;
        }

        let colors = self.colors.unwrap_or([
            update.color_set().next_color(),
            update.color_set().next_color(),
            update.color_set().next_color(),
        ]);
        let mut current_color = 0usize;
        let handle = self.orchestrator.schedule_periodic(
            Duration::ZERO,
            Duration::from_millis(delay),
            move || {
                if light.is_strobing() {
                    return;
                }
                current_color = (current_color + 1) % colors.len();
                light.set_color(id, colors[current_color]);
                light.apply_update(0);
            },
        )?;
        self.current_task = Some(handle);
        Ok(())
    }

    fn execution_done(&mut self, id: EffectId, update: &LightUpdate) {
        if let Some(task) = self.current_task.take() {
            task.cancel();
        }
        self.current_light = None;

        for light in update.lights() {
            if light.release_color(id) {
                if let Some(colors) = &self.colors {
                    light.set_fade_color(id, colors[0]);
                }
            }
        }
    }

    fn pick_new_colors(&mut self, id: EffectId, update: &LightUpdate) {
        self.new_color_threshold
            .arm(update.now(), COLOR_CHANGE_INTERVAL);

        let set = update.color_set();
        let previous_last = self.colors.map(|colors| colors[2]);
        let first = set.next_color_different_from(previous_last.as_ref());
        let second = set.next_color_different_from(Some(&first));
        let third = set.next_color_different_from(Some(&second));
        let colors = [first, second, third];
        self.colors = Some(colors);

        for light in update.lights() {
            if light.claim_color(id) {
                light.set_fade_color(id, colors[0]);
            }
        }
    }
}
