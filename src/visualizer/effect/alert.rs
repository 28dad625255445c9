//! Alert effect - breathe cycles on strong beats

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::EffectError;
use crate::light::EffectId;
use crate::util::TimeThreshold;
use crate::visualizer::effect::{GateAction, ThresholdGate};
use crate::visualizer::light_update::LightUpdate;

/// Approximated time until one breathe cycle is done.
const ALERT_DURATION: Duration = Duration::from_millis(500);

pub struct AlertEffect {
    gate: ThresholdGate,
    random_probability: f64,
    rng: SmallRng,

    alert_threshold: TimeThreshold,
}

impl AlertEffect {
    pub fn new(
        brightness_threshold: f64,
        activation_probability: f64,
        random_probability: f64,
    ) -> Self {
        Self {
            gate: ThresholdGate::new("AlertEffect", brightness_threshold, activation_probability),
            random_probability,
            rng: SmallRng::from_entropy(),
            alert_threshold: TimeThreshold::disarmed(),
        }
    }

    pub fn beat_received(&mut self, _id: EffectId, update: &LightUpdate) -> Result<(), EffectError> {
        let was_active = self.gate.is_active();

        match self.gate.on_beat(update, &mut self.rng) {
            GateAction::Activate => {
                self.alert_threshold = TimeThreshold::armed(update.now(), Duration::ZERO);
                self.execute(update);
            }
            GateAction::Run => self.execute(update),
            GateAction::Deactivate | GateAction::Skip => {}
        }

        if !was_active && self.rng.gen::<f64>() < self.random_probability {
            log::info!("[Effect] AlertEffect was executed once");
            if let Some(light) = update.lights_turned_on().first() {
                light.set_alert_mode();
            }
        }

        Ok(())
    }

    pub fn no_beat_received(
        &mut self,
        _id: EffectId,
        update: &LightUpdate,
    ) -> Result<(), EffectError> {
        self.gate.on_no_beat(update.now());
        Ok(())
    }

    fn execute(&mut self, update: &LightUpdate) {
        if self.alert_threshold.is_met(update.now()) {
            for light in update.lights() {
                light.set_alert_mode();
            }
            self.alert_threshold.arm(update.now(), ALERT_DURATION);
        }
    }
}
