//! The effect pipeline
//!
//! Effects are a closed set of small state machines dispatched in pipeline
//! order; an effect's position doubles as its reservation id, and later
//! positions claim controllers first, giving them priority. Threshold
//! effects share the [`ThresholdGate`] activation logic; two of them also
//! carry a low-probability random side channel that fires while the gate is
//! inactive.

mod alert;
mod color_chain;
mod color_fade;
mod color_flip;
mod color_strobe;
mod default;
mod strobe;
mod strobe_chain;

pub use alert::AlertEffect;
pub use color_chain::ColorChainEffect;
pub use color_fade::ColorFadeEffect;
pub use color_flip::ColorFlipEffect;
pub use color_strobe::ColorStrobeEffect;
pub use default::DefaultEffect;
pub use strobe::StrobeEffect;
pub use strobe_chain::StrobeChainEffect;

use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::Rng;

use crate::error::EffectError;
use crate::light::EffectId;
use crate::util::TimeThreshold;
use crate::visualizer::light_update::LightUpdate;

/// Minimum pause between two activations of the same threshold effect.
const TIME_BETWEEN_ACTIVATIONS: Duration = Duration::from_secs(20);

/// What the gate decided for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// The effect just turned active; initialize, then run.
    Activate,
    /// The effect stays active; run its body.
    Run,
    /// The effect just turned inactive; clean up.
    Deactivate,
    /// Nothing to do this tick.
    Skip,
}

/// Activation state machine shared by all threshold effects. Activates on a
/// brightness increase through the threshold, gated by a probability check
/// and a rate limit; deactivates when brightness falls below the
/// deactivation threshold or a no-beat tick arrives.
pub struct ThresholdGate {
    name: &'static str,
    brightness_threshold: f64,
    activation_probability: f64,
    deactivation_threshold: f64,

    allowed_after: TimeThreshold,
    active: bool,
}

impl ThresholdGate {
    pub fn new(name: &'static str, brightness_threshold: f64, activation_probability: f64) -> Self {
        Self::with_deactivation_offset(name, brightness_threshold, activation_probability, 0.0)
    }

    pub fn with_deactivation_offset(
        name: &'static str,
        brightness_threshold: f64,
        activation_probability: f64,
        offset: f64,
    ) -> Self {
        Self {
            name,
            brightness_threshold,
            activation_probability,
            deactivation_threshold: brightness_threshold + offset,
            allowed_after: TimeThreshold::disarmed(),
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn on_beat(&mut self, update: &LightUpdate, rng: &mut SmallRng) -> GateAction {
        if self.active {
            if update.is_brightness_change()
                && update.brightness_percentage() < self.deactivation_threshold
            {
                self.deactivate(update.now());
                return GateAction::Deactivate;
            }
            return GateAction::Run;
        }

        if update.is_brightness_change()
            && update.brightness_percentage() > self.brightness_threshold
            && rng.gen::<f64>() < self.activation_probability
            && self.activation_allowed(update.now())
        {
            self.active = true;
            log::info!("[Effect] {} started", self.name);
            return GateAction::Activate;
        }

        GateAction::Skip
    }

    /// Deactivate on a no-beat tick. Returns true if cleanup is needed.
    pub fn on_no_beat(&mut self, now: Instant) -> bool {
        if self.active {
            self.deactivate(now);
            return true;
        }
        false
    }

    fn deactivate(&mut self, now: Instant) {
        self.active = false;
        self.allowed_after.arm(now, TIME_BETWEEN_ACTIVATIONS);
        log::info!("[Effect] {} stopped", self.name);
    }

    fn activation_allowed(&self, now: Instant) -> bool {
        !self.allowed_after.is_armed() || self.allowed_after.is_met(now)
    }
}

/// Release every controller reservation `effect` may hold on this tick's
/// lights.
fn release_all(effect: EffectId, update: &LightUpdate) {
    for light in update.lights() {
        light.release_color(effect);
        light.release_strobe(effect);
    }
}

/// The closed set of light effects. The pipeline owns one instance per
/// enabled effect and dispatches ticks by position.
pub enum LightEffect {
    Default(DefaultEffect),
    Alert(AlertEffect),
    ColorStrobe(ColorStrobeEffect),
    ColorFlip(ColorFlipEffect),
    ColorFade(ColorFadeEffect),
    ColorChain(ColorChainEffect),
    Strobe(StrobeEffect),
    StrobeChain(StrobeChainEffect),
}

impl LightEffect {
    pub fn name(&self) -> &'static str {
        match self {
            LightEffect::Default(_) => "DefaultEffect",
            LightEffect::Alert(_) => "AlertEffect",
            LightEffect::ColorStrobe(_) => "ColorStrobeEffect",
            LightEffect::ColorFlip(_) => "ColorFlipEffect",
            LightEffect::ColorFade(_) => "ColorFadeEffect",
            LightEffect::ColorChain(_) => "ColorChainEffect",
            LightEffect::Strobe(_) => "StrobeEffect",
            LightEffect::StrobeChain(_) => "StrobeChainEffect",
        }
    }

    pub fn beat_received(
        &mut self,
        id: EffectId,
        update: &LightUpdate,
    ) -> Result<(), EffectError> {
        match self {
            LightEffect::Default(effect) => effect.beat_received(id, update),
            LightEffect::Alert(effect) => effect.beat_received(id, update),
            LightEffect::ColorStrobe(effect) => effect.beat_received(id, update),
            LightEffect::ColorFlip(effect) => effect.beat_received(id, update),
            LightEffect::ColorFade(effect) => effect.beat_received(id, update),
            LightEffect::ColorChain(effect) => effect.beat_received(id, update),
            LightEffect::Strobe(effect) => effect.beat_received(id, update),
            LightEffect::StrobeChain(effect) => effect.beat_received(id, update),
        }
    }

    pub fn no_beat_received(
        &mut self,
        id: EffectId,
        update: &LightUpdate,
    ) -> Result<(), EffectError> {
        match self {
            LightEffect::Default(effect) => effect.no_beat_received(id, update),
            LightEffect::Alert(effect) => effect.no_beat_received(id, update),
            LightEffect::ColorStrobe(effect) => effect.no_beat_received(id, update),
            LightEffect::ColorFlip(effect) => effect.no_beat_received(id, update),
            LightEffect::ColorFade(effect) => effect.no_beat_received(id, update),
            LightEffect::ColorChain(effect) => effect.no_beat_received(id, update),
            LightEffect::Strobe(effect) => effect.no_beat_received(id, update),
            LightEffect::StrobeChain(effect) => effect.no_beat_received(id, update),
        }
    }
}
