//! LightUpdate - shared per-tick context for the effect pipeline
//!
//! Built once per beat or no-beat tick from a freshly shuffled light list.
//! The first light is always a "main" light; additional lights join with a
//! configured probability. Effects mutate light controllers through this
//! context, then `execute` flushes every light once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::Rng;

use crate::color::SessionColorSet;
use crate::config::ConfigHandle;
use crate::light::Light;
use crate::visualizer::brightness::BrightnessData;

pub struct LightUpdate {
    lights: Vec<Arc<Light>>,
    lights_turned_on: Vec<Arc<Light>>,
    main_count: usize,

    color_set: Arc<SessionColorSet>,
    brightness_data: BrightnessData,
    time_since_last_beat: Duration,
    transition_time: u16,
    now: Instant,
}

impl LightUpdate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &ConfigHandle,
        lights: Vec<Arc<Light>>,
        color_set: Arc<SessionColorSet>,
        brightness_data: BrightnessData,
        time_since_last_beat: Duration,
        transition_time: u16,
        now: Instant,
        rng: &mut SmallRng,
    ) -> Self {
        let lights_turned_on = lights
            .iter()
            .filter(|light| light.is_on())
            .cloned()
            .collect();

        let probability = {
            let config = config.read().unwrap_or_else(|e| e.into_inner());
            config.effects.light_amount_probability as f64 / 10.0
        };
        let mut main_count = 1;
        while main_count < lights.len() && rng.gen::<f64>() < probability {
            main_count += 1;
        }

        Self {
            lights,
            lights_turned_on,
            main_count,
            color_set,
            brightness_data,
            time_since_last_beat,
            transition_time,
            now,
        }
    }

    /// All lights of this tick, in shuffled order.
    pub fn lights(&self) -> &[Arc<Light>] {
        &self.lights
    }

    /// The subset selected for the beat emphasis; never empty.
    pub fn main_lights(&self) -> &[Arc<Light>] {
        &self.lights[..self.main_count.min(self.lights.len())]
    }

    pub fn lights_turned_on(&self) -> &[Arc<Light>] {
        &self.lights_turned_on
    }

    pub fn is_main_light(&self, light: &Arc<Light>) -> bool {
        self.main_lights().iter().any(|main| Arc::ptr_eq(main, light))
    }

    pub fn color_set(&self) -> &SessionColorSet {
        &self.color_set
    }

    pub fn brightness(&self) -> u8 {
        self.brightness_data.brightness
    }

    pub fn brightness_fade(&self) -> u8 {
        self.brightness_data.brightness_fade
    }

    pub fn brightness_percentage(&self) -> f64 {
        self.brightness_data.brightness_percentage
    }

    pub fn is_brightness_change(&self) -> bool {
        self.brightness_data.brightness_change
    }

    pub fn time_since_last_beat(&self) -> Duration {
        self.time_since_last_beat
    }

    pub fn transition_time(&self) -> u16 {
        self.transition_time
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Flush every light's accumulated changes.
    pub fn execute(&self) {
        for light in &self.lights {
            light.apply_update(self.transition_time);
        }
    }
}
