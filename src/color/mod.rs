//! Color model and palette handling
//!
//! Lights are driven in hue/saturation space at full brightness value;
//! brightness itself travels separately through the brightness calibrator.
//! A [`ColorSet`] hands out colors in shuffled batches so consecutive ticks
//! stay varied without ever starving a palette entry.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::ConfigHandle;

/// A color in both RGB and hue/saturation form. Equality is by RGB value.
#[derive(Debug, Clone, Copy)]
pub struct Color {
    rgb: u32,
    hue: f32,
    saturation: f32,
}

impl Color {
    pub fn from_rgb(rgb: u32) -> Self {
        let (hue, saturation) = rgb_to_hs(rgb);
        Self {
            rgb: rgb & 0x00FF_FFFF,
            hue,
            saturation,
        }
    }

    /// Build from hue and saturation at full brightness.
    pub fn from_hs(hue: f32, saturation: f32) -> Self {
        Self {
            rgb: hs_to_rgb(hue, saturation),
            hue,
            saturation,
        }
    }

    pub fn rgb(&self) -> u32 {
        self.rgb
    }

    pub fn hue(&self) -> f32 {
        self.hue
    }

    pub fn saturation(&self) -> f32 {
        self.saturation
    }

    /// A randomized nearby color. Hue wraps around the wheel; saturation
    /// clamps at its bounds.
    pub fn derived(&self, range: f64, rng: &mut SmallRng) -> Self {
        Self::from_hs(
            randomized(self.hue, range, true, rng),
            randomized(self.saturation, range, false, rng),
        )
    }

    /// True if `other` could be the result of deriving this color with the
    /// given range, or is this color exactly.
    pub fn is_similar(&self, other: &Color, range: f64) -> bool {
        if self == other {
            return true;
        }
        let range = range as f32;
        (other.hue - self.hue).abs() <= range && (other.saturation - self.saturation).abs() <= range
    }
}

impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        self.rgb == other.rgb
    }
}

fn randomized(value: f32, range: f64, cyclical: bool, rng: &mut SmallRng) -> f32 {
    if range == 0.0 {
        return value;
    }
    let offset = rng.gen::<f64>() * 2.0 * range - range;
    let result = value as f64 + offset;
    if result < 0.0 {
        return if cyclical { (result + 1.0) as f32 } else { 0.0 };
    }
    if result > 1.0 {
        return if cyclical { (result - 1.0) as f32 } else { 1.0 };
    }
    result as f32
}

/// Hue/saturation to packed RGB at full brightness value.
fn hs_to_rgb(hue: f32, saturation: f32) -> u32 {
    if saturation <= 0.0 {
        return 0x00FF_FFFF;
    }

    let h = (hue - hue.floor()) * 6.0;
    let f = h - h.floor();
    let p = 1.0 - saturation;
    let q = 1.0 - saturation * f;
    let t = 1.0 - saturation * (1.0 - f);

    let (r, g, b) = match h as u32 {
        0 => (1.0, t, p),
        1 => (q, 1.0, p),
        2 => (p, 1.0, t),
        3 => (p, q, 1.0),
        4 => (t, p, 1.0),
        _ => (1.0, p, q),
    };

    let to_byte = |channel: f32| (channel * 255.0 + 0.5) as u32;
    (to_byte(r) << 16) | (to_byte(g) << 8) | to_byte(b)
}

/// Packed RGB to hue and saturation, ignoring brightness.
fn rgb_to_hs(rgb: u32) -> (f32, f32) {
    let r = ((rgb >> 16) & 0xFF) as f32;
    let g = ((rgb >> 8) & 0xFF) as f32;
    let b = (rgb & 0xFF) as f32;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max <= 0.0 {
        return (0.0, 0.0);
    }

    let saturation = (max - min) / max;
    if saturation == 0.0 {
        return (0.0, 0.0);
    }

    let delta = max - min;
    let hue = if r == max {
        (g - b) / delta
    } else if g == max {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    } / 6.0;

    (if hue < 0.0 { hue + 1.0 } else { hue }, saturation)
}

const RANDOM_BATCH_SIZE: usize = 16;
const MIN_PALETTE_SIZE: usize = 12;
const DIFFERENT_FROM_RETRIES: u32 = 5;

struct SetState {
    queue: VecDeque<Color>,
    /// Hue-wheel cursor for the random set.
    current_hue: f32,
    rng: SmallRng,
}

/// Source of colors for a session: either an evenly-walked hue wheel or a
/// user palette with per-batch shuffling and randomized derivation.
pub enum ColorSet {
    Random,
    Custom { colors: Vec<Color> },
}

/// A color set bound to the session configuration, handing out colors from
/// internally refilled shuffled batches.
pub struct SessionColorSet {
    config: ConfigHandle,
    set: ColorSet,
    state: Mutex<SetState>,
}

impl SessionColorSet {
    /// Build from the configured palette; `None` selects the random wheel.
    pub fn from_config(config: ConfigHandle) -> Self {
        let palette = {
            let cfg = config.read().unwrap_or_else(|e| e.into_inner());
            cfg.colors.custom_palette.clone()
        };

        let set = match palette {
            Some(rgbs) => {
                let mut colors: Vec<Color> = rgbs.iter().map(|&rgb| Color::from_rgb(rgb)).collect();
                let original = colors.clone();
                while colors.len() < MIN_PALETTE_SIZE {
                    colors.extend_from_slice(&original);
                }
                ColorSet::Custom { colors }
            }
            None => ColorSet::Random,
        };

        Self {
            config,
            set,
            state: Mutex::new(SetState {
                queue: VecDeque::new(),
                current_hue: 0.0,
                rng: SmallRng::from_entropy(),
            }),
        }
    }

    /// Next color from the current batch, refilling when exhausted.
    pub fn next_color(&self) -> Color {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.next_color_locked(&mut state)
    }

    /// Next color that is not similar to `different_from`, giving up after a
    /// few draws so a tight palette cannot loop forever.
    pub fn next_color_different_from(&self, different_from: Option<&Color>) -> Color {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut color = self.next_color_locked(&mut state);

        let Some(different_from) = different_from else {
            return color;
        };

        let range = self.randomization_range();
        let mut retries = DIFFERENT_FROM_RETRIES;
        while color.is_similar(different_from, range) && retries > 0 {
            color = self.next_color_locked(&mut state);
            retries -= 1;
        }
        color
    }

    fn next_color_locked(&self, state: &mut SetState) -> Color {
        if state.queue.is_empty() {
            self.refill(state);
        }
        // refill always leaves at least one entry
        state.queue.pop_front().unwrap_or(Color::from_hs(0.0, 1.0))
    }

    fn refill(&self, state: &mut SetState) {
        let mut batch: Vec<Color> = match &self.set {
            ColorSet::Random => (0..RANDOM_BATCH_SIZE)
                .map(|_| {
                    state.current_hue += state.rng.gen::<f32>() / 4.0;
                    state.current_hue %= 1.0;
                    Color::from_hs(state.current_hue, 1.0)
                })
                .collect(),
            ColorSet::Custom { colors } => {
                let range = self.randomization_range();
                colors
                    .iter()
                    .map(|color| color.derived(range, &mut state.rng))
                    .collect()
            }
        };

        batch.shuffle(&mut state.rng);
        state.queue.extend(batch);
    }

    fn randomization_range(&self) -> f64 {
        let cfg = self.config.read().unwrap_or_else(|e| e.into_inner());
        cfg.colors.randomization_range as f64 / 100.0
    }
}
