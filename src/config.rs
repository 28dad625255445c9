//! Session configuration for the light show engine
//!
//! Parameters are grouped the way the GUI exposes them: beat detection,
//! brightness shaping and effect toggles. A session reads the configuration
//! through a shared handle so slider changes take effect on the next tick;
//! `validate()` runs once at session construction and fails fast on invalid
//! ranges, before any device I/O begins.

use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shared, live-updatable configuration handle.
pub type ConfigHandle = Arc<RwLock<SessionConfig>>;

/// Complete per-session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub beat: BeatConfig,
    pub brightness: BrightnessConfig,
    pub effects: EffectConfig,
    pub colors: ColorConfig,
}

/// Beat detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatConfig {
    /// Detection sensitivity from 1 (least) to 10 (most sensitive)
    pub sensitivity: u8,
    /// Minimum time between two dispatched beats in milliseconds
    pub min_time_between_ms: u64,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            sensitivity: 5,
            min_time_between_ms: 200,
        }
    }
}

/// Brightness shaping parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessConfig {
    /// Lowest brightness value sent to a light (bridge scale, 0-254)
    pub min: u8,
    /// Highest brightness value sent to a light (bridge scale, 0-254)
    pub max: u8,
    /// Beat/fade brightness spread in steps of 4% (0-10)
    pub fade_difference: u8,
    /// Upper bound for the adaptive fade transition time, in 100 ms units
    pub fade_max_time: u16,
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: 254,
            fade_difference: 5,
            fade_max_time: 5,
        }
    }
}

/// Effect pipeline toggles and tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    /// Enable the alert (breathe) effect
    pub alert: bool,
    /// Enable the color strobe effect
    pub color_strobe: bool,
    /// Enable the strobe and strobe chain effects
    pub strobe: bool,
    /// Probability weight (0-10) that additional lights join the per-tick
    /// "main lights" subset
    pub light_amount_probability: u8,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            alert: true,
            color_strobe: false,
            strobe: false,
            light_amount_probability: 5,
        }
    }
}

/// Color selection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorConfig {
    /// Selected palette; `None` walks the full hue wheel randomly
    pub custom_palette: Option<Vec<u32>>,
    /// Randomization range applied to palette colors, in percent (0-100)
    pub randomization_range: u8,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            custom_palette: None,
            randomization_range: 15,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            beat: BeatConfig::default(),
            brightness: BrightnessConfig::default(),
            effects: EffectConfig::default(),
            colors: ColorConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a JSON file, falling back to defaults if the
    /// file is missing or malformed.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Wrap this configuration in a shared handle for live updates.
    pub fn into_handle(self) -> ConfigHandle {
        Arc::new(RwLock::new(self))
    }

    /// Validate all numeric ranges. Called once at session construction so
    /// an invalid configuration never reaches the device pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.beat.sensitivity) {
            return Err(ConfigError::OutOfRange {
                field: "beat.sensitivity",
                value: self.beat.sensitivity as i64,
                min: 1,
                max: 10,
            });
        }

        if self.brightness.min >= self.brightness.max {
            return Err(ConfigError::InvertedBrightnessBounds {
                min: self.brightness.min,
                max: self.brightness.max,
            });
        }

        if self.brightness.fade_difference > 10 {
            return Err(ConfigError::OutOfRange {
                field: "brightness.fade_difference",
                value: self.brightness.fade_difference as i64,
                min: 0,
                max: 10,
            });
        }

        if self.brightness.fade_max_time == 0 {
            return Err(ConfigError::OutOfRange {
                field: "brightness.fade_max_time",
                value: 0,
                min: 1,
                max: u16::MAX as i64,
            });
        }

        if self.effects.light_amount_probability > 10 {
            return Err(ConfigError::OutOfRange {
                field: "effects.light_amount_probability",
                value: self.effects.light_amount_probability as i64,
                min: 0,
                max: 10,
            });
        }

        if self.colors.randomization_range > 100 {
            return Err(ConfigError::OutOfRange {
                field: "colors.randomization_range",
                value: self.colors.randomization_range as i64,
                min: 0,
                max: 100,
            });
        }

        if let Some(palette) = &self.colors.custom_palette {
            if palette.is_empty() {
                return Err(ConfigError::EmptyColorSet);
            }
        }

        Ok(())
    }
}
