//! BrightnessCalibrator - adaptive brightness from amplitude deviations
//!
//! Brightness tracks how far the triggering amplitude sits from its recent
//! average, scaled against the largest deviation seen lately. A hysteresis
//! threshold suppresses small jitters; reaching either boundary or changing
//! the brightness configuration forces an update through regardless.

use crate::config::ConfigHandle;
use crate::util::AverageBuffer;

pub const BRIGHTNESS_DIFFERENCE_PERCENTAGE_BASE: f64 = 0.04;
const BRIGHTNESS_CHANGE_MINIMUM_PERCENTAGE: f64 = 0.2;

pub const CALIBRATION_SIZE: usize = 30;
/// Holds one to two minutes of deviations at around 125 bpm.
const BUFFER_SIZE: usize = 150;

/// Resolved brightness values for one tick.
#[derive(Debug, Clone, Copy)]
pub struct BrightnessData {
    pub brightness_percentage: f64,
    pub brightness_change: bool,
    pub brightness: u8,
    pub brightness_fade: u8,
}

pub struct BrightnessCalibrator {
    config: ConfigHandle,

    brightness_min: i64,
    brightness_range: i64,
    fade_difference: f64,
    highest_fade: f64,
    lowest_beat: f64,

    current_percentage: f64,
    deviation_history: AverageBuffer,
}

impl BrightnessCalibrator {
    pub fn new(config: ConfigHandle) -> Self {
        let mut calibrator = Self {
            config,
            brightness_min: -1,
            brightness_range: -1,
            fade_difference: -1.0,
            highest_fade: 0.0,
            lowest_beat: 0.0,
            current_percentage: 0.0,
            deviation_history: AverageBuffer::new(BUFFER_SIZE),
        };
        calibrator.update_config_values();
        calibrator
    }

    /// Brightness for the given deviation from the average amplitude.
    /// During the calibration phase this pins the percentage at 50%.
    pub fn get_brightness(&mut self, amplitude_difference: f64) -> BrightnessData {
        let force_change = self.update_config_values();

        self.deviation_history.add(amplitude_difference);

        if self.deviation_history.len() < CALIBRATION_SIZE {
            return self.brightness_data(0.5, force_change);
        }

        // scale against the largest recent deviation; hitting it means 100%
        let multiplier = 1.0 / self.deviation_history.max_value();
        let percentage = (amplitude_difference * multiplier).clamp(-1.0, 1.0);
        let percentage = (percentage + 1.0) / 2.0;

        self.brightness_data(percentage, force_change)
    }

    /// Data for the 0% case used on no-beat and silence ticks.
    pub fn get_lowest_brightness_data(&mut self) -> BrightnessData {
        self.brightness_data(0.0, false)
    }

    pub fn clear_history(&mut self) {
        self.deviation_history.clear();
    }

    fn update_config_values(&mut self) -> bool {
        let (min, max, fade_steps) = {
            let config = self.config.read().unwrap_or_else(|e| e.into_inner());
            (
                config.brightness.min as i64,
                config.brightness.max as i64,
                config.brightness.fade_difference as i64,
            )
        };
        let range = max - min;
        let fade_difference = fade_steps as f64 * BRIGHTNESS_DIFFERENCE_PERCENTAGE_BASE;

        if self.brightness_min != min
            || self.brightness_range != range
            || self.fade_difference != fade_difference
        {
            self.brightness_min = min;
            self.brightness_range = range;
            self.fade_difference = fade_difference;
            self.lowest_beat = fade_difference * 2.0;
            self.highest_fade = 1.0 - self.lowest_beat;
            return true;
        }
        false
    }

    fn brightness_data(&mut self, percentage: f64, force_change: bool) -> BrightnessData {
        let difference = percentage - self.current_percentage;

        // boundary hits always update; otherwise the change must clear the
        // hysteresis threshold
        let change = force_change
            || difference.abs() > BRIGHTNESS_CHANGE_MINIMUM_PERCENTAGE
            || (percentage == 1.0 && self.current_percentage < 1.0)
            || (percentage == 0.0 && self.current_percentage > 0.0);

        if change {
            self.current_percentage = percentage;
        }

        let percentage_low = (self.current_percentage - self.fade_difference)
            .max(0.0)
            .min(self.highest_fade);
        let brightness_fade =
            ((self.brightness_range as f64 * percentage_low).round() as i64 + self.brightness_min) as u8;

        let percentage_high = (self.current_percentage + self.fade_difference)
            .min(1.0)
            .max(self.lowest_beat);
        let brightness =
            ((self.brightness_range as f64 * percentage_high).round() as i64 + self.brightness_min) as u8;

        BrightnessData {
            brightness_percentage: self.current_percentage,
            brightness_change: change,
            brightness,
            brightness_fade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    const MAX_BRIGHTNESS: f64 = 254.0;
    const MEDIAN_BRIGHTNESS: i64 = 127;
    const FADE_DIFFERENCE_STEPS: f64 = 5.0;

    fn calibrator() -> BrightnessCalibrator {
        BrightnessCalibrator::new(SessionConfig::default().into_handle())
    }

    fn average_brightness(data: &BrightnessData) -> i64 {
        ((data.brightness as f64 + data.brightness_fade as f64) / 2.0).round() as i64
    }

    #[test]
    fn test_get_brightness() {
        let mut calibrator = calibrator();

        // calibration phase pins brightness at 50%
        for i in 0..CALIBRATION_SIZE - 1 {
            let difference = if i < CALIBRATION_SIZE - 2 { 0.0 } else { 1.0 };
            let data = calibrator.get_brightness(difference);
            assert_eq!(average_brightness(&data), MEDIAN_BRIGHTNESS);
        }

        // zero deviation keeps the median
        let data = calibrator.get_brightness(0.0);
        assert_eq!(average_brightness(&data), MEDIAN_BRIGHTNESS);

        // insignificant deviation does not move brightness
        let data = calibrator.get_brightness(0.1);
        assert_eq!(average_brightness(&data), MEDIAN_BRIGHTNESS);

        // significant deviation corrects upwards
        let data = calibrator.get_brightness(0.5);
        assert!(average_brightness(&data) > (MAX_BRIGHTNESS * 0.725).round() as i64);

        // max deviation reaches full brightness, with the fade clamped below
        let data = calibrator.get_brightness(1.0);
        assert_eq!(data.brightness, 254);
        let spread = BRIGHTNESS_DIFFERENCE_PERCENTAGE_BASE * FADE_DIFFERENCE_STEPS * 2.0;
        let expected_fade = (MAX_BRIGHTNESS - (spread * MAX_BRIGHTNESS).round()) as u8;
        assert_eq!(data.brightness_fade, expected_fade);
    }

    #[test]
    fn test_get_lowest_brightness_data() {
        let mut calibrator = calibrator();
        let data = calibrator.get_lowest_brightness_data();

        assert!(!data.brightness_change);
        assert_eq!(data.brightness_fade, 0);
        let spread = BRIGHTNESS_DIFFERENCE_PERCENTAGE_BASE * FADE_DIFFERENCE_STEPS * 2.0;
        let expected_beat = (spread * MAX_BRIGHTNESS).round() as u8;
        assert_eq!(data.brightness, expected_beat);

        // once brightness has been raised, dropping to 0% is a change
        calibrator.get_brightness(1.0);
        assert!(calibrator.get_lowest_brightness_data().brightness_change);
    }

    #[test]
    fn test_config_change_forces_brightness_update() {
        let config = SessionConfig::default().into_handle();
        let mut calibrator = BrightnessCalibrator::new(std::sync::Arc::clone(&config));

        // settle at the calibration median
        calibrator.get_brightness(0.0);
        let data = calibrator.get_brightness(0.0);
        assert!(!data.brightness_change);

        config.write().unwrap().brightness.max = 200;
        let data = calibrator.get_brightness(0.0);
        assert!(data.brightness_change);
        assert_eq!(data.brightness_fade, 60);
        assert_eq!(data.brightness, 140);
    }
}
