//! TransitionTimeCalibrator - adaptive fade transition times
//!
//! The fade transition stretches with the tempo: the further the current
//! inter-beat gap sits above the recent average, the closer the transition
//! gets to the configured maximum. Reaches the maximum once the gap is at
//! least twice the average.

use crate::config::ConfigHandle;
use crate::util::AverageBuffer;

pub const HISTORY_SIZE: usize = 25;
pub const CALIBRATION_SIZE: usize = 10;
pub const MIN_TRANSITION_TIME: u16 = 1;

pub struct TransitionTimeCalibrator {
    config: ConfigHandle,
    interval_history: AverageBuffer,
}

impl TransitionTimeCalibrator {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            interval_history: AverageBuffer::new(HISTORY_SIZE),
        }
    }

    /// Transition time (in 100 ms units) for the given time since the last
    /// beat. The first `CALIBRATION_SIZE` calls return half the maximum.
    pub fn get_transition_time(&mut self, time_since_last_beat_ms: u64) -> u16 {
        let max_transition_time = {
            let config = self.config.read().unwrap_or_else(|e| e.into_inner());
            config.brightness.fade_max_time
        };

        self.interval_history.add(time_since_last_beat_ms as f64);

        if self.interval_history.len() <= CALIBRATION_SIZE {
            return max_transition_time / 2;
        }

        let time_for_max_transition = self.interval_history.average() * 2.0;
        let percentage = (time_since_last_beat_ms as f64 / time_for_max_transition).min(1.0);

        ((percentage * max_transition_time as f64).round() as u16).max(MIN_TRANSITION_TIME)
    }

    pub fn clear_history(&mut self) {
        self.interval_history.clear();
    }
}
