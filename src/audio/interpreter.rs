//! BeatInterpreter - dual-threshold beat detection over RMS amplitudes
//!
//! A beat must be both relatively louder than the rolling average and louder
//! than a decaying gate seeded from the last major peak. The hybrid model
//! keeps detection stable across quiet and loud passages. All timing is
//! driven by a caller-supplied `Instant` so the detector is fully
//! deterministic under test.

use std::time::{Duration, Instant};

use crate::audio::BeatSignal;
use crate::config::ConfigHandle;
use crate::util::{AverageBuffer, TimeThreshold};

const AVERAGE_WINDOW: Duration = Duration::from_secs(3);
const NO_BEAT_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_TIMEOUT: Duration = Duration::from_secs(1);
const STARTUP_CALIBRATION: Duration = Duration::from_secs(1);

/// Beat multiplier at sensitivity 1 (least sensitive).
const MAX_MULTIPLIER: f64 = 1.50;
/// Beat multiplier at sensitivity 10 (most sensitive).
const MIN_MULTIPLIER: f64 = 1.30;

const PEAK_DECAY_RATE_PER_MS: f64 = 0.00015;
const PEAK_RAISE_MULTIPLIER: f64 = 1.2;

/// Interprets a stream of amplitude samples into beat, no-beat and silence
/// signals. One instance lives for exactly one capture session.
pub struct BeatInterpreter {
    config: ConfigHandle,

    amplitude_history: AverageBuffer,
    is_silent: bool,

    no_beat_threshold: TimeThreshold,
    silence_threshold: TimeThreshold,
    /// Armed after each beat with the configured minimum inter-beat time.
    /// Starts armed with the startup calibration delay so stream startup
    /// transients cannot fire spurious beats.
    beat_cooldown: TimeThreshold,

    peak_gate_threshold: f64,
    last_update: Option<Instant>,
}

impl BeatInterpreter {
    /// `updates_per_second` sizes the rolling average window; `now` anchors
    /// the startup calibration delay.
    pub fn new(config: ConfigHandle, updates_per_second: u32, now: Instant) -> Self {
        let window_samples = (AVERAGE_WINDOW.as_secs() as usize) * updates_per_second as usize;
        Self {
            config,
            amplitude_history: AverageBuffer::with_max_tracking(window_samples.max(1), false),
            is_silent: true,
            no_beat_threshold: TimeThreshold::disarmed(),
            silence_threshold: TimeThreshold::disarmed(),
            beat_cooldown: TimeThreshold::armed(now, STARTUP_CALIBRATION),
            peak_gate_threshold: 0.0,
            last_update: None,
        }
    }

    /// Process one amplitude sample. Returns at most one signal.
    pub fn interpret(&mut self, amplitude: f64, now: Instant) -> Option<BeatSignal> {
        if let Some(last) = self.last_update {
            let elapsed_ms = now.saturating_duration_since(last).as_millis() as f64;
            self.peak_gate_threshold =
                (self.peak_gate_threshold - PEAK_DECAY_RATE_PER_MS * elapsed_ms).max(0.0);
        }
        self.last_update = Some(now);

        self.amplitude_history.add(amplitude);
        let average = self.amplitude_history.average();

        let sensitivity = {
            let config = self.config.read().unwrap_or_else(|e| e.into_inner());
            config.beat.sensitivity
        };
        let normalized = (sensitivity.clamp(1, 10) - 1) as f64 / 9.0;
        let beat_multiplier = MAX_MULTIPLIER - normalized * (MAX_MULTIPLIER - MIN_MULTIPLIER);
        let dynamic_threshold = average * beat_multiplier;

        if amplitude > dynamic_threshold && amplitude > self.peak_gate_threshold {
            self.no_beat_threshold.arm(now, NO_BEAT_TIMEOUT);
            self.silence_threshold.disarm();
            self.is_silent = false;

            self.peak_gate_threshold = amplitude * PEAK_RAISE_MULTIPLIER;

            if self.beat_cooldown.is_met(now) {
                let min_between = {
                    let config = self.config.read().unwrap_or_else(|e| e.into_inner());
                    Duration::from_millis(config.beat.min_time_between_ms)
                };
                self.beat_cooldown.arm(now, min_between);
                log::debug!(
                    "[Interpreter] Beat at {:.4} (avg {:.4}, threshold {:.4})",
                    amplitude,
                    average,
                    dynamic_threshold
                );
                return Some(BeatSignal::Beat { amplitude, average });
            }
            return None;
        }

        if amplitude > 0.0 {
            self.silence_threshold.disarm();
            self.is_silent = false;
            if self.no_beat_threshold.is_met(now) {
                self.no_beat_threshold.disarm();
                log::debug!("[Interpreter] No beat (threshold {:.4})", dynamic_threshold);
                return Some(BeatSignal::NoBeat { average });
            }
        } else if self.silence_threshold.is_armed() {
            if self.silence_threshold.is_met(now) {
                self.silence_threshold.disarm();
                self.no_beat_threshold.disarm();
                self.is_silent = true;
                log::debug!("[Interpreter] Silence detected");
                return Some(BeatSignal::Silence);
            }
        } else if !self.is_silent {
            self.silence_threshold.arm(now, SILENCE_TIMEOUT);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn interpreter() -> (BeatInterpreter, Instant) {
        let start = Instant::now();
        let config = SessionConfig::default().into_handle();
        (BeatInterpreter::new(config, 30, start), start)
    }

    /// Feed `count` quiet samples spaced `step_ms` apart, starting at `from`.
    fn feed_quiet(
        interpreter: &mut BeatInterpreter,
        from: Instant,
        count: u32,
        step_ms: u64,
    ) -> Instant {
        let mut now = from;
        for _ in 0..count {
            now += Duration::from_millis(step_ms);
            interpreter.interpret(0.1, now);
        }
        now
    }

    #[test]
    fn test_no_beats_during_startup_calibration() {
        let (mut interpreter, start) = interpreter();
        let now = feed_quiet(&mut interpreter, start, 20, 20);

        // Loud spike well above both thresholds, but inside the first second
        let result = interpreter.interpret(1.0, now + Duration::from_millis(20));
        assert_eq!(result, None);

        // The same spike fires once the calibration delay has passed
        let later = start + Duration::from_millis(1500);
        let result = interpreter.interpret(1.5, later);
        assert!(matches!(result, Some(BeatSignal::Beat { .. })));
    }

    #[test]
    fn test_beat_fires_above_both_thresholds() {
        let (mut interpreter, start) = interpreter();
        let now = feed_quiet(&mut interpreter, start, 40, 33);

        let result = interpreter.interpret(0.9, now + Duration::from_millis(33));
        assert!(matches!(result, Some(BeatSignal::Beat { amplitude, .. }) if amplitude == 0.9));
    }

    #[test]
    fn test_cooldown_suppresses_rapid_second_beat() {
        let (mut interpreter, start) = interpreter();
        let now = feed_quiet(&mut interpreter, start, 40, 33);

        let first = interpreter.interpret(0.9, now + Duration::from_millis(33));
        assert!(matches!(first, Some(BeatSignal::Beat { .. })));

        // Louder than the raised gate, but inside the 200 ms cooldown
        let second = interpreter.interpret(2.0, now + Duration::from_millis(133));
        assert_eq!(second, None);
    }

    #[test]
    fn test_peak_gate_blocks_quieter_followup() {
        let (mut interpreter, start) = interpreter();
        let now = feed_quiet(&mut interpreter, start, 40, 33);

        let first = interpreter.interpret(0.9, now + Duration::from_millis(33));
        assert!(matches!(first, Some(BeatSignal::Beat { .. })));

        // Past the cooldown but below the gate (0.9 * 1.2 = 1.08)
        let second = interpreter.interpret(1.0, now + Duration::from_millis(333));
        assert_eq!(second, None);
    }

    #[test]
    fn test_peak_gate_decays_over_time() {
        let (mut interpreter, start) = interpreter();
        let now = feed_quiet(&mut interpreter, start, 40, 33);

        let first = interpreter.interpret(0.9, now + Duration::from_millis(33));
        assert!(matches!(first, Some(BeatSignal::Beat { .. })));

        // 4 s of decay drops the gate by 0.6; 1.0 now clears 1.08 - 0.6
        let later = now + Duration::from_millis(33) + Duration::from_secs(4);
        let second = interpreter.interpret(1.0, later);
        assert!(matches!(second, Some(BeatSignal::Beat { .. })));
    }

    #[test]
    fn test_no_beat_emitted_once_after_timeout() {
        let (mut interpreter, start) = interpreter();
        let now = feed_quiet(&mut interpreter, start, 40, 33);

        let beat = interpreter.interpret(0.9, now + Duration::from_millis(33));
        assert!(matches!(beat, Some(BeatSignal::Beat { .. })));

        let after_timeout = now + Duration::from_millis(33) + Duration::from_millis(2100);
        let no_beat = interpreter.interpret(0.1, after_timeout);
        assert!(matches!(no_beat, Some(BeatSignal::NoBeat { .. })));

        // Timer disarmed after firing once
        let again = interpreter.interpret(0.1, after_timeout + Duration::from_millis(100));
        assert_eq!(again, None);
    }

    #[test]
    fn test_silence_emitted_once_after_quiet_second() {
        let (mut interpreter, start) = interpreter();
        let now = feed_quiet(&mut interpreter, start, 40, 33);

        // First zero sample arms the silence timer
        let mut t = now + Duration::from_millis(33);
        assert_eq!(interpreter.interpret(0.0, t), None);

        t += Duration::from_millis(1100);
        assert_eq!(interpreter.interpret(0.0, t), Some(BeatSignal::Silence));

        // Already silent, no repeat
        t += Duration::from_secs(2);
        assert_eq!(interpreter.interpret(0.0, t), None);
    }

    #[test]
    fn test_beat_cooldown_then_no_beat_sequence() {
        let (mut interpreter, start) = interpreter();

        // Zeros through the startup calibration window
        let mut now = start;
        for _ in 0..8 {
            now += Duration::from_millis(150);
            assert_eq!(interpreter.interpret(0.0, now), None);
        }

        now += Duration::from_millis(150);
        let beat = interpreter.interpret(1.0, now);
        match beat {
            Some(BeatSignal::Beat { amplitude, average }) => {
                assert_eq!(amplitude, 1.0);
                assert!(average < 0.2);
            }
            other => panic!("expected a beat, got {:?}", other),
        }

        // Inside the 200 ms cooldown nothing fires
        assert_eq!(interpreter.interpret(0.3, now + Duration::from_millis(100)), None);

        // Quiet ever since; the no-beat timer fires once after 2 s
        let late = now + Duration::from_millis(2100);
        let no_beat = interpreter.interpret(0.3, late);
        assert!(matches!(no_beat, Some(BeatSignal::NoBeat { .. })));
    }

    #[test]
    fn test_higher_sensitivity_lowers_threshold() {
        let start = Instant::now();
        let config = SessionConfig::default().into_handle();
        config.write().unwrap().beat.sensitivity = 10;
        let mut interpreter = BeatInterpreter::new(config, 30, start);

        let now = feed_quiet(&mut interpreter, start, 40, 33);

        // Average sits near 0.1; 0.14 clears 0.1 * 1.30 but not 0.1 * 1.50
        let result = interpreter.interpret(0.14, now + Duration::from_millis(33));
        assert!(matches!(result, Some(BeatSignal::Beat { .. })));
    }
}
