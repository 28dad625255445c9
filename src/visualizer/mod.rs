//! Visualizer - turns beat signals into light updates
//!
//! One visualizer lives for one capture session. It owns the effect
//! pipeline, both calibrators and the session color set, and processes
//! ticks strictly one at a time through a dedicated channel-fed task.

pub mod brightness;
pub mod effect;
pub mod light_update;
pub mod transition;

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::{mpsc, oneshot};

use crate::audio::{BeatSignal, StopStatus};
use crate::color::SessionColorSet;
use crate::config::ConfigHandle;
use crate::error::OrchestratorError;
use crate::light::Light;
use crate::orchestrator::TaskOrchestrator;
use crate::util::AverageBuffer;
use crate::visualizer::brightness::{BrightnessCalibrator, BrightnessData};
use crate::visualizer::effect::{
    AlertEffect, ColorChainEffect, ColorFadeEffect, ColorFlipEffect, ColorStrobeEffect,
    DefaultEffect, LightEffect, StrobeChainEffect, StrobeEffect,
};
use crate::visualizer::light_update::LightUpdate;
use crate::visualizer::transition::TransitionTimeCalibrator;

const AMPLITUDE_HISTORY_SIZE: usize = 75;

/// Tick messages consumed by the session task.
pub enum VisualizerMessage {
    Signal(BeatSignal),
    ReaderStopped(StopStatus),
}

pub struct Visualizer {
    config: ConfigHandle,
    lights: Vec<Arc<Light>>,
    effects: Vec<LightEffect>,

    brightness_calibrator: BrightnessCalibrator,
    transition_calibrator: TransitionTimeCalibrator,
    amplitude_history: AverageBuffer,
    color_set: Arc<SessionColorSet>,

    last_beat: Instant,
    rng: SmallRng,
}

impl Visualizer {
    pub fn new(
        config: ConfigHandle,
        orchestrator: Arc<TaskOrchestrator>,
        lights: Vec<Arc<Light>>,
        now: Instant,
    ) -> Self {
        for light in &lights {
            light.store_state();
        }

        // effects at the end of the pipeline have the highest priority
        let mut effects = Vec::new();
        let (alert, color_strobe, strobe) = {
            let cfg = config.read().unwrap_or_else(|e| e.into_inner());
            (cfg.effects.alert, cfg.effects.color_strobe, cfg.effects.strobe)
        };

        effects.push(LightEffect::Default(DefaultEffect::new()));
        if alert {
            effects.push(LightEffect::Alert(AlertEffect::new(0.8, 0.4, 0.05)));
        }
        if color_strobe {
            effects.push(LightEffect::ColorStrobe(ColorStrobeEffect::new(
                Arc::clone(&orchestrator),
                0.8,
                0.15,
            )));
        }
        effects.push(LightEffect::ColorFlip(ColorFlipEffect::new(0.7, 0.15)));
        effects.push(LightEffect::ColorFade(ColorFadeEffect::new(0.6, 0.2)));
        effects.push(LightEffect::ColorChain(ColorChainEffect::new(0.5, 0.1)));
        if strobe {
            effects.push(LightEffect::Strobe(StrobeEffect::new(0.95, 0.4, 0.02)));
            effects.push(LightEffect::StrobeChain(StrobeChainEffect::new(0.8, 0.1)));
        }

        Self {
            brightness_calibrator: BrightnessCalibrator::new(Arc::clone(&config)),
            transition_calibrator: TransitionTimeCalibrator::new(Arc::clone(&config)),
            amplitude_history: AverageBuffer::with_max_tracking(AMPLITUDE_HISTORY_SIZE, false),
            color_set: Arc::new(SessionColorSet::from_config(Arc::clone(&config))),
            config,
            lights,
            effects,
            last_beat: now,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn handle_signal(&mut self, signal: BeatSignal, now: Instant) {
        match signal {
            BeatSignal::Beat { amplitude, .. } => {
                self.amplitude_history.add(amplitude);
                let difference = amplitude - self.amplitude_history.average();
                let data = self.brightness_calibrator.get_brightness(difference);

                self.run_pipeline(data, true, now);
                self.last_beat = now;
            }
            BeatSignal::NoBeat { .. } => {
                let data = self.brightness_calibrator.get_lowest_brightness_data();
                self.run_pipeline(data, false, now);
            }
            BeatSignal::Silence => {
                let data = self.brightness_calibrator.get_lowest_brightness_data();
                self.run_pipeline(data, false, now);
                self.amplitude_history.clear();
                self.brightness_calibrator.clear_history();
                self.transition_calibrator.clear_history();
            }
        }
    }

    /// Wind down after the amplitude source stopped: one lowest-brightness
    /// tick deactivates any effect with running timers, then every light is
    /// restored to its stored pre-session state.
    pub fn reader_stopped(&mut self, status: StopStatus, now: Instant) {
        log::info!("[Visualizer] Audio reader stopped ({:?})", status);
        let data = self.brightness_calibrator.get_lowest_brightness_data();
        self.run_pipeline(data, false, now);

        for light in &self.lights {
            light.restore_state();
        }
    }

    fn run_pipeline(&mut self, data: BrightnessData, received_beat: bool, now: Instant) {
        let mut shuffled = self.lights.clone();
        shuffled.shuffle(&mut self.rng);

        let time_since_last_beat = now.saturating_duration_since(self.last_beat);
        let transition_time = self
            .transition_calibrator
            .get_transition_time(time_since_last_beat.as_millis() as u64);

        let update = LightUpdate::new(
            &self.config,
            shuffled,
            Arc::clone(&self.color_set),
            data,
            time_since_last_beat,
            transition_time,
            now,
            &mut self.rng,
        );

        for (id, effect) in self.effects.iter_mut().enumerate() {
            let result = if received_beat {
                effect.beat_received(id, &update)
            } else {
                effect.no_beat_received(id, &update)
            };

            if let Err(err) = result {
                // skip this tick's flush, the session continues
                log::error!(
                    "[Visualizer] Effect {} failed, skipping tick: {}",
                    effect.name(),
                    err
                );
                return;
            }
        }

        update.execute();
    }
}

/// Spawn the session task consuming tick messages in order. Dropping the
/// sender or a `ReaderStopped` message ends the task; the returned receiver
/// fires once the task has processed its final message.
pub fn spawn_session(
    mut visualizer: Visualizer,
    orchestrator: &TaskOrchestrator,
) -> Result<
    (
        mpsc::UnboundedSender<VisualizerMessage>,
        oneshot::Receiver<()>,
    ),
    OrchestratorError,
> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (finished_tx, finished_rx) = oneshot::channel();
    orchestrator.dispatch(async move {
        while let Some(message) = rx.recv().await {
            let now = Instant::now();
            match message {
                VisualizerMessage::Signal(signal) => visualizer.handle_signal(signal, now),
                VisualizerMessage::ReaderStopped(status) => {
                    visualizer.reader_stopped(status, now);
                    break;
                }
            }
        }
        let _ = finished_tx.send(());
    })?;
    Ok((tx, finished_rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use futures::future::BoxFuture;
    use tokio::runtime::Handle;

    use crate::bridge::{BridgeClient, LightId, LightState, UpdateQueue};
    use crate::config::SessionConfig;
    use crate::error::BridgeError;
    use crate::visualizer::effect::{GateAction, ThresholdGate};

    struct RecordingBridge {
        connected: AtomicBool,
        writes: Mutex<Vec<(LightId, LightState)>>,
    }

    impl RecordingBridge {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(true),
                writes: Mutex::new(Vec::new()),
            })
        }
    }

    impl BridgeClient for RecordingBridge {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn write_state(
            &self,
            light: &LightId,
            state: &LightState,
        ) -> BoxFuture<'static, Result<(), BridgeError>> {
            self.writes.lock().unwrap().push((light.clone(), state.clone()));
            Box::pin(async { Ok(()) })
        }
    }

    fn setup(
        light_count: usize,
    ) -> (
        ConfigHandle,
        Arc<TaskOrchestrator>,
        Vec<Arc<Light>>,
        Arc<RecordingBridge>,
    ) {
        let config = SessionConfig::default().into_handle();
        let orchestrator = Arc::new(TaskOrchestrator::new(Handle::current()));
        let bridge = RecordingBridge::new();
        let queue = UpdateQueue::new(Arc::clone(&orchestrator), bridge.clone());
        let lights = (0..light_count)
            .map(|i| {
                Light::new(
                    LightId::new(format!("L{}", i)),
                    Arc::clone(&queue),
                    Arc::clone(&orchestrator),
                    true,
                )
            })
            .collect();
        (config, orchestrator, lights, bridge)
    }

    fn make_update(
        config: &ConfigHandle,
        lights: &[Arc<Light>],
        percentage: f64,
        change: bool,
        now: Instant,
    ) -> LightUpdate {
        let data = BrightnessData {
            brightness_percentage: percentage,
            brightness_change: change,
            brightness: (percentage * 254.0) as u8,
            brightness_fade: (percentage * 200.0) as u8,
        };
        let mut rng = SmallRng::seed_from_u64(42);
        LightUpdate::new(
            config,
            lights.to_vec(),
            Arc::new(SessionColorSet::from_config(Arc::clone(config))),
            data,
            Duration::from_millis(500),
            2,
            now,
            &mut rng,
        )
    }

    #[tokio::test]
    async fn test_beat_ticks_produce_bridge_writes() {
        let (config, orchestrator, lights, bridge) = setup(2);
        let mut visualizer =
            Visualizer::new(config, orchestrator, lights, Instant::now());

        let mut now = Instant::now();
        for _ in 0..5 {
            now += Duration::from_millis(400);
            visualizer.handle_signal(
                BeatSignal::Beat {
                    amplitude: 0.8,
                    average: 0.3,
                },
                now,
            );
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!bridge.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reader_stopped_restores_stored_state() {
        let (config, orchestrator, lights, bridge) = setup(1);
        let mut visualizer = Visualizer::new(
            config,
            orchestrator,
            lights.clone(),
            Instant::now(),
        );

        let now = Instant::now() + Duration::from_millis(400);
        visualizer.handle_signal(
            BeatSignal::Beat {
                amplitude: 0.9,
                average: 0.2,
            },
            now,
        );
        visualizer.reader_stopped(StopStatus::Requested, now + Duration::from_millis(400));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let writes = bridge.writes.lock().unwrap();
        let restore = &writes.last().unwrap().1;
        assert_eq!(restore.on, Some(true));
        assert_eq!(restore.transition_time, Some(1));
    }

    #[tokio::test]
    async fn test_threshold_effect_releases_reservations_on_deactivation() {
        let (config, _orchestrator, lights, _bridge) = setup(3);
        let now = Instant::now();

        // probability 1.0 makes activation deterministic
        let mut effect = ColorFadeEffect::new(0.6, 1.0);
        let update = make_update(&config, &lights, 1.0, true, now);
        effect.beat_received(7, &update).unwrap();

        // reservations held while active
        for light in &lights {
            assert!(!light.claim_color(1));
        }

        let update = make_update(&config, &lights, 1.0, true, now);
        effect.no_beat_received(7, &update).unwrap();

        // released after deactivation, another effect can claim
        for light in &lights {
            assert!(light.claim_color(1));
        }
    }

    #[tokio::test]
    async fn test_threshold_gate_rate_limit_and_reactivation() {
        let (config, _orchestrator, lights, _bridge) = setup(1);
        let now = Instant::now();

        let mut gate = ThresholdGate::new("TestGate", 0.6, 1.0);
        let mut rng = SmallRng::seed_from_u64(1);

        let update = make_update(&config, &lights, 1.0, true, now);
        assert_eq!(gate.on_beat(&update, &mut rng), GateAction::Activate);
        assert_eq!(gate.on_beat(&update, &mut rng), GateAction::Run);

        // dropping below the threshold deactivates and arms the rate limit
        let low = make_update(&config, &lights, 0.1, true, now);
        assert_eq!(gate.on_beat(&low, &mut rng), GateAction::Deactivate);

        let update = make_update(&config, &lights, 1.0, true, now);
        assert_eq!(gate.on_beat(&update, &mut rng), GateAction::Skip);

        // after the 20 s window the gate activates again
        let later = now + Duration::from_secs(21);
        let update = make_update(&config, &lights, 1.0, true, later);
        assert_eq!(gate.on_beat(&update, &mut rng), GateAction::Activate);
    }
}
