//! Session engine - amplitude intake to light updates
//!
//! One [`Engine`] instance is one capture session. It wires the amplitude
//! intake to the beat interpreter, forwards the resulting signals to the
//! visualizer task and broadcasts them to any subscribed observers, then
//! tears everything down in order on stop.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::audio::{BeatInterpreter, BeatSignal, StopStatus, AMPLITUDE_FLOOR};
use crate::bridge::{BridgeClient, LightId, UpdateQueue};
use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::light::Light;
use crate::orchestrator::TaskOrchestrator;
use crate::visualizer::{spawn_session, Visualizer, VisualizerMessage};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Session events mirrored to GUI and telemetry subscribers. Slow
/// subscribers lag and lose events; the session itself is never blocked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    Beat { amplitude: f64, average: f64 },
    NoBeat { average: f64 },
    Silence,
    ReaderStopped(StopStatus),
}

impl EngineEvent {
    fn from_signal(signal: &BeatSignal) -> Self {
        match *signal {
            BeatSignal::Beat { amplitude, average } => EngineEvent::Beat { amplitude, average },
            BeatSignal::NoBeat { average } => EngineEvent::NoBeat { average },
            BeatSignal::Silence => EngineEvent::Silence,
        }
    }
}

/// One audio-reactive lighting session.
///
/// Construction is fail-fast: the configuration is validated and the bridge
/// connection checked before any task is spawned. `on_sample` is a cheap
/// synchronous call intended to be invoked from the capture callback.
pub struct Engine {
    orchestrator: Arc<TaskOrchestrator>,
    queue: Arc<UpdateQueue>,
    interpreter: Mutex<BeatInterpreter>,
    session_tx: mpsc::UnboundedSender<VisualizerMessage>,
    session_finished: oneshot::Receiver<()>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Start a session over `lights` (id plus current on state).
    /// `updates_per_second` is the expected amplitude sample rate and sizes
    /// the interpreter's rolling average window.
    pub fn start(
        config: SessionConfig,
        runtime: Handle,
        bridge: Arc<dyn BridgeClient>,
        lights: Vec<(LightId, bool)>,
        updates_per_second: u32,
        now: Instant,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if !bridge.is_connected() {
            return Err(EngineError::BridgeUnavailable);
        }

        let config = config.into_handle();
        let orchestrator = Arc::new(TaskOrchestrator::new(runtime));
        let queue = UpdateQueue::new(Arc::clone(&orchestrator), bridge);

        let lights: Vec<Arc<Light>> = lights
            .into_iter()
            .map(|(id, on)| Light::new(id, Arc::clone(&queue), Arc::clone(&orchestrator), on))
            .collect();
        log::info!("[Engine] Session started with {} lights", lights.len());

        let visualizer = Visualizer::new(
            Arc::clone(&config),
            Arc::clone(&orchestrator),
            lights,
            now,
        );
        let (session_tx, session_finished) = spawn_session(visualizer, &orchestrator)?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            orchestrator,
            queue,
            interpreter: Mutex::new(BeatInterpreter::new(config, updates_per_second, now)),
            session_tx,
            session_finished,
            events,
        })
    }

    /// Feed one RMS amplitude sample. Values below the floor count as
    /// silence. At most one signal per sample reaches the visualizer.
    pub fn on_sample(&self, amplitude: f64, now: Instant) {
        let amplitude = if amplitude < AMPLITUDE_FLOOR { 0.0 } else { amplitude };

        let signal = {
            let mut interpreter = self.interpreter.lock().unwrap_or_else(|e| e.into_inner());
            interpreter.interpret(amplitude, now)
        };

        if let Some(signal) = signal {
            let _ = self.events.send(EngineEvent::from_signal(&signal));
            if self.session_tx.send(VisualizerMessage::Signal(signal)).is_err() {
                log::debug!("[Engine] Session task gone, dropping signal");
            }
        }
    }

    /// Subscribe to the session's event broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Number of light state writes still waiting in the update queue.
    pub fn pending_updates(&self) -> usize {
        self.queue.pending()
    }

    /// Stop the session in order: the visualizer restores every light's
    /// stored state, the update queue drains its remaining writes, then the
    /// orchestrator waits up to `grace` for in-flight bridge writes.
    pub async fn stop(self, status: StopStatus, grace: Duration) {
        log::info!("[Engine] Stopping session ({:?})", status);
        let _ = self.events.send(EngineEvent::ReaderStopped(status));

        if self
            .session_tx
            .send(VisualizerMessage::ReaderStopped(status))
            .is_ok()
        {
            let _ = self.session_finished.await;
        }

        let drained = self.queue.mark_shutdown();
        let _ = drained.await;

        self.orchestrator.shutdown(grace).await;
        log::info!("[Engine] Session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::future::BoxFuture;

    use crate::bridge::LightState;
    use crate::error::{BridgeError, ConfigError};

    struct RecordingBridge {
        connected: AtomicBool,
        writes: Mutex<Vec<(LightId, LightState)>>,
    }

    impl RecordingBridge {
        fn new(connected: bool) -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(connected),
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

    fn start_engine(bridge: Arc<RecordingBridge>) -> Engine {
        Engine::start(
            SessionConfig::default(),
            Handle::current(),
            bridge,
            vec![
                (LightId::new("L0"), true),
                (LightId::new("L1"), true),
            ],
            30,
            Instant::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let mut config = SessionConfig::default();
        config.beat.sensitivity = 12;

        let result = Engine::start(
            config,
            Handle::current(),
            RecordingBridge::new(true),
            vec![(LightId::new("L0"), true)],
            30,
            Instant::now(),
        );
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::OutOfRange { .. }))
        ));
    }

    #[tokio::test]
    async fn test_start_requires_connected_bridge() {
        let result = Engine::start(
            SessionConfig::default(),
            Handle::current(),
            RecordingBridge::new(false),
            vec![(LightId::new("L0"), true)],
            30,
            Instant::now(),
        );
        assert!(matches!(result, Err(EngineError::BridgeUnavailable)));
    }

    #[tokio::test]
    async fn test_beats_reach_subscribers_and_bridge() {
        let bridge = RecordingBridge::new(true);
        let engine = start_engine(Arc::clone(&bridge));
        let mut events = engine.subscribe();

        let start = Instant::now();
        let mut now = start;
        for _ in 0..40 {
            now += Duration::from_millis(33);
            engine.on_sample(0.1, now);
        }
        engine.on_sample(0.9, now + Duration::from_millis(33));

        let event = events.try_recv().unwrap();
        assert!(matches!(event, EngineEvent::Beat { amplitude, .. } if amplitude == 0.9));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!bridge.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_floor_clamps_to_silence() {
        let bridge = RecordingBridge::new(true);
        let engine = start_engine(bridge);
        let mut events = engine.subscribe();

        let start = Instant::now();
        let mut now = start;
        for _ in 0..40 {
            now += Duration::from_millis(33);
            engine.on_sample(0.1, now);
        }

        // Sub-floor samples count as zero and eventually produce Silence
        for _ in 0..40 {
            now += Duration::from_millis(33);
            engine.on_sample(0.004, now);
        }

        let mut saw_silence = false;
        while let Ok(event) = events.try_recv() {
            if event == EngineEvent::Silence {
                saw_silence = true;
            }
        }
        assert!(saw_silence);
    }

    #[tokio::test]
    async fn test_stop_drains_queue_and_broadcasts() {
        let bridge = RecordingBridge::new(true);
        let engine = start_engine(Arc::clone(&bridge));
        let mut events = engine.subscribe();

        let start = Instant::now();
        let mut now = start;
        for _ in 0..40 {
            now += Duration::from_millis(33);
            engine.on_sample(0.1, now);
        }
        engine.on_sample(0.9, now + Duration::from_millis(33));

        engine.stop(StopStatus::Requested, Duration::from_secs(1)).await;

        let mut saw_stop = false;
        while let Ok(event) = events.try_recv() {
            if event == EngineEvent::ReaderStopped(StopStatus::Requested) {
                saw_stop = true;
            }
        }
        assert!(saw_stop);

        // Restore writes land before stop returns
        let writes = bridge.writes.lock().unwrap();
        let restore = &writes.last().unwrap().1;
        assert_eq!(restore.transition_time, Some(1));
    }
}
