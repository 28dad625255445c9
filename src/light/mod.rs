//! Light - thread-safe attribute holder and flush point
//!
//! A light aggregates its three controllers and a state builder behind one
//! mutex, which is the only cross-thread boundary in the light layer. While
//! a light is off, changes accumulate in a side builder that is copied in
//! atomically when it turns back on, so effects can keep writing without
//! caring about power state.

pub mod controller;
pub mod state_builder;

pub use controller::EffectId;

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::bridge::{LightId, LightState, UpdateQueue};
use crate::color::Color;
use crate::light::controller::{BrightnessController, ColorController, StrobeController};
use crate::light::state_builder::StateBuilder;
use crate::orchestrator::TaskOrchestrator;

struct LightInner {
    color: ColorController,
    brightness: BrightnessController,
    strobe: StrobeController,

    current_builder: StateBuilder,
    builder_when_off: StateBuilder,
    is_on: bool,
    force_on_next_update: bool,

    stored_state: Option<LightState>,
}

impl LightInner {
    /// The builder effect writes land in: the live one while on, the
    /// buffered one while off.
    fn builder(&mut self) -> &mut StateBuilder {
        if self.is_on {
            &mut self.current_builder
        } else {
            &mut self.builder_when_off
        }
    }

    fn set_on(&mut self, on: bool) {
        if self.strobe.is_strobing() {
            self.strobe.cancel_strobe();
        }

        if self.is_on == on {
            return;
        }

        if on {
            let buffered = std::mem::take(&mut self.builder_when_off);
            self.current_builder.copy_from(&buffered);
            self.brightness.force_update();
            self.force_on_next_update = true;
        } else {
            self.builder_when_off = StateBuilder::new();
        }

        self.current_builder.set_on(on);
        self.is_on = on;
    }
}

/// One controllable light. Cheap to clone via `Arc`; all mutation goes
/// through the internal mutex.
pub struct Light {
    id: LightId,
    queue: Arc<UpdateQueue>,
    orchestrator: Arc<TaskOrchestrator>,
    inner: Mutex<LightInner>,
    self_handle: Weak<Light>,
}

impl Light {
    pub fn new(
        id: LightId,
        queue: Arc<UpdateQueue>,
        orchestrator: Arc<TaskOrchestrator>,
        initially_on: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_handle| Self {
            id,
            queue,
            orchestrator,
            inner: Mutex::new(LightInner {
                color: ColorController::default(),
                brightness: BrightnessController::default(),
                strobe: StrobeController::default(),
                current_builder: StateBuilder::new(),
                builder_when_off: StateBuilder::new(),
                is_on: initially_on,
                force_on_next_update: false,
                stored_state: None,
            }),
            self_handle: self_handle.clone(),
        })
    }

    pub fn id(&self) -> &LightId {
        &self.id
    }

    pub fn is_on(&self) -> bool {
        self.lock().is_on
    }

    pub fn set_on(&self, on: bool) {
        self.lock().set_on(on);
    }

    // color

    pub fn claim_color(&self, effect: EffectId) -> bool {
        self.lock().color.reservation.claim(effect)
    }

    pub fn release_color(&self, effect: EffectId) -> bool {
        self.lock().color.reservation.release(effect)
    }

    pub fn can_control_color(&self, effect: EffectId) -> bool {
        self.lock().color.reservation.can_control(effect)
    }

    pub fn set_color(&self, effect: EffectId, color: Color) {
        self.lock().color.set_color(effect, color);
    }

    pub fn set_fade_color(&self, effect: EffectId, fade_color: Color) {
        self.lock().color.set_fade_color(effect, fade_color);
    }

    pub fn undo_color_change(&self, effect: EffectId) {
        self.lock().color.undo_color_change(effect);
    }

    // brightness

    pub fn set_brightness(&self, brightness: u8, fade_brightness: u8) {
        self.lock().brightness.set_brightness(brightness, fade_brightness);
    }

    pub fn set_alert_mode(&self) {
        self.lock().brightness.set_alert_mode();
    }

    pub fn force_brightness_update(&self) {
        self.lock().brightness.force_update();
    }

    pub fn brightness_was_increased(&self) -> bool {
        self.lock().brightness.was_increased()
    }

    // strobe

    pub fn claim_strobe(&self, effect: EffectId) -> bool {
        self.lock().strobe.reservation.claim(effect)
    }

    /// Release the strobe reservation. Any running strobe is interrupted,
    /// and a light left off by it is pended back on.
    pub fn release_strobe(&self, effect: EffectId) -> bool {
        let mut inner = self.lock();
        if !inner.strobe.reservation.release(effect) {
            return false;
        }

        if inner.strobe.cancel_strobe() {
            let flipped = !inner.is_on;
            inner.set_on(flipped);
        }
        if !inner.is_on {
            inner.strobe.request_on(true);
        }
        true
    }

    pub fn can_control_strobe(&self, effect: EffectId) -> bool {
        self.lock().strobe.reservation.can_control(effect)
    }

    /// Mark this light to be strobed on the next flush.
    pub fn do_strobe(&self, effect: EffectId, time_since_last_beat: Duration) {
        let mut inner = self.lock();
        if inner.strobe.is_strobing() && inner.strobe.reservation.can_control(effect) {
            if inner.strobe.cancel_strobe() {
                let flipped = !inner.is_on;
                inner.set_on(flipped);
            }
        }
        inner
            .strobe
            .request_strobe(effect, time_since_last_beat.as_millis() as u64);
    }

    pub fn strobe_set_on(&self, on: bool) {
        self.lock().strobe.request_on(on);
    }

    pub fn is_strobing(&self) -> bool {
        self.lock().strobe.is_strobing()
    }

    // session state snapshots

    /// Snapshot the last known state for restoration after the session.
    pub fn store_state(&self) {
        let mut inner = self.lock();
        let snapshot = LightState {
            on: Some(inner.is_on),
            brightness: inner.brightness.last_set(),
            color: inner.color.last_set(),
            alert: None,
            transition_time: Some(1),
        };
        inner.stored_state = Some(snapshot);
    }

    pub fn restore_state(&self) {
        let stored = self.lock().stored_state.take();
        if let Some(state) = stored {
            self.queue.enqueue(self.id.clone(), state);
        }
    }

    /// Flush this tick's accumulated changes to the update queue. A positive
    /// `transition_time` additionally queues the fade pass.
    pub fn apply_update(&self, transition_time: u16) {
        let mut inner = self.lock();

        // strobe choreography first: pending power changes, then the flip
        if let Some(on) = inner.strobe.take_pending_on() {
            inner.set_on(on);
        }
        if let Some(delay_ms) = inner.strobe.take_pending_delay() {
            let on_after_strobe = inner.is_on;
            inner.set_on(!on_after_strobe);

            let light = self.self_handle.clone();
            let scheduled = self
                .orchestrator
                .schedule(Duration::from_millis(delay_ms), move || {
                    if let Some(light) = light.upgrade() {
                        light.set_on(on_after_strobe);
                        light.apply_update(1);
                    }
                });
            match scheduled {
                Ok(handle) => inner.strobe.set_active(handle),
                Err(err) => log::debug!("[Light {}] Strobe not scheduled: {}", self.id, err),
            }
        }

        let is_on = inner.is_on;
        let LightInner {
            color,
            brightness,
            current_builder,
            builder_when_off,
            force_on_next_update,
            ..
        } = &mut *inner;

        // controller output lands in the buffered side builder while the
        // light is off; the flush itself always inspects the live builder
        if is_on {
            color.apply_updates(current_builder);
        } else {
            color.apply_updates(builder_when_off);
        }

        if !current_builder.is_default() || brightness.was_increased() {
            if is_on {
                brightness.apply_updates(current_builder);
            } else {
                brightness.apply_updates(builder_when_off);
            }
            if let Some(mut state) = current_builder.build() {
                if *force_on_next_update {
                    state.on = Some(true);
                    *force_on_next_update = false;
                }
                self.queue.enqueue(self.id.clone(), state);
            }
        }

        if transition_time > 0 {
            if is_on {
                let mut fade_builder = StateBuilder::with_transition_time(transition_time);
                color.apply_fade_updates(&mut fade_builder);
                brightness.apply_fade_updates(&mut fade_builder);

                if let Some(state) = fade_builder.build() {
                    self.queue.enqueue(self.id.clone(), state);
                }
            } else {
                color.apply_fade_updates(builder_when_off);
                brightness.apply_fade_updates(builder_when_off);
            }
        }

        *current_builder = StateBuilder::new();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LightInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PartialEq for Light {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use futures::future::BoxFuture;
    use tokio::runtime::Handle;

    use crate::bridge::BridgeClient;
    use crate::error::BridgeError;

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

        fn written(&self) -> Vec<(LightId, LightState)> {
            self.writes.lock().unwrap().clone()
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

    fn setup() -> (Arc<Light>, Arc<RecordingBridge>) {
        let orchestrator = Arc::new(TaskOrchestrator::new(Handle::current()));
        let bridge = RecordingBridge::new();
        let queue = UpdateQueue::new(Arc::clone(&orchestrator), bridge.clone());
        let light = Light::new(LightId::new("L1"), queue, orchestrator, true);
        (light, bridge)
    }

    #[tokio::test]
    async fn test_flush_sends_beat_then_fade() {
        let (light, bridge) = setup();

        light.set_brightness(200, 120);
        light.set_color(0, Color::from_rgb(0xFF0000));
        light.set_fade_color(0, Color::from_rgb(0x0000FF));
        light.apply_update(4);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let written = bridge.written();
        assert_eq!(written.len(), 2);

        let beat = &written[0].1;
        assert_eq!(beat.brightness, Some(200));
        assert_eq!(beat.color, Some(Color::from_rgb(0xFF0000)));
        assert_eq!(beat.transition_time, Some(0));

        let fade = &written[1].1;
        assert_eq!(fade.brightness, Some(120));
        assert_eq!(fade.color, Some(Color::from_rgb(0x0000FF)));
        assert_eq!(fade.transition_time, Some(4));
    }

    #[tokio::test]
    async fn test_empty_tick_sends_nothing() {
        let (light, bridge) = setup();
        light.apply_update(4);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(bridge.written().is_empty());
    }

    #[tokio::test]
    async fn test_changes_while_off_are_buffered_until_turn_on() {
        let (light, bridge) = setup();
        light.set_on(false);
        light.apply_update(0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let writes_after_off = bridge.written().len();

        // while off, color changes accumulate in the side builder
        light.set_color(0, Color::from_rgb(0x00FF00));
        light.apply_update(0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(bridge.written().len(), writes_after_off);

        light.set_on(true);
        light.apply_update(0);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let written = bridge.written();
        let last = &written.last().unwrap().1;
        assert_eq!(last.on, Some(true));
        assert_eq!(last.color, Some(Color::from_rgb(0x00FF00)));
    }

    #[tokio::test]
    async fn test_strobe_flips_then_restores() {
        let (light, bridge) = setup();
        assert!(light.claim_strobe(3));

        light.do_strobe(3, Duration::from_millis(300));
        light.apply_update(0);
        assert!(!light.is_on());
        assert!(light.is_strobing());

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(light.is_on());
        assert!(!light.is_strobing());

        let on_writes: Vec<Option<bool>> =
            bridge.written().iter().map(|(_, s)| s.on).collect();
        assert!(on_writes.contains(&Some(false)));
        assert!(on_writes.contains(&Some(true)));
    }

    #[tokio::test]
    async fn test_release_strobe_restores_power() {
        let (light, _bridge) = setup();
        assert!(light.claim_strobe(3));

        light.do_strobe(3, Duration::from_millis(10000));
        light.apply_update(0);
        assert!(!light.is_on());

        // releasing mid-strobe interrupts it and pends the light back on
        assert!(light.release_strobe(3));
        light.apply_update(0);
        assert!(light.is_on());
    }

    #[tokio::test]
    async fn test_store_and_restore_state() {
        let (light, bridge) = setup();

        light.set_brightness(180, 90);
        light.apply_update(0);
        tokio::time::sleep(Duration::from_millis(30)).await;

        light.store_state();
        light.set_brightness(254, 10);
        light.apply_update(0);
        light.restore_state();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let written = bridge.written();
        let restored = &written.last().unwrap().1;
        assert_eq!(restored.brightness, Some(180));
        assert_eq!(restored.on, Some(true));
    }
}
