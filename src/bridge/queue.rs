//! UpdateQueue - per-light FIFO dispatch of state writes
//!
//! Writes to the same light are strictly serialized; writes to different
//! lights proceed independently, metered only by the orchestrator's write
//! semaphore. Each light with pending work has exactly one drain task alive
//! at a time. On disconnect the affected light's pending entries are purged.
//! `mark_shutdown` stops new per-light queues from forming and resolves the
//! returned signal once every existing queue has fully drained.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::bridge::{BridgeClient, LightId, LightState};
use crate::orchestrator::TaskOrchestrator;

struct QueueInner {
    queues: HashMap<LightId, VecDeque<LightState>>,
    shutdown_marked: bool,
    drained_tx: Option<oneshot::Sender<()>>,
}

impl QueueInner {
    /// Fire the drain signal if shutdown was requested and nothing is left.
    fn maybe_signal_drained(&mut self) {
        if self.shutdown_marked && self.queues.is_empty() {
            if let Some(tx) = self.drained_tx.take() {
                let _ = tx.send(());
            }
        }
    }
}

/// Serializes state writes per light and owns the drain tasks doing them.
pub struct UpdateQueue {
    orchestrator: Arc<TaskOrchestrator>,
    bridge: Arc<dyn BridgeClient>,
    inner: Mutex<QueueInner>,
}

impl UpdateQueue {
    pub fn new(orchestrator: Arc<TaskOrchestrator>, bridge: Arc<dyn BridgeClient>) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            bridge,
            inner: Mutex::new(QueueInner {
                queues: HashMap::new(),
                shutdown_marked: false,
                drained_tx: None,
            }),
        })
    }

    /// Queue one state write for `light`. Spawns a drain task if the light
    /// had no pending work. After `mark_shutdown`, writes for lights without
    /// an existing queue are dropped; appends to still-draining queues are
    /// accepted so in-progress restore sequences can finish.
    pub fn enqueue(self: &Arc<Self>, light: LightId, state: LightState) {
        let spawn_drain = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            match inner.queues.get_mut(&light) {
                Some(queue) => {
                    queue.push_back(state);
                    false
                }
                None => {
                    if inner.shutdown_marked {
                        log::debug!(
                            "[Queue] Dropped update for light {} during shutdown",
                            light
                        );
                        return;
                    }
                    inner
                        .queues
                        .insert(light.clone(), VecDeque::from([state]));
                    true
                }
            }
        };

        if spawn_drain {
            let queue = Arc::clone(self);
            let drain_light = light.clone();
            if self
                .orchestrator
                .dispatch(async move {
                    queue.drain(drain_light).await;
                })
                .is_err()
            {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                inner.queues.remove(&light);
                inner.maybe_signal_drained();
                log::debug!(
                    "[Queue] Orchestrator refused drain task for light {}",
                    light
                );
            }
        }
    }

    /// Stop accepting work for new lights. The returned signal resolves once
    /// every queue has drained; immediately if nothing is pending.
    pub fn mark_shutdown(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.shutdown_marked = true;
        inner.drained_tx = Some(tx);
        inner.maybe_signal_drained();
        rx
    }

    /// Number of pending writes across all lights.
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.queues.values().map(VecDeque::len).sum()
    }

    async fn drain(self: Arc<Self>, light: LightId) {
        enum Step {
            Write(LightState),
            Purged(usize),
            Done,
        }

        loop {
            let step = {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if !self.bridge.is_connected() {
                    let dropped = inner.queues.remove(&light).map_or(0, |q| q.len());
                    inner.maybe_signal_drained();
                    Step::Purged(dropped)
                } else {
                    match inner.queues.get(&light).and_then(|q| q.front().cloned()) {
                        Some(state) => Step::Write(state),
                        None => {
                            inner.queues.remove(&light);
                            inner.maybe_signal_drained();
                            Step::Done
                        }
                    }
                }
            };

            match step {
                Step::Write(state) => {
                    // permit holds a write slot; None only if the semaphore
                    // was closed, which never happens in practice
                    let permit = self.orchestrator.bridge_permits().acquire_owned().await.ok();
                    if let Err(err) = self.bridge.write_state(&light, &state).await {
                        log::warn!("[Queue] Write to light {} failed: {}", light, err);
                    }
                    drop(permit);

                    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(queue) = inner.queues.get_mut(&light) {
                        queue.pop_front();
                    }
                }
                Step::Purged(dropped) => {
                    log::warn!(
                        "[Queue] Purged {} pending updates for light {}, bridge disconnected",
                        dropped,
                        light
                    );
                    return;
                }
                Step::Done => return,
            }
        }
    }
}
