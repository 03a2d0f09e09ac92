// Copyright (c) 2026 Credence
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Async consensus service.
//!
//! Wraps the synchronous engine behind a mutex so that concurrent
//! producers observe a linearizable per-task history. Each pending task
//! carries one cancellable deadline timer; periodic sweeps finalize
//! overdue tasks (forward clock-jump safety), re-derive operator health
//! and garbage-collect stale buffers. Events are dispatched outside the
//! engine lock to subscriber sinks and a bounded channel.

use crate::core::config::EngineSettings;
use crate::core::consensus::engine::{CancelOutcome, ConsensusEngine, EngineError};
use crate::core::consensus::events::{EngineEvent, EventSink};
use crate::core::types::{OperatorRecord, RecoverableSignature, Task, TaskKind};
use crate::monitoring::metrics::Metrics;
use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Capacity of the event channel handed out at spawn time.
const EVENT_CHANNEL_CAPACITY: usize = 256;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct ServiceInner {
    engine: Mutex<ConsensusEngine>,
    settings: EngineSettings,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
    event_tx: mpsc::Sender<EngineEvent>,
    timers: Mutex<HashMap<u64, JoinHandle<()>>>,
    shutdown: Notify,
    metrics: Arc<Metrics>,
}

impl ServiceInner {
    fn engine(&self) -> MutexGuard<'_, ConsensusEngine> {
        // the engine never partially mutates, so poisoning is recoverable
        self.engine.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn dispatch(&self, events: &[EngineEvent]) {
        if events.is_empty() {
            return;
        }
        let sinks = match self.sinks.read() {
            Ok(s) => s.iter().cloned().collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for event in events {
            self.apply_metrics(event);
            for sink in &sinks {
                sink.on_event(event);
            }
            if self.event_tx.try_send(event.clone()).is_err() {
                self.metrics.events_dropped_total.inc();
            }
        }
    }

    fn apply_metrics(&self, event: &EngineEvent) {
        match event {
            EngineEvent::TaskCreated { .. } => self.metrics.tasks_created_total.inc(),
            EngineEvent::ResponseAccepted { .. } => {
                self.metrics.responses_accepted_total.inc()
            }
            EngineEvent::TaskCompleted { .. } => self.metrics.tasks_completed_total.inc(),
            EngineEvent::TaskFailed { .. } => self.metrics.tasks_failed_total.inc(),
            EngineEvent::MetricsTick {
                pending_tasks,
                operators,
                healthy_operators,
            } => {
                self.metrics.tasks_pending.set(*pending_tasks as i64);
                self.metrics.operators.set(*operators as i64);
                self.metrics.operators_healthy.set(*healthy_operators as i64);
            }
            _ => {}
        }
    }

    fn clear_timer(&self, task_id: u64) {
        if let Ok(mut timers) = self.timers.lock() {
            if let Some(handle) = timers.remove(&task_id) {
                handle.abort();
            }
        }
    }

    /// True when the event batch moved this task into a terminal state.
    fn terminated(events: &[EngineEvent], task_id: u64) -> bool {
        events.iter().any(|e| {
            matches!(e,
                EngineEvent::TaskCompleted { task_id: id, .. }
                | EngineEvent::TaskFailed { task_id: id, .. } if *id == task_id)
        })
    }
}

/// Handle to the consensus service. Cloning is cheap; all clones drive the
/// same engine.
#[derive(Clone)]
pub struct ConsensusService {
    inner: Arc<ServiceInner>,
}

impl ConsensusService {
    /// Spawn the service with its background sweeps.
    ///
    /// Returns the handle, the event receiver and the sweep join handle.
    /// Must be called within a tokio runtime.
    pub fn spawn(
        settings: EngineSettings,
        metrics: Arc<Metrics>,
    ) -> (ConsensusService, mpsc::Receiver<EngineEvent>, JoinHandle<()>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(ServiceInner {
            engine: Mutex::new(ConsensusEngine::new(settings.params())),
            settings: settings.clone(),
            sinks: RwLock::new(Vec::new()),
            event_tx,
            timers: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
            metrics,
        });

        let sweeper = tokio::spawn(run_sweeps(inner.clone()));
        (ConsensusService { inner }, event_rx, sweeper)
    }

    /// Register an additional event sink. Sinks must not block.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        if let Ok(mut sinks) = self.inner.sinks.write() {
            sinks.push(sink);
        }
    }

    /// Create a task and arm its deadline timer.
    pub fn create_task(&self, kind: TaskKind, input: Vec<u8>) -> u64 {
        let now = now_ms();
        let (task_id, events) = {
            let mut engine = self.inner.engine();
            engine.create_task(kind, input, now)
        };
        self.arm_deadline_timer(task_id);
        self.inner.dispatch(&events);
        task_id
    }

    /// Ingest an operator response.
    pub fn submit_response(
        &self,
        task_id: u64,
        operator: Address,
        response: Vec<u8>,
        signature: RecoverableSignature,
    ) -> Result<(), EngineError> {
        let now = now_ms();
        let result = {
            let mut engine = self.inner.engine();
            engine.submit_response(task_id, operator, response, signature, now)
        };
        match result {
            Ok(events) => {
                if ServiceInner::terminated(&events, task_id) {
                    self.inner.clear_timer(task_id);
                }
                self.inner.dispatch(&events);
                Ok(())
            }
            Err(e) => {
                self.inner.metrics.responses_rejected_total.inc();
                Err(e)
            }
        }
    }

    /// Cancel a task; idempotent.
    pub fn cancel_task(&self, task_id: u64) -> CancelOutcome {
        let (outcome, events) = {
            let mut engine = self.inner.engine();
            engine.cancel_task(task_id)
        };
        if outcome == CancelOutcome::Cancelled {
            self.inner.clear_timer(task_id);
        }
        self.inner.dispatch(&events);
        outcome
    }

    /// Register an operator.
    pub fn add_operator(
        &self,
        address: Address,
        stake: u64,
        reputation: f64,
    ) -> Result<(), EngineError> {
        let events = {
            let mut engine = self.inner.engine();
            engine.add_operator(address, stake, reputation, now_ms())?
        };
        self.inner.dispatch(&events);
        Ok(())
    }

    /// Update an operator; returns the recomputed weight.
    pub fn update_operator(
        &self,
        address: &Address,
        stake: Option<u64>,
        reputation: Option<f64>,
    ) -> Result<f64, EngineError> {
        let mut engine = self.inner.engine();
        engine.update_operator(address, stake, reputation)
    }

    /// Remove an operator explicitly.
    pub fn remove_operator(&self, address: &Address) -> Result<(), EngineError> {
        let events = {
            let mut engine = self.inner.engine();
            engine.remove_operator(address)?
        };
        self.inner.dispatch(&events);
        Ok(())
    }

    /// Snapshot of a task.
    pub fn task(&self, task_id: u64) -> Option<Task> {
        self.inner.engine().task(task_id).cloned()
    }

    /// Snapshot of an operator record.
    pub fn operator(&self, address: &Address) -> Option<OperatorRecord> {
        self.inner.engine().operator(address).cloned()
    }

    /// Stop the sweeps and abort all pending deadline timers.
    pub fn shutdown(&self) {
        // notify_one stores a permit, so shutdown mid-tick is not lost
        self.inner.shutdown.notify_one();
        if let Ok(mut timers) = self.inner.timers.lock() {
            for (_, handle) in timers.drain() {
                handle.abort();
            }
        }
        info!("consensus service shut down");
    }

    fn arm_deadline_timer(&self, task_id: u64) {
        let inner = self.inner.clone();
        let timeout = self.inner.settings.response_timeout();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let events = {
                let mut engine = inner.engine();
                engine.finalize_task(task_id, now_ms())
            };
            inner.dispatch(&events);
            if let Ok(mut timers) = inner.timers.lock() {
                timers.remove(&task_id);
            }
        });
        if let Ok(mut timers) = self.inner.timers.lock() {
            timers.insert(task_id, handle);
        }
    }
}

async fn run_sweeps(inner: Arc<ServiceInner>) {
    // the finalize sweep backs up the per-task timers; it also catches
    // deadlines that wall-clock jumps made overdue
    let finalize_period = Duration::from_millis(
        (inner.settings.response_timeout_ms / 4).clamp(50, 1_000),
    );
    let mut finalize_tick = tokio::time::interval(finalize_period);
    let mut health_tick = tokio::time::interval(inner.settings.health_sweep());
    let mut gc_tick = tokio::time::interval(inner.settings.response_timeout());

    loop {
        tokio::select! {
            _ = finalize_tick.tick() => {
                let events = {
                    let mut engine = inner.engine();
                    engine.finalize_due(now_ms())
                };
                for event in &events {
                    if let EngineEvent::TaskCompleted { task_id, .. }
                    | EngineEvent::TaskFailed { task_id, .. } = event
                    {
                        inner.clear_timer(*task_id);
                    }
                }
                inner.dispatch(&events);
            }
            _ = health_tick.tick() => {
                let events = {
                    let mut engine = inner.engine();
                    engine.sweep_health(now_ms(), inner.settings.health_staleness_ms)
                };
                inner.dispatch(&events);
            }
            _ = gc_tick.tick() => {
                let removed = {
                    let mut engine = inner.engine();
                    engine.gc_stale(now_ms())
                };
                if removed > 0 {
                    warn!(removed, "dropped stale task buffers");
                }
            }
            _ = inner.shutdown.notified() => {
                break;
            }
        }
    }
}
