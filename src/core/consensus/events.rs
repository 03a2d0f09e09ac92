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

//! Engine events and subscriber sinks.

use crate::core::types::{FailureReason, TaskKind};
use alloy_primitives::{Address, B256};
use serde::Serialize;
use tokio::sync::mpsc;

/// Events emitted by the consensus engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum EngineEvent {
    /// A task was created and is accepting responses.
    TaskCreated {
        /// Task id.
        task_id: u64,
        /// Task kind.
        kind: TaskKind,
        /// Absolute deadline in ms.
        deadline_ms: u64,
    },
    /// A response passed all ingestion checks and was stored.
    ResponseAccepted {
        /// Task id.
        task_id: u64,
        /// Responding operator.
        operator: Address,
        /// Weight captured at reception.
        weight: f64,
    },
    /// A response group crossed the quorum threshold.
    QuorumReached {
        /// Task id.
        task_id: u64,
        /// keccak256 of the winning response bytes.
        response_hash: B256,
        /// Summed captured weight of the group.
        group_weight: f64,
    },
    /// The task finished with an agreed response.
    TaskCompleted {
        /// Task id.
        task_id: u64,
        /// keccak256 of the winning response bytes.
        response_hash: B256,
        /// Operators whose responses formed the winning group.
        contributors: Vec<Address>,
        /// Summed captured weight of the group.
        group_weight: f64,
    },
    /// The task finished without an agreed response.
    TaskFailed {
        /// Task id.
        task_id: u64,
        /// Why it failed.
        reason: FailureReason,
        /// Responses stored at failure time.
        response_count: usize,
    },
    /// An operator joined the registry.
    OperatorAdded {
        /// Operator address.
        operator: Address,
        /// Derived weight at registration.
        weight: f64,
    },
    /// An operator was removed explicitly.
    OperatorRemoved {
        /// Operator address.
        operator: Address,
    },
    /// An operator's health flag flipped.
    HealthChanged {
        /// Operator address.
        operator: Address,
        /// New health value.
        is_healthy: bool,
    },
    /// Periodic counters from the health sweep.
    MetricsTick {
        /// Tasks currently pending.
        pending_tasks: usize,
        /// Registered operators.
        operators: usize,
        /// Operators currently healthy.
        healthy_operators: usize,
    },
}

/// A pure event sink. Sinks are invoked outside the engine lock and must
/// not block.
pub trait EventSink: Send + Sync {
    /// Observe one event.
    fn on_event(&self, event: &EngineEvent);
}

/// Sink forwarding events into a bounded channel; overflow drops the
/// event.
pub struct ChannelSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelSink {
    /// Wrap a channel sender.
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: &EngineEvent) {
        let _ = self.tx.try_send(event.clone());
    }
}
