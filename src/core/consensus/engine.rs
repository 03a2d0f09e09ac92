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

//! Synchronous consensus state machine.
//!
//! Tasks move `Pending -> Completed` when a response group's captured
//! weight reaches the quorum share of the registry's total weight, or
//! `Pending -> Failed` on deadline or cancellation. Terminal states are
//! immutable; late responses mutate nothing and emit nothing.
//!
//! Time enters only through explicit `now_ms` arguments, so every path is
//! deterministic under test; the async service supplies wall-clock time.

use crate::core::consensus::events::EngineEvent;
use crate::core::consensus::operators::{OperatorError, OperatorSet};
use crate::core::consensus::signing::verify_response;
use crate::core::types::{
    FailureReason, OperatorRecord, RecoverableSignature, Task, TaskKind, TaskResponse, TaskState,
};
use alloy_primitives::{keccak256, Address, B256};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// Engine tuning parameters.
#[derive(Clone, Copy, Debug)]
pub struct EngineParams {
    /// Required share of total weight, in (0.5, 1].
    pub quorum_threshold: f64,
    /// Response window per task, in milliseconds.
    pub response_timeout_ms: u64,
    /// Stake mapping to a full stake share.
    pub reference_stake: u64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            quorum_threshold: 2.0 / 3.0,
            response_timeout_ms: 30_000,
            reference_stake: 100,
        }
    }
}

/// Ingestion and lifecycle errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Responding address is not registered.
    #[error("unknown operator")]
    UnknownOperator,
    /// The operator already responded to this task.
    #[error("duplicate response")]
    DuplicateResponse,
    /// The signature does not recover to the claimed operator.
    #[error("bad signature")]
    BadSignature,
    /// The task does not exist or already terminated.
    #[error("task not pending")]
    TaskNotPending,
    /// The task's response window elapsed.
    #[error("task deadline elapsed")]
    TaskExpired,
    /// Operator registry mutation failed.
    #[error("operator registry: {0}")]
    Operator(#[from] OperatorError),
}

/// Result of a cancellation request. Cancelling is idempotent; hitting a
/// terminal or unknown task is a status, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was pending and is now failed with reason `Cancelled`.
    Cancelled,
    /// The task had already terminated.
    AlreadyTerminal,
    /// No task with this id exists.
    NotFound,
}

struct TaskEntry {
    task: Task,
    responses: Vec<TaskResponse>,
    responded: BTreeSet<Address>,
}

#[derive(Clone, Debug)]
struct Winner {
    hash: B256,
    response: Vec<u8>,
    weight: f64,
    last_seq: u64,
    contributors: Vec<Address>,
}

/// The consensus engine: task table, response buckets and operator
/// registry. One logical owner mutates it; see the service wrapper for
/// the concurrent surface.
pub struct ConsensusEngine {
    params: EngineParams,
    operators: OperatorSet,
    tasks: BTreeMap<u64, TaskEntry>,
    next_task_id: u64,
    next_seq: u64,
}

impl ConsensusEngine {
    /// Create an empty engine.
    pub fn new(params: EngineParams) -> Self {
        let operators = OperatorSet::new(params.reference_stake);
        Self {
            params,
            operators,
            tasks: BTreeMap::new(),
            next_task_id: 1,
            next_seq: 0,
        }
    }

    /// Engine parameters.
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Operator registry (read only).
    pub fn operators(&self) -> &OperatorSet {
        &self.operators
    }

    /// Look up a task.
    pub fn task(&self, task_id: u64) -> Option<&Task> {
        self.tasks.get(&task_id).map(|e| &e.task)
    }

    /// Stored responses for a task, in arrival order.
    pub fn responses(&self, task_id: u64) -> Option<&[TaskResponse]> {
        self.tasks.get(&task_id).map(|e| e.responses.as_slice())
    }

    /// Number of pending tasks.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.values().filter(|e| !e.task.is_terminal()).count()
    }

    /// Register an operator.
    pub fn add_operator(
        &mut self,
        address: Address,
        stake: u64,
        reputation: f64,
        now_ms: u64,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let weight = self.operators.add(address, stake, reputation, now_ms)?;
        Ok(vec![EngineEvent::OperatorAdded {
            operator: address,
            weight,
        }])
    }

    /// Update an operator's stake and/or reputation; returns the new
    /// weight. Weights captured by past responses are unaffected.
    pub fn update_operator(
        &mut self,
        address: &Address,
        stake: Option<u64>,
        reputation: Option<f64>,
    ) -> Result<f64, EngineError> {
        Ok(self.operators.update(address, stake, reputation)?)
    }

    /// Remove an operator explicitly.
    pub fn remove_operator(
        &mut self,
        address: &Address,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let record = self.operators.remove(address)?;
        Ok(vec![EngineEvent::OperatorRemoved {
            operator: record.address,
        }])
    }

    /// Look up an operator record.
    pub fn operator(&self, address: &Address) -> Option<&OperatorRecord> {
        self.operators.get(address)
    }

    /// Create a task; returns its id and the creation event.
    pub fn create_task(
        &mut self,
        kind: TaskKind,
        input: Vec<u8>,
        now_ms: u64,
    ) -> (u64, Vec<EngineEvent>) {
        let id = self.next_task_id;
        self.next_task_id += 1;
        let deadline_ms = now_ms.saturating_add(self.params.response_timeout_ms);
        self.tasks.insert(
            id,
            TaskEntry {
                task: Task {
                    id,
                    kind,
                    input,
                    created_at_ms: now_ms,
                    deadline_ms,
                    state: TaskState::Pending,
                    resolved_response: None,
                    quorum_weight: None,
                    failure_reason: None,
                },
                responses: Vec::new(),
                responded: BTreeSet::new(),
            },
        );
        (
            id,
            vec![EngineEvent::TaskCreated {
                task_id: id,
                kind,
                deadline_ms,
            }],
        )
    }

    /// Ingest one operator response.
    ///
    /// On success the response is stored with the operator's current
    /// weight, the operator's `last_seen` advances, and quorum is
    /// re-evaluated. Responses to terminal tasks are dropped without
    /// events or state changes.
    pub fn submit_response(
        &mut self,
        task_id: u64,
        operator: Address,
        response: Vec<u8>,
        signature: RecoverableSignature,
        now_ms: u64,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        {
            let entry = self.tasks.get(&task_id).ok_or(EngineError::TaskNotPending)?;
            if entry.task.is_terminal() {
                return Err(EngineError::TaskNotPending);
            }
            if now_ms > entry.task.deadline_ms {
                return Err(EngineError::TaskExpired);
            }
            if entry.responded.contains(&operator) {
                return Err(EngineError::DuplicateResponse);
            }
        }
        let weight = self
            .operators
            .get(&operator)
            .ok_or(EngineError::UnknownOperator)?
            .weight;
        verify_response(task_id, &response, &signature, operator)
            .map_err(|_| EngineError::BadSignature)?;

        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = self.tasks.get_mut(&task_id).ok_or(EngineError::TaskNotPending)?;
        entry.responses.push(TaskResponse {
            task_id,
            operator,
            response,
            signature,
            received_at_ms: now_ms,
            seq,
            weight_at_time: weight,
        });
        entry.responded.insert(operator);
        self.operators.touch(&operator, now_ms);

        let mut events = vec![EngineEvent::ResponseAccepted {
            task_id,
            operator,
            weight,
        }];

        if let Some(entry) = self.tasks.get(&task_id) {
            if let Some(winner) =
                evaluate_quorum(self.params.quorum_threshold, entry, &self.operators)
            {
                self.complete_task(task_id, winner, &mut events);
            }
        }
        Ok(events)
    }

    /// Finalize one task if its deadline has passed: one last quorum
    /// evaluation, then completion or failure.
    pub fn finalize_task(&mut self, task_id: u64, now_ms: u64) -> Vec<EngineEvent> {
        let Some(entry) = self.tasks.get(&task_id) else {
            return Vec::new();
        };
        if entry.task.is_terminal() || now_ms < entry.task.deadline_ms {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(winner) =
            evaluate_quorum(self.params.quorum_threshold, entry, &self.operators)
        {
            self.complete_task(task_id, winner, &mut events);
            return events;
        }

        let reason = if entry.responses.is_empty() {
            FailureReason::NoResponses
        } else {
            FailureReason::InsufficientQuorum
        };
        self.fail_task(task_id, reason, true, &mut events);
        events
    }

    /// Finalize every overdue pending task. Also covers forward clock
    /// jumps between per-task timers.
    pub fn finalize_due(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        let due: Vec<u64> = self
            .tasks
            .values()
            .filter(|e| !e.task.is_terminal() && now_ms >= e.task.deadline_ms)
            .map(|e| e.task.id)
            .collect();
        let mut events = Vec::new();
        for id in due {
            events.extend(self.finalize_task(id, now_ms));
        }
        events
    }

    /// Cancel a pending task. Idempotent; see [`CancelOutcome`].
    pub fn cancel_task(&mut self, task_id: u64) -> (CancelOutcome, Vec<EngineEvent>) {
        match self.tasks.get(&task_id) {
            None => (CancelOutcome::NotFound, Vec::new()),
            Some(entry) if entry.task.is_terminal() => {
                (CancelOutcome::AlreadyTerminal, Vec::new())
            }
            Some(_) => {
                let mut events = Vec::new();
                // cancellation leaves responder counters untouched
                self.fail_task(task_id, FailureReason::Cancelled, false, &mut events);
                (CancelOutcome::Cancelled, events)
            }
        }
    }

    /// Re-derive operator health; emits a change event per flip and a
    /// trailing metrics tick.
    pub fn sweep_health(&mut self, now_ms: u64, staleness_ms: u64) -> Vec<EngineEvent> {
        let mut events: Vec<EngineEvent> = self
            .operators
            .sweep_health(now_ms, staleness_ms)
            .into_iter()
            .map(|(operator, is_healthy)| EngineEvent::HealthChanged {
                operator,
                is_healthy,
            })
            .collect();
        events.push(EngineEvent::MetricsTick {
            pending_tasks: self.pending_tasks(),
            operators: self.operators.len(),
            healthy_operators: self.operators.healthy_len(),
        });
        events
    }

    /// Drop terminal tasks that never received a response once they are
    /// older than twice the response window. Returns the number removed.
    pub fn gc_stale(&mut self, now_ms: u64) -> usize {
        let cutoff = 2 * self.params.response_timeout_ms;
        let stale: Vec<u64> = self
            .tasks
            .values()
            .filter(|e| {
                e.task.is_terminal()
                    && e.responses.is_empty()
                    && now_ms.saturating_sub(e.task.created_at_ms) >= cutoff
            })
            .map(|e| e.task.id)
            .collect();
        let removed = stale.len();
        for id in stale {
            self.tasks.remove(&id);
        }
        if removed > 0 {
            debug!(removed, "garbage-collected stale task buffers");
        }
        removed
    }

    fn complete_task(&mut self, task_id: u64, winner: Winner, events: &mut Vec<EngineEvent>) {
        let outcomes: Vec<(Address, bool)> = match self.tasks.get_mut(&task_id) {
            Some(entry) => {
                entry.task.state = TaskState::Completed;
                entry.task.resolved_response = Some(winner.response.clone());
                entry.task.quorum_weight = Some(winner.weight);
                entry
                    .responses
                    .iter()
                    .map(|r| (r.operator, keccak256(&r.response) == winner.hash))
                    .collect()
            }
            None => return,
        };
        for (operator, won) in outcomes {
            self.operators.record_outcome(&operator, won);
        }
        events.push(EngineEvent::QuorumReached {
            task_id,
            response_hash: winner.hash,
            group_weight: winner.weight,
        });
        events.push(EngineEvent::TaskCompleted {
            task_id,
            response_hash: winner.hash,
            contributors: winner.contributors,
            group_weight: winner.weight,
        });
    }

    fn fail_task(
        &mut self,
        task_id: u64,
        reason: FailureReason,
        charge_responders: bool,
        events: &mut Vec<EngineEvent>,
    ) {
        let (count, responders) = match self.tasks.get_mut(&task_id) {
            Some(entry) => {
                entry.task.state = TaskState::Failed;
                entry.task.failure_reason = Some(reason);
                (
                    entry.responses.len(),
                    entry.responses.iter().map(|r| r.operator).collect::<Vec<_>>(),
                )
            }
            None => return,
        };
        if charge_responders {
            for operator in responders {
                self.operators.record_outcome(&operator, false);
            }
        }
        events.push(EngineEvent::TaskFailed {
            task_id,
            reason,
            response_count: count,
        });
    }
}

/// Group responses by response-byte hash and pick the winning group, if
/// any crossed the threshold share of total registered weight.
///
/// Tie-break: strictly larger group weight wins; equal weights resolve to
/// the group whose latest member arrived earlier (smaller max sequence).
fn evaluate_quorum(
    threshold: f64,
    entry: &TaskEntry,
    operators: &OperatorSet,
) -> Option<Winner> {
    if entry.responses.is_empty() {
        return None;
    }
    let total = operators.total_weight();
    if total <= 0.0 {
        return None;
    }

    let mut groups: BTreeMap<B256, Winner> = BTreeMap::new();
    for r in &entry.responses {
        let hash = keccak256(&r.response);
        let g = groups.entry(hash).or_insert_with(|| Winner {
            hash,
            response: r.response.clone(),
            weight: 0.0,
            last_seq: 0,
            contributors: Vec::new(),
        });
        g.weight += r.weight_at_time;
        g.last_seq = g.last_seq.max(r.seq);
        g.contributors.push(r.operator);
    }

    let mut best: Option<Winner> = None;
    for (_, g) in groups {
        if g.weight / total < threshold {
            continue;
        }
        best = Some(match best {
            None => g,
            Some(b) => {
                if g.weight > b.weight {
                    g
                } else if g.weight < b.weight {
                    b
                } else if g.last_seq < b.last_seq {
                    g
                } else {
                    b
                }
            }
        });
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consensus::signing::sign_response;
    use crate::core::security::signer::{InMemorySigner, OperatorSigner, SignerBackend};

    fn signer(seed: u8) -> (Address, OperatorSigner) {
        let mut secret = [0u8; 32];
        secret[31] = seed;
        let backend = InMemorySigner::from_secret_bytes(&secret).unwrap();
        let address = backend.address();
        (address, OperatorSigner::new(Box::new(backend)))
    }

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(EngineParams::default())
    }

    #[test]
    fn task_ids_are_unique_and_monotonic() {
        let mut e = engine();
        let (a, _) = e.create_task(TaskKind::ComputePcs, vec![1], 0);
        let (b, _) = e.create_task(TaskKind::Verify, vec![2], 0);
        assert!(b > a);
        assert_eq!(e.pending_tasks(), 2);
    }

    #[test]
    fn unregistered_operator_cannot_respond() {
        let mut e = engine();
        let (id, _) = e.create_task(TaskKind::ComputePcs, vec![], 0);
        let (addr, s) = signer(1);
        let sig = sign_response(&s, id, b"r").unwrap();
        assert_eq!(
            e.submit_response(id, addr, b"r".to_vec(), sig, 10),
            Err(EngineError::UnknownOperator)
        );
    }

    #[test]
    fn forged_signature_is_rejected_without_side_effects() {
        let mut e = engine();
        let (id, _) = e.create_task(TaskKind::ComputePcs, vec![], 0);
        let (addr_a, _) = signer(1);
        let (_, other) = signer(2);
        e.add_operator(addr_a, 50, 0.5, 0).unwrap();

        let sig = sign_response(&other, id, b"r").unwrap();
        assert_eq!(
            e.submit_response(id, addr_a, b"r".to_vec(), sig, 10),
            Err(EngineError::BadSignature)
        );
        assert!(e.responses(id).unwrap().is_empty());
        let rec = e.operator(&addr_a).unwrap();
        assert_eq!((rec.success_count, rec.failure_count), (0, 0));
    }

    #[test]
    fn ingest_after_deadline_reports_expiry() {
        let mut e = engine();
        let (id, _) = e.create_task(TaskKind::ComputePcs, vec![], 0);
        let (addr, s) = signer(1);
        e.add_operator(addr, 100, 1.0, 0).unwrap();
        let sig = sign_response(&s, id, b"r").unwrap();
        let late = e.params().response_timeout_ms + 1;
        assert_eq!(
            e.submit_response(id, addr, b"r".to_vec(), sig, late),
            Err(EngineError::TaskExpired)
        );
    }

    #[test]
    fn single_full_weight_operator_reaches_quorum_alone() {
        let mut e = engine();
        let (addr, s) = signer(1);
        e.add_operator(addr, 100, 1.0, 0).unwrap();
        let (id, _) = e.create_task(TaskKind::ComputePrs, vec![], 0);

        let sig = sign_response(&s, id, b"agreed").unwrap();
        let events = e.submit_response(id, addr, b"agreed".to_vec(), sig, 5).unwrap();

        assert!(matches!(events[0], EngineEvent::ResponseAccepted { .. }));
        assert!(matches!(events[1], EngineEvent::QuorumReached { .. }));
        assert!(matches!(events[2], EngineEvent::TaskCompleted { .. }));
        let task = e.task(id).unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.resolved_response.as_deref(), Some(&b"agreed"[..]));
        assert_eq!(e.operator(&addr).unwrap().success_count, 1);
    }

    #[test]
    fn cancel_is_idempotent_and_status_based() {
        let mut e = engine();
        let (id, _) = e.create_task(TaskKind::Batch, vec![], 0);
        let (outcome, events) = e.cancel_task(id);
        assert_eq!(outcome, CancelOutcome::Cancelled);
        assert!(matches!(
            events[0],
            EngineEvent::TaskFailed {
                reason: FailureReason::Cancelled,
                ..
            }
        ));
        assert_eq!(e.cancel_task(id).0, CancelOutcome::AlreadyTerminal);
        assert_eq!(e.cancel_task(9999).0, CancelOutcome::NotFound);
    }

    #[test]
    fn gc_removes_only_stale_responseless_terminal_tasks() {
        let mut e = engine();
        let (id, _) = e.create_task(TaskKind::ComputePcs, vec![], 0);
        e.cancel_task(id);
        // too young
        assert_eq!(e.gc_stale(e.params().response_timeout_ms), 0);
        let cutoff = 2 * e.params().response_timeout_ms;
        assert_eq!(e.gc_stale(cutoff), 1);
        assert!(e.task(id).is_none());
    }
}
