#![forbid(unsafe_code)]
#![deny(missing_docs)]
// Copyright (c) 2026 Credence
// Licensed under the Apache License, Version 2.0

//! Operator registry: stake, reputation, derived weights and health.

use crate::core::types::OperatorRecord;
use alloy_primitives::Address;
use std::collections::BTreeMap;
use thiserror::Error;

/// Stake share of the derived weight.
const STAKE_WEIGHT: f64 = 0.7;
/// Reputation share of the derived weight.
const REPUTATION_WEIGHT: f64 = 0.3;

/// Operator registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperatorError {
    /// Address is not registered.
    #[error("unknown operator")]
    Unknown,
    /// Address is already registered.
    #[error("operator already registered")]
    AlreadyRegistered,
    /// Reputation outside [0, 1].
    #[error("reputation out of range")]
    InvalidReputation,
}

/// Registry of consensus operators keyed by address.
///
/// Weights are recomputed eagerly on every mutation so that reads never
/// observe a stale derivation. Health does not reduce an operator's share
/// of the total weight; removal is explicit.
#[derive(Clone, Debug)]
pub struct OperatorSet {
    records: BTreeMap<Address, OperatorRecord>,
    reference_stake: u64,
}

impl OperatorSet {
    /// Create an empty registry. `reference_stake` is the stake that maps
    /// to a full stake share; larger stakes saturate.
    pub fn new(reference_stake: u64) -> Self {
        Self {
            records: BTreeMap::new(),
            reference_stake: reference_stake.max(1),
        }
    }

    fn weight_for(&self, stake: u64, reputation: f64) -> f64 {
        let normalized = (stake as f64 / self.reference_stake as f64).min(1.0);
        STAKE_WEIGHT * normalized + REPUTATION_WEIGHT * reputation
    }

    /// Register an operator. Fails on duplicates and out-of-range
    /// reputation.
    pub fn add(
        &mut self,
        address: Address,
        stake: u64,
        reputation: f64,
        now_ms: u64,
    ) -> Result<f64, OperatorError> {
        if !(0.0..=1.0).contains(&reputation) || !reputation.is_finite() {
            return Err(OperatorError::InvalidReputation);
        }
        if self.records.contains_key(&address) {
            return Err(OperatorError::AlreadyRegistered);
        }
        let weight = self.weight_for(stake, reputation);
        self.records.insert(
            address,
            OperatorRecord {
                address,
                stake,
                reputation,
                weight,
                last_seen_ms: now_ms,
                success_count: 0,
                failure_count: 0,
                is_healthy: true,
            },
        );
        Ok(weight)
    }

    /// Update stake and/or reputation; the weight is recomputed in place.
    pub fn update(
        &mut self,
        address: &Address,
        stake: Option<u64>,
        reputation: Option<f64>,
    ) -> Result<f64, OperatorError> {
        if let Some(r) = reputation {
            if !(0.0..=1.0).contains(&r) || !r.is_finite() {
                return Err(OperatorError::InvalidReputation);
            }
        }
        let reference = self.reference_stake;
        let rec = self.records.get_mut(address).ok_or(OperatorError::Unknown)?;
        if let Some(s) = stake {
            rec.stake = s;
        }
        if let Some(r) = reputation {
            rec.reputation = r;
        }
        let normalized = (rec.stake as f64 / reference as f64).min(1.0);
        rec.weight = STAKE_WEIGHT * normalized + REPUTATION_WEIGHT * rec.reputation;
        Ok(rec.weight)
    }

    /// Remove an operator, returning its final record.
    pub fn remove(&mut self, address: &Address) -> Result<OperatorRecord, OperatorError> {
        self.records.remove(address).ok_or(OperatorError::Unknown)
    }

    /// Look up a record.
    pub fn get(&self, address: &Address) -> Option<&OperatorRecord> {
        self.records.get(address)
    }

    /// True if the address is registered.
    pub fn contains(&self, address: &Address) -> bool {
        self.records.contains_key(address)
    }

    /// Number of registered operators.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no operators are registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of operators currently marked healthy.
    pub fn healthy_len(&self) -> usize {
        self.records.values().filter(|r| r.is_healthy).count()
    }

    /// Sum of all registered weights (healthy or not).
    pub fn total_weight(&self) -> f64 {
        self.records.values().map(|r| r.weight).sum()
    }

    /// Mark an operator as seen now.
    pub fn touch(&mut self, address: &Address, now_ms: u64) {
        if let Some(rec) = self.records.get_mut(address) {
            rec.last_seen_ms = rec.last_seen_ms.max(now_ms);
        }
    }

    /// Attribute a finalized task outcome to a responder.
    pub fn record_outcome(&mut self, address: &Address, in_winning_group: bool) {
        if let Some(rec) = self.records.get_mut(address) {
            if in_winning_group {
                rec.success_count = rec.success_count.saturating_add(1);
            } else {
                rec.failure_count = rec.failure_count.saturating_add(1);
            }
        }
    }

    /// Re-derive health from staleness; returns the operators whose flag
    /// changed, with the new value.
    pub fn sweep_health(&mut self, now_ms: u64, staleness_ms: u64) -> Vec<(Address, bool)> {
        let mut changes = Vec::new();
        for rec in self.records.values_mut() {
            let healthy = now_ms.saturating_sub(rec.last_seen_ms) <= staleness_ms;
            if healthy != rec.is_healthy {
                rec.is_healthy = healthy;
                changes.push((rec.address, healthy));
            }
        }
        changes
    }

    /// Iterate over records in address order.
    pub fn iter(&self) -> impl Iterator<Item = &OperatorRecord> {
        self.records.values()
    }
}
