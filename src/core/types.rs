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
#![warn(missing_docs)]

//! Core data model: attestation requests, typed score payloads, tasks,
//! responses and operator records.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Credit tier derived from a personal credit score.
///
/// Inclusive lower bounds: Bronze 0, Silver 300, Gold 500, Platinum 700,
/// Diamond 850.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// 0..=299
    Bronze,
    /// 300..=499
    Silver,
    /// 500..=699
    Gold,
    /// 700..=849
    Platinum,
    /// 850..=1000
    Diamond,
}

impl Tier {
    /// Fixed wire label.
    pub fn as_label(&self) -> &'static str {
        match self {
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
            Tier::Diamond => "Diamond",
        }
    }

    /// Parse a wire label. Labels are case-sensitive and form a closed set.
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "Bronze" => Some(Tier::Bronze),
            "Silver" => Some(Tier::Silver),
            "Gold" => Some(Tier::Gold),
            "Platinum" => Some(Tier::Platinum),
            "Diamond" => Some(Tier::Diamond),
            _ => None,
        }
    }
}

/// Risk band derived from a pool risk score.
///
/// Inclusive lower bounds: Calm 0, Normal 25, Volatile 50, Turbulent 75.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    /// 0..=24
    Calm,
    /// 25..=49
    Normal,
    /// 50..=74
    Volatile,
    /// 75..=100
    Turbulent,
}

impl Band {
    /// Fixed wire label.
    pub fn as_label(&self) -> &'static str {
        match self {
            Band::Calm => "Calm",
            Band::Normal => "Normal",
            Band::Volatile => "Volatile",
            Band::Turbulent => "Turbulent",
        }
    }

    /// Parse a wire label. Labels are case-sensitive and form a closed set.
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "Calm" => Some(Band::Calm),
            "Normal" => Some(Band::Normal),
            "Volatile" => Some(Band::Volatile),
            "Turbulent" => Some(Band::Turbulent),
            _ => None,
        }
    }
}

/// Recoverable ECDSA signature bytes (expected 65: r || s || v).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature(pub Vec<u8>);

impl RecoverableSignature {
    /// Interpret as fixed 65-byte signature if the length matches.
    pub fn as_fixed_bytes(&self) -> Option<[u8; 65]> {
        if self.0.len() != 65 {
            return None;
        }
        let mut out = [0u8; 65];
        out.copy_from_slice(&self.0);
        Some(out)
    }
}

/// An attestation request: the tuple that is canonically encoded and signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    /// 32-byte subject identifier (user hash or pool key).
    pub subject: B256,
    /// 32-byte attestation type tag.
    pub attestation_type: B256,
    /// Opaque payload; interpretation is selected by `attestation_type`.
    pub data: Vec<u8>,
    /// Absolute expiry, whole seconds since the UNIX epoch.
    pub expiry: u64,
    /// Optional content-addressed metadata URI; empty string means absent.
    pub ipfs_uri: String,
}

/// A signed, immutable attestation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAttestation {
    /// The request whose canonical encoding was signed.
    pub request: AttestationRequest,
    /// 20-byte address of the signing operator.
    pub signer: Address,
    /// Recoverable signature over the prefixed-message digest.
    pub signature: RecoverableSignature,
}

/// Typed personal-credit-score payload carried in the request data field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcsPayload {
    /// Subject identifier; must equal the outer request subject.
    pub subject: B256,
    /// Score in 0..=1000.
    pub score: u32,
    /// Tier implied by `score`.
    pub tier: Tier,
    /// Issuance time, seconds since the UNIX epoch.
    pub issued_at: u64,
    /// Expiry, seconds since the UNIX epoch; strictly after `issued_at`.
    pub expiry: u64,
    /// Scoring policy version string.
    pub policy_version: String,
    /// Issuing operator address.
    pub operator: Address,
}

/// Typed pool-risk-score payload carried in the request data field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrsPayload {
    /// Pool identifier; must equal the outer request subject.
    pub pool_id: B256,
    /// Score in 0..=100.
    pub score: u32,
    /// Band implied by `score`.
    pub band: Band,
    /// Issuance time, seconds since the UNIX epoch.
    pub issued_at: u64,
    /// Expiry, seconds since the UNIX epoch; strictly after `issued_at`.
    pub expiry: u64,
    /// Scoring policy version string.
    pub policy_version: String,
    /// Issuing operator address.
    pub operator: Address,
}

/// Input features for personal credit scoring. Missing fields default to 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PcsFeatures {
    /// Wallet age in days.
    #[serde(default)]
    pub wallet_age_days: f64,
    /// Lifetime transaction count.
    #[serde(default)]
    pub transaction_count: u64,
    /// Transaction success rate in [0, 1].
    #[serde(default)]
    pub success_rate: f64,
    /// Liquidity-provision contribution (currency-neutral units).
    #[serde(default)]
    pub lp_contribution: f64,
    /// Number of past liquidations.
    #[serde(default)]
    pub liquidation_count: u64,
}

/// Input metrics for pool risk scoring. Missing fields default to 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolMetrics {
    /// Realized volatility in [0, 1].
    #[serde(default)]
    pub volatility: f64,
    /// Liquidity depth (currency-neutral units).
    #[serde(default)]
    pub liquidity_depth: f64,
    /// Liquidity concentration in [0, 1].
    #[serde(default)]
    pub concentration: f64,
    /// Oracle price dispersion in [0, 1].
    #[serde(default)]
    pub oracle_dispersion: f64,
}

/// Kind of consensus task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Compute a personal credit score.
    ComputePcs,
    /// Compute a pool risk score.
    ComputePrs,
    /// Batch of scoring items.
    Batch,
    /// Verify an existing attestation.
    Verify,
}

/// Lifecycle state of a task. Terminal states are immutable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Accepting responses.
    Pending,
    /// A response group reached quorum.
    Completed,
    /// Terminated without quorum.
    Failed,
}

/// Reason a task failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Deadline elapsed with no responses at all.
    NoResponses,
    /// Responses arrived but no group reached the quorum threshold.
    InsufficientQuorum,
    /// Cancelled externally while pending.
    Cancelled,
}

/// A consensus task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: u64,
    /// Task kind.
    pub kind: TaskKind,
    /// Opaque input bytes handed to operators.
    pub input: Vec<u8>,
    /// Creation time, milliseconds since the UNIX epoch.
    pub created_at_ms: u64,
    /// Absolute deadline, milliseconds since the UNIX epoch.
    pub deadline_ms: u64,
    /// Current state.
    pub state: TaskState,
    /// Winning response bytes, set on completion.
    pub resolved_response: Option<Vec<u8>>,
    /// Winning group weight, set on completion.
    pub quorum_weight: Option<f64>,
    /// Failure reason, set on failure.
    pub failure_reason: Option<FailureReason>,
}

impl Task {
    /// True once the task has left the pending state.
    pub fn is_terminal(&self) -> bool {
        self.state != TaskState::Pending
    }
}

/// A single operator response to a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Task this response belongs to.
    pub task_id: u64,
    /// Responding operator.
    pub operator: Address,
    /// Response bytes; grouped by keccak256 for quorum.
    pub response: Vec<u8>,
    /// Signature over the response digest.
    pub signature: RecoverableSignature,
    /// Reception time, milliseconds since the UNIX epoch.
    pub received_at_ms: u64,
    /// Monotonic reception sequence number; quorum ties resolve on this,
    /// never on wall-clock time.
    pub seq: u64,
    /// Operator weight captured at reception time. Later weight updates do
    /// not retro-invalidate this response.
    pub weight_at_time: f64,
}

/// Bookkeeping record for a registered operator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperatorRecord {
    /// Operator address (recovered from response signatures).
    pub address: Address,
    /// Staked amount in protocol units.
    pub stake: u64,
    /// Externally assigned reputation in [0, 1].
    pub reputation: f64,
    /// Derived consensus weight; recomputed eagerly on mutation.
    pub weight: f64,
    /// Last time a response from this operator was accepted (ms).
    pub last_seen_ms: u64,
    /// Responses that ended up in a winning group.
    pub success_count: u64,
    /// Responses that did not.
    pub failure_count: u64,
    /// Health flag maintained by the staleness sweep.
    pub is_healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_labels_round_trip() {
        for t in [Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Platinum, Tier::Diamond] {
            assert_eq!(Tier::from_label(t.as_label()), Some(t));
        }
        assert_eq!(Tier::from_label("bronze"), None);
        assert_eq!(Tier::from_label(""), None);
    }

    #[test]
    fn band_labels_round_trip() {
        for b in [Band::Calm, Band::Normal, Band::Volatile, Band::Turbulent] {
            assert_eq!(Band::from_label(b.as_label()), Some(b));
        }
        assert_eq!(Band::from_label("calm"), None);
    }

    #[test]
    fn signature_fixed_bytes_requires_len_65() {
        assert!(RecoverableSignature(vec![0u8; 65]).as_fixed_bytes().is_some());
        assert!(RecoverableSignature(vec![0u8; 64]).as_fixed_bytes().is_none());
        assert!(RecoverableSignature(Vec::new()).as_fixed_bytes().is_none());
    }
}
