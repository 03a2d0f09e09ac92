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

//! Credence - off-chain attestation operator for a privacy-preserving
//! credit-risk protocol.
//!
//! This crate provides:
//! - Deterministic PCS/PRS scoring with canonical ABI encoding
//! - Recoverable ECDSA attestation signing with expiry
//! - A stake-weighted multi-operator consensus engine with timeout
//!   finalization and operator health tracking
//! - Monitoring via Prometheus metrics and structured JSON logging

/// Core protocol primitives (types, codec, scoring, signing, consensus).
pub mod core;
/// External collaborator contracts (registry submission, metadata store).
pub mod external;
/// Observability (metrics, structured logging helpers).
pub mod monitoring;
