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

//! Structural and semantic validation of requests, payloads and inputs.
//!
//! Wire validation parses the opaque data field under the declared type;
//! typed validation enforces ranges, tier/band consistency and time
//! ordering. Failures carry the offending field where one exists.

use crate::core::codec::{self, CodecError, PayloadKind};
use crate::core::scoring::{band_from_score, tier_from_score};
use crate::core::types::{
    AttestationRequest, PcsFeatures, PcsPayload, PoolMetrics, PrsPayload,
};
use crate::external::ipfs::is_valid_metadata_uri;
use alloy_primitives::{Address, B256};
use thiserror::Error;

/// Positive clock skew tolerance for issuance timestamps, in seconds.
pub const ISSUED_AT_SKEW_S: u64 = 60;

/// Minimum required distance of an expiry from the validation instant.
pub const EXPIRY_GRACE_S: u64 = 1;

/// Validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A field fails structural checks.
    #[error("malformed field: {0}")]
    MalformedField(&'static str),
    /// A numeric field is outside its documented range.
    #[error("value out of range: {0}")]
    RangeViolation(&'static str),
    /// The tier/band label does not match the score.
    #[error("tier or band inconsistent with score")]
    InconsistentTier,
    /// Expiry is not in the future, or precedes issuance.
    #[error("expiry not in the future or before issuance")]
    ExpiredOrBackwards,
    /// The attestation type tag is outside the supported set.
    #[error("unsupported attestation type")]
    UnsupportedType,
}

impl From<CodecError> for ValidationError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Oversize(field) => ValidationError::MalformedField(field),
            CodecError::InvalidLabel => ValidationError::MalformedField("label"),
            CodecError::Decode => ValidationError::MalformedField("data"),
        }
    }
}

/// Payload parsed out of a request's data field during wire validation.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedPayload {
    /// Personal credit score payload.
    Pcs(PcsPayload),
    /// Pool risk score payload.
    Prs(PrsPayload),
}

/// Wire-level validation of an attestation request.
///
/// Checks the type tag, parses the data field under it, validates the
/// metadata URI shape and requires `expiry >= now + 1`. Returns the parsed
/// payload for subsequent typed validation.
pub fn validate_request(
    req: &AttestationRequest,
    now_s: u64,
) -> Result<TypedPayload, ValidationError> {
    let kind = codec::payload_kind(&req.attestation_type)
        .ok_or(ValidationError::UnsupportedType)?;

    if !req.ipfs_uri.is_empty() && !is_valid_metadata_uri(&req.ipfs_uri) {
        return Err(ValidationError::MalformedField("ipfsUri"));
    }
    if req.expiry < now_s.saturating_add(EXPIRY_GRACE_S) {
        return Err(ValidationError::ExpiredOrBackwards);
    }

    let payload = match kind {
        PayloadKind::Pcs => TypedPayload::Pcs(codec::decode_pcs(&req.data)?),
        PayloadKind::Prs => TypedPayload::Prs(codec::decode_prs(&req.data)?),
    };
    Ok(payload)
}

/// Typed validation of a personal credit score payload.
///
/// `expected_operator` is the local signer address for outgoing
/// attestations; pass `None` for incoming material, where the operator
/// field is informational.
pub fn validate_pcs_payload(
    p: &PcsPayload,
    subject: &B256,
    now_s: u64,
    expected_operator: Option<Address>,
) -> Result<(), ValidationError> {
    if p.subject != *subject {
        return Err(ValidationError::MalformedField("subject"));
    }
    if p.score > 1000 {
        return Err(ValidationError::RangeViolation("score"));
    }
    if p.tier != tier_from_score(p.score) {
        return Err(ValidationError::InconsistentTier);
    }
    check_issuance_window(p.issued_at, p.expiry, now_s)?;
    if let Some(op) = expected_operator {
        if p.operator != op {
            return Err(ValidationError::MalformedField("operator"));
        }
    }
    Ok(())
}

/// Typed validation of a pool risk score payload.
pub fn validate_prs_payload(
    p: &PrsPayload,
    subject: &B256,
    now_s: u64,
    expected_operator: Option<Address>,
) -> Result<(), ValidationError> {
    if p.pool_id != *subject {
        return Err(ValidationError::MalformedField("poolId"));
    }
    if p.score > 100 {
        return Err(ValidationError::RangeViolation("score"));
    }
    if p.band != band_from_score(p.score) {
        return Err(ValidationError::InconsistentTier);
    }
    check_issuance_window(p.issued_at, p.expiry, now_s)?;
    if let Some(op) = expected_operator {
        if p.operator != op {
            return Err(ValidationError::MalformedField("operator"));
        }
    }
    Ok(())
}

/// Typed validation dispatching on the parsed payload family.
pub fn validate_payload(
    payload: &TypedPayload,
    subject: &B256,
    now_s: u64,
    expected_operator: Option<Address>,
) -> Result<(), ValidationError> {
    match payload {
        TypedPayload::Pcs(p) => validate_pcs_payload(p, subject, now_s, expected_operator),
        TypedPayload::Prs(p) => validate_prs_payload(p, subject, now_s, expected_operator),
    }
}

fn check_issuance_window(issued_at: u64, expiry: u64, now_s: u64) -> Result<(), ValidationError> {
    if issued_at > now_s.saturating_add(ISSUED_AT_SKEW_S) {
        return Err(ValidationError::ExpiredOrBackwards);
    }
    if expiry <= issued_at {
        return Err(ValidationError::ExpiredOrBackwards);
    }
    Ok(())
}

/// Range checks on credit scoring inputs.
pub fn validate_pcs_features(f: &PcsFeatures) -> Result<(), ValidationError> {
    if !f.wallet_age_days.is_finite() || f.wallet_age_days < 0.0 {
        return Err(ValidationError::RangeViolation("walletAge"));
    }
    if !f.success_rate.is_finite() || !(0.0..=1.0).contains(&f.success_rate) {
        return Err(ValidationError::RangeViolation("successRate"));
    }
    if !f.lp_contribution.is_finite() || f.lp_contribution < 0.0 {
        return Err(ValidationError::RangeViolation("lpContribution"));
    }
    Ok(())
}

/// Range checks on pool risk inputs.
pub fn validate_pool_metrics(m: &PoolMetrics) -> Result<(), ValidationError> {
    for (value, field) in [
        (m.volatility, "volatility"),
        (m.concentration, "concentration"),
        (m.oracle_dispersion, "oracleDispersion"),
    ] {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::RangeViolation(field));
        }
    }
    if !m.liquidity_depth.is_finite() || m.liquidity_depth < 0.0 {
        return Err(ValidationError::RangeViolation("liquidityDepth"));
    }
    Ok(())
}
