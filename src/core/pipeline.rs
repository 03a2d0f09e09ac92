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

//! Attestation issuance pipeline.
//!
//! Orchestrates validation, scoring, canonical encoding and signing into a
//! `SignedAttestation`. The pipeline is pure apart from signature
//! production and the optional metadata upload; batch issuance isolates
//! per-item failures and preserves input order.

use crate::core::codec::{self, CodecError, PayloadKind, PCS_TYPE_TAG, PRS_TYPE_TAG};
use crate::core::scoring::{band_from_score, score_pcs, score_prs, tier_from_score};
use crate::core::security::signer::{verify_digest, OperatorSigner, SignerError};
use crate::core::types::{
    AttestationRequest, PcsFeatures, PcsPayload, PoolMetrics, PrsPayload, SignedAttestation,
};
use crate::core::validate::{
    self, ValidationError,
};
use crate::external::ipfs::{is_valid_metadata_uri, MetadataError, MetadataStore};
use alloy_primitives::B256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use thiserror::Error;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input or payload validation failed.
    #[error(transparent)]
    Input(#[from] ValidationError),
    /// Signing or signature verification failed.
    #[error(transparent)]
    Signature(#[from] SignerError),
    /// Canonical encoding failed.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// Metadata upload failed or returned a malformed URI.
    #[error("metadata: {0}")]
    Metadata(#[from] MetadataError),
}

/// A single item of a batch issuance call.
#[derive(Clone, Debug)]
pub enum BatchItem {
    /// Personal credit score item.
    Pcs {
        /// Subject identifier.
        subject: B256,
        /// Scoring inputs.
        features: PcsFeatures,
        /// Expiry, seconds since the UNIX epoch.
        expiry: u64,
        /// Scoring policy version.
        policy_version: String,
    },
    /// Pool risk score item.
    Prs {
        /// Pool identifier.
        pool_id: B256,
        /// Scoring inputs.
        metrics: PoolMetrics,
        /// Expiry, seconds since the UNIX epoch.
        expiry: u64,
        /// Scoring policy version.
        policy_version: String,
    },
}

/// Issuance pipeline bound to one operator signer.
pub struct AttestationPipeline {
    signer: Arc<OperatorSigner>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
}

impl AttestationPipeline {
    /// Build a pipeline without metadata persistence (empty URIs).
    pub fn new(signer: Arc<OperatorSigner>) -> Self {
        Self {
            signer,
            metadata_store: None,
        }
    }

    /// Attach a content-addressed metadata store.
    pub fn with_metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    /// Address the pipeline signs under.
    pub fn operator(&self) -> alloy_primitives::Address {
        self.signer.address()
    }

    /// Score, encode and sign a personal credit attestation.
    pub fn sign_pcs(
        &self,
        features: &PcsFeatures,
        subject: B256,
        expiry: u64,
        policy_version: &str,
    ) -> Result<SignedAttestation, PipelineError> {
        validate::validate_pcs_features(features)?;
        let now = now_s();
        let scored = score_pcs(features);

        let payload = PcsPayload {
            subject,
            score: scored.score,
            tier: scored.tier,
            issued_at: now,
            expiry,
            policy_version: policy_version.to_string(),
            operator: self.signer.address(),
        };
        validate::validate_pcs_payload(&payload, &subject, now, Some(self.signer.address()))?;

        let ipfs_uri = match &self.metadata_store {
            Some(store) => {
                let blob = pcs_metadata_blob(&payload, &scored);
                upload_metadata(store.as_ref(), &blob)?
            }
            None => String::new(),
        };

        let request = AttestationRequest {
            subject,
            attestation_type: *PCS_TYPE_TAG,
            data: codec::encode_pcs(&payload)?,
            expiry,
            ipfs_uri,
        };
        self.sign_request(request, now)
    }

    /// Score, encode and sign a pool risk attestation.
    pub fn sign_prs(
        &self,
        metrics: &PoolMetrics,
        pool_id: B256,
        expiry: u64,
        policy_version: &str,
    ) -> Result<SignedAttestation, PipelineError> {
        validate::validate_pool_metrics(metrics)?;
        let now = now_s();
        let scored = score_prs(metrics);

        let payload = PrsPayload {
            pool_id,
            score: scored.score,
            band: scored.band,
            issued_at: now,
            expiry,
            policy_version: policy_version.to_string(),
            operator: self.signer.address(),
        };
        validate::validate_prs_payload(&payload, &pool_id, now, Some(self.signer.address()))?;

        let ipfs_uri = match &self.metadata_store {
            Some(store) => {
                let blob = prs_metadata_blob(&payload, &scored);
                upload_metadata(store.as_ref(), &blob)?
            }
            None => String::new(),
        };

        let request = AttestationRequest {
            subject: pool_id,
            attestation_type: *PRS_TYPE_TAG,
            data: codec::encode_prs(&payload)?,
            expiry,
            ipfs_uri,
        };
        self.sign_request(request, now)
    }

    /// Issue a batch. One failing item never aborts its siblings; results
    /// correspond positionally to the inputs.
    pub fn sign_batch(
        &self,
        items: &[BatchItem],
    ) -> Vec<Result<SignedAttestation, PipelineError>> {
        items
            .iter()
            .map(|item| match item {
                BatchItem::Pcs {
                    subject,
                    features,
                    expiry,
                    policy_version,
                } => self.sign_pcs(features, *subject, *expiry, policy_version),
                BatchItem::Prs {
                    pool_id,
                    metrics,
                    expiry,
                    policy_version,
                } => self.sign_prs(metrics, *pool_id, *expiry, policy_version),
            })
            .collect()
    }

    fn sign_request(
        &self,
        request: AttestationRequest,
        now: u64,
    ) -> Result<SignedAttestation, PipelineError> {
        // the signer never sees a request that fails wire validation
        validate::validate_request(&request, now)?;
        let digest = codec::request_digest(&request)?;
        let signature = self.signer.sign_digest(digest)?;
        Ok(SignedAttestation {
            request,
            signer: self.signer.address(),
            signature,
        })
    }
}

/// Verify a signed attestation: recompute the canonical digest, check the
/// signature recovers to the recorded signer, and re-check score/label
/// consistency. Time-based checks are intentionally absent so verification
/// works on archived material.
pub fn verify_attestation(att: &SignedAttestation) -> bool {
    match verify_attestation_inner(att) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, signer = %att.signer, "attestation verification failed");
            false
        }
    }
}

fn verify_attestation_inner(att: &SignedAttestation) -> Result<(), PipelineError> {
    let digest = codec::request_digest(&att.request)?;
    verify_digest(digest, &att.signature, att.signer)?;

    let kind = codec::payload_kind(&att.request.attestation_type)
        .ok_or(ValidationError::UnsupportedType)?;
    match kind {
        PayloadKind::Pcs => {
            let p = codec::decode_pcs(&att.request.data)?;
            if p.subject != att.request.subject {
                return Err(ValidationError::MalformedField("subject").into());
            }
            if p.score > 1000 {
                return Err(ValidationError::RangeViolation("score").into());
            }
            if p.tier != tier_from_score(p.score) {
                return Err(ValidationError::InconsistentTier.into());
            }
        }
        PayloadKind::Prs => {
            let p = codec::decode_prs(&att.request.data)?;
            if p.pool_id != att.request.subject {
                return Err(ValidationError::MalformedField("poolId").into());
            }
            if p.score > 100 {
                return Err(ValidationError::RangeViolation("score").into());
            }
            if p.band != band_from_score(p.score) {
                return Err(ValidationError::InconsistentTier.into());
            }
        }
    }
    Ok(())
}

fn upload_metadata(
    store: &dyn MetadataStore,
    blob: &[u8],
) -> Result<String, PipelineError> {
    let uri = store.put_metadata(blob)?;
    if !is_valid_metadata_uri(&uri) {
        return Err(MetadataError::InvalidUri.into());
    }
    Ok(uri)
}

fn pcs_metadata_blob(
    payload: &PcsPayload,
    scored: &crate::core::scoring::PcsScore,
) -> Vec<u8> {
    let b = &scored.breakdown;
    serde_json::json!({
        "schema": "credence/attestation-meta/v1",
        "kind": "PCS",
        "subject": payload.subject,
        "score": payload.score,
        "tier": payload.tier.as_label(),
        "issuedAt": payload.issued_at,
        "expiry": payload.expiry,
        "policyVersion": payload.policy_version,
        "breakdown": {
            "age": b.age,
            "activity": b.activity,
            "liquidity": b.liquidity,
            "liquidation": b.liquidation,
        },
    })
    .to_string()
    .into_bytes()
}

fn prs_metadata_blob(
    payload: &PrsPayload,
    scored: &crate::core::scoring::PrsScore,
) -> Vec<u8> {
    let b = &scored.breakdown;
    serde_json::json!({
        "schema": "credence/attestation-meta/v1",
        "kind": "PRS",
        "poolId": payload.pool_id,
        "score": payload.score,
        "band": payload.band.as_label(),
        "issuedAt": payload.issued_at,
        "expiry": payload.expiry,
        "policyVersion": payload.policy_version,
        "breakdown": {
            "volatility": b.volatility,
            "depth": b.depth,
            "concentration": b.concentration,
            "oracle": b.oracle,
        },
    })
    .to_string()
    .into_bytes()
}

fn now_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::security::signer::InMemorySigner;

    fn test_pipeline() -> AttestationPipeline {
        let mut secret = [0u8; 32];
        secret[31] = 11;
        let backend = InMemorySigner::from_secret_bytes(&secret).unwrap();
        AttestationPipeline::new(Arc::new(OperatorSigner::new(Box::new(backend))))
    }

    fn far_expiry() -> u64 {
        now_s() + 86_400
    }

    #[test]
    fn signed_pcs_attestation_verifies() {
        let p = test_pipeline();
        let att = p
            .sign_pcs(
                &PcsFeatures {
                    wallet_age_days: 400.0,
                    transaction_count: 250,
                    success_rate: 0.9,
                    lp_contribution: 1_000.0,
                    liquidation_count: 0,
                },
                B256::repeat_byte(0x21),
                far_expiry(),
                "pcs-v1",
            )
            .unwrap();
        assert_eq!(att.signer, p.operator());
        assert!(verify_attestation(&att));
    }

    #[test]
    fn tampered_data_fails_verification() {
        let p = test_pipeline();
        let mut att = p
            .sign_prs(
                &PoolMetrics {
                    volatility: 0.4,
                    liquidity_depth: 50_000.0,
                    concentration: 0.3,
                    oracle_dispersion: 0.1,
                },
                B256::repeat_byte(0x33),
                far_expiry(),
                "prs-v1",
            )
            .unwrap();
        assert!(verify_attestation(&att));
        att.request.expiry += 1;
        assert!(!verify_attestation(&att));
    }

    #[test]
    fn batch_failures_do_not_leak_across_items() {
        let p = test_pipeline();
        let good = BatchItem::Pcs {
            subject: B256::repeat_byte(0x01),
            features: PcsFeatures::default(),
            expiry: far_expiry(),
            policy_version: "pcs-v1".to_string(),
        };
        let bad = BatchItem::Prs {
            pool_id: B256::repeat_byte(0x02),
            metrics: PoolMetrics {
                volatility: 7.0, // out of range
                ..Default::default()
            },
            expiry: far_expiry(),
            policy_version: "prs-v1".to_string(),
        };
        let results = p.sign_batch(&[good.clone(), bad, good]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn past_expiry_is_rejected_before_signing() {
        let p = test_pipeline();
        let err = p
            .sign_pcs(&PcsFeatures::default(), B256::repeat_byte(0x05), 1, "pcs-v1")
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Input(ValidationError::ExpiredOrBackwards)
        ));
    }
}
