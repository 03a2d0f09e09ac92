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

use alloy_primitives::B256;
use credence::core::codec::{decode_request, encode_pcs, PCS_TYPE_TAG};
use credence::core::pipeline::{verify_attestation, AttestationPipeline, BatchItem};
use credence::core::security::signer::{InMemorySigner, OperatorSigner};
use credence::core::types::{
    AttestationRequest, PcsFeatures, PcsPayload, PoolMetrics, SignedAttestation, Tier,
};
use credence::external::ipfs::{MetadataError, MetadataStore};
use credence::external::registry::build_submission;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn signer(seed: u8) -> OperatorSigner {
    let mut secret = [0u8; 32];
    secret[31] = seed;
    OperatorSigner::new(Box::new(InMemorySigner::from_secret_bytes(&secret).unwrap()))
}

fn pipeline(seed: u8) -> AttestationPipeline {
    AttestationPipeline::new(Arc::new(signer(seed)))
}

/// Records uploaded blobs and hands back a fixed CID.
struct RecordingStore {
    blobs: Mutex<Vec<Vec<u8>>>,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            blobs: Mutex::new(Vec::new()),
        }
    }
}

impl MetadataStore for RecordingStore {
    fn put_metadata(&self, blob: &[u8]) -> Result<String, MetadataError> {
        self.blobs.lock().unwrap().push(blob.to_vec());
        Ok("ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi".to_string())
    }
}

#[test]
fn issued_attestations_verify_and_submit() {
    let p = pipeline(1);
    let att = p
        .sign_pcs(
            &PcsFeatures {
                wallet_age_days: 900.0,
                transaction_count: 4_000,
                success_rate: 0.97,
                lp_contribution: 25_000.0,
                liquidation_count: 1,
            },
            B256::repeat_byte(0x51),
            now_s() + 7_200,
            "pcs-v1",
        )
        .unwrap();

    assert!(verify_attestation(&att));
    assert_eq!(att.request.attestation_type, *PCS_TYPE_TAG);
    assert_eq!(att.request.subject, B256::repeat_byte(0x51));

    // the registry receives exactly the canonical bytes plus the 65-byte
    // signature; decoding them yields the request unchanged
    let sub = build_submission(&att).unwrap();
    assert_eq!(sub.signature.len(), 65);
    assert_eq!(decode_request(&sub.payload).unwrap(), att.request);
}

#[test]
fn metadata_uri_flows_into_the_request() {
    let store = Arc::new(RecordingStore::new());
    let p = AttestationPipeline::new(Arc::new(signer(2)))
        .with_metadata_store(store.clone());

    let att = p
        .sign_prs(
            &PoolMetrics {
                volatility: 0.3,
                liquidity_depth: 1_000_000.0,
                concentration: 0.2,
                oracle_dispersion: 0.05,
            },
            B256::repeat_byte(0x61),
            now_s() + 3_600,
            "prs-v1",
        )
        .unwrap();

    assert!(att.request.ipfs_uri.starts_with("ipfs://"));
    assert!(verify_attestation(&att));

    let blobs = store.blobs.lock().unwrap();
    assert_eq!(blobs.len(), 1);
    let text = String::from_utf8(blobs[0].clone()).unwrap();
    assert!(text.contains("\"kind\":\"PRS\""));
    assert!(text.contains("policyVersion"));
}

#[test]
fn pipeline_without_store_leaves_uri_empty() {
    let p = pipeline(3);
    let att = p
        .sign_pcs(&PcsFeatures::default(), B256::repeat_byte(0x01), now_s() + 60, "pcs-v1")
        .unwrap();
    assert!(att.request.ipfs_uri.is_empty());
}

#[test]
fn batch_results_stay_positional() {
    let p = pipeline(4);
    let expiry = now_s() + 600;
    let items = vec![
        BatchItem::Pcs {
            subject: B256::repeat_byte(0x0A),
            features: PcsFeatures::default(),
            expiry,
            policy_version: "pcs-v1".to_string(),
        },
        BatchItem::Prs {
            pool_id: B256::repeat_byte(0x0B),
            metrics: PoolMetrics {
                concentration: 2.0, // out of range
                ..Default::default()
            },
            expiry,
            policy_version: "prs-v1".to_string(),
        },
        BatchItem::Prs {
            pool_id: B256::repeat_byte(0x0C),
            metrics: PoolMetrics::default(),
            expiry,
            policy_version: "prs-v1".to_string(),
        },
        BatchItem::Pcs {
            subject: B256::repeat_byte(0x0D),
            features: PcsFeatures::default(),
            expiry: 1, // long past
            policy_version: "pcs-v1".to_string(),
        },
    ];

    let results = p.sign_batch(&items);
    assert_eq!(results.len(), 4);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
    assert!(results[3].is_err());

    // positional correspondence: result i belongs to input i
    let first = results[0].as_ref().unwrap();
    assert_eq!(first.request.subject, B256::repeat_byte(0x0A));
    let third = results[2].as_ref().unwrap();
    assert_eq!(third.request.subject, B256::repeat_byte(0x0C));
}

#[test]
fn claiming_someone_elses_signature_fails() {
    let p = pipeline(5);
    let other = signer(6);
    let mut att = p
        .sign_pcs(&PcsFeatures::default(), B256::repeat_byte(0x71), now_s() + 60, "pcs-v1")
        .unwrap();
    att.signer = other.address();
    assert!(!verify_attestation(&att));
}

#[test]
fn hand_rolled_tier_mismatch_fails_verification() {
    // A dishonest operator signs a payload whose label contradicts the
    // score. The signature is valid; verification must still reject it.
    let s = signer(7);
    let subject = B256::repeat_byte(0x81);
    let now = now_s();
    let payload = PcsPayload {
        subject,
        score: 900,
        tier: Tier::Bronze,
        issued_at: now,
        expiry: now + 600,
        policy_version: "pcs-v1".to_string(),
        operator: s.address(),
    };
    let request = AttestationRequest {
        subject,
        attestation_type: *PCS_TYPE_TAG,
        data: encode_pcs(&payload).unwrap(),
        expiry: now + 600,
        ipfs_uri: String::new(),
    };
    let digest = credence::core::codec::request_digest(&request).unwrap();
    let signature = s.sign_digest(digest).unwrap();
    let att = SignedAttestation {
        request,
        signer: s.address(),
        signature,
    };
    assert!(!verify_attestation(&att));
}
