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

//! Canonical attestation codec.
//!
//! The signing preimage is the ABI parameter encoding of
//! `(bytes32 subject, bytes32 attestationType, bytes data, uint256 expiry,
//! string ipfsUri)`; typed score payloads are ABI 7-tuples placed into the
//! outer `data` field. This module is the single source of truth for the
//! wire layout — registry verification happens over exactly these bytes.

use crate::core::types::{AttestationRequest, Band, PcsPayload, PrsPayload, Tier};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use std::sync::LazyLock;
use thiserror::Error;

/// Type tag for personal credit score attestations: `keccak256("PCS")`.
pub static PCS_TYPE_TAG: LazyLock<B256> = LazyLock::new(|| keccak256("PCS"));

/// Type tag for pool risk score attestations: `keccak256("PRS")`.
pub static PRS_TYPE_TAG: LazyLock<B256> = LazyLock::new(|| keccak256("PRS"));

/// Hard cap on any single variable-length field.
pub const MAX_FIELD_BYTES: usize = 1 << 20;

/// Codec errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A single field exceeds [`MAX_FIELD_BYTES`].
    #[error("oversize field: {0}")]
    Oversize(&'static str),
    /// A tier/band label is outside the closed enum set.
    #[error("invalid enumerated value")]
    InvalidLabel,
    /// Bytes do not parse under the expected tuple layout.
    #[error("malformed encoding")]
    Decode,
}

/// Payload families selected by the attestation type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    /// Personal credit score.
    Pcs,
    /// Pool risk score.
    Prs,
}

/// Map a type tag to its payload family, if known.
pub fn payload_kind(tag: &B256) -> Option<PayloadKind> {
    if *tag == *PCS_TYPE_TAG {
        Some(PayloadKind::Pcs)
    } else if *tag == *PRS_TYPE_TAG {
        Some(PayloadKind::Prs)
    } else {
        None
    }
}

/// Encode the signing preimage of an attestation request.
pub fn encode_request(req: &AttestationRequest) -> Result<Vec<u8>, CodecError> {
    if req.data.len() > MAX_FIELD_BYTES {
        return Err(CodecError::Oversize("data"));
    }
    if req.ipfs_uri.len() > MAX_FIELD_BYTES {
        return Err(CodecError::Oversize("ipfsUri"));
    }
    Ok((
        req.subject,
        req.attestation_type,
        Bytes::from(req.data.clone()),
        U256::from(req.expiry),
        req.ipfs_uri.clone(),
    )
        .abi_encode_params())
}

/// Parse an attestation request from its canonical encoding.
pub fn decode_request(bytes: &[u8]) -> Result<AttestationRequest, CodecError> {
    let (subject, attestation_type, data, expiry, ipfs_uri) =
        <(B256, B256, Bytes, U256, String)>::abi_decode_params(bytes)
            .map_err(|_| CodecError::Decode)?;
    if data.len() > MAX_FIELD_BYTES {
        return Err(CodecError::Oversize("data"));
    }
    if ipfs_uri.len() > MAX_FIELD_BYTES {
        return Err(CodecError::Oversize("ipfsUri"));
    }
    let expiry = u64::try_from(expiry).map_err(|_| CodecError::Decode)?;
    Ok(AttestationRequest {
        subject,
        attestation_type,
        data: data.to_vec(),
        expiry,
        ipfs_uri,
    })
}

/// Keccak digest of the canonical request encoding (the value that gets the
/// prefixed-message treatment before signing).
pub fn request_digest(req: &AttestationRequest) -> Result<B256, CodecError> {
    Ok(keccak256(encode_request(req)?))
}

/// Encode a personal credit score payload for the request data field.
pub fn encode_pcs(p: &PcsPayload) -> Result<Vec<u8>, CodecError> {
    if p.policy_version.len() > MAX_FIELD_BYTES {
        return Err(CodecError::Oversize("policyVersion"));
    }
    Ok((
        p.subject,
        p.score,
        p.tier.as_label().to_string(),
        p.issued_at,
        p.expiry,
        p.policy_version.clone(),
        p.operator,
    )
        .abi_encode_params())
}

/// Parse a personal credit score payload.
pub fn decode_pcs(bytes: &[u8]) -> Result<PcsPayload, CodecError> {
    let (subject, score, tier, issued_at, expiry, policy_version, operator) =
        <(B256, u32, String, u64, u64, String, Address)>::abi_decode_params(bytes)
            .map_err(|_| CodecError::Decode)?;
    if policy_version.len() > MAX_FIELD_BYTES {
        return Err(CodecError::Oversize("policyVersion"));
    }
    let tier = Tier::from_label(&tier).ok_or(CodecError::InvalidLabel)?;
    Ok(PcsPayload {
        subject,
        score,
        tier,
        issued_at,
        expiry,
        policy_version,
        operator,
    })
}

/// Encode a pool risk score payload for the request data field.
pub fn encode_prs(p: &PrsPayload) -> Result<Vec<u8>, CodecError> {
    if p.policy_version.len() > MAX_FIELD_BYTES {
        return Err(CodecError::Oversize("policyVersion"));
    }
    Ok((
        p.pool_id,
        p.score,
        p.band.as_label().to_string(),
        p.issued_at,
        p.expiry,
        p.policy_version.clone(),
        p.operator,
    )
        .abi_encode_params())
}

/// Parse a pool risk score payload.
pub fn decode_prs(bytes: &[u8]) -> Result<PrsPayload, CodecError> {
    let (pool_id, score, band, issued_at, expiry, policy_version, operator) =
        <(B256, u32, String, u64, u64, String, Address)>::abi_decode_params(bytes)
            .map_err(|_| CodecError::Decode)?;
    if policy_version.len() > MAX_FIELD_BYTES {
        return Err(CodecError::Oversize("policyVersion"));
    }
    let band = Band::from_label(&band).ok_or(CodecError::InvalidLabel)?;
    Ok(PrsPayload {
        pool_id,
        score,
        band,
        issued_at,
        expiry,
        policy_version,
        operator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> AttestationRequest {
        AttestationRequest {
            subject: B256::repeat_byte(0x11),
            attestation_type: *PCS_TYPE_TAG,
            data: vec![0xAA, 0xAB, 0xAC],
            expiry: 1234,
            ipfs_uri: "ipfs://abc".to_string(),
        }
    }

    #[test]
    fn request_word_layout_is_fixed() {
        let enc = encode_request(&sample_request()).unwrap();
        // head: subject | type | data offset | expiry | uri offset
        // tail: data (len + padded) | uri (len + padded)
        assert_eq!(enc.len(), 160 + 64 + 64);
        assert_eq!(&enc[..32], B256::repeat_byte(0x11).as_slice());
        assert_eq!(&enc[32..64], PCS_TYPE_TAG.as_slice());
        assert_eq!(U256::from_be_slice(&enc[64..96]), U256::from(160));
        assert_eq!(U256::from_be_slice(&enc[96..128]), U256::from(1234));
        assert_eq!(U256::from_be_slice(&enc[128..160]), U256::from(224));
        // data tail: length word then left-aligned bytes
        assert_eq!(U256::from_be_slice(&enc[160..192]), U256::from(3));
        assert_eq!(&enc[192..195], &[0xAA, 0xAB, 0xAC]);
        assert!(enc[195..224].iter().all(|b| *b == 0));
        // uri tail
        assert_eq!(U256::from_be_slice(&enc[224..256]), U256::from(10));
        assert_eq!(&enc[256..266], b"ipfs://abc");
    }

    #[test]
    fn request_round_trips() {
        let req = sample_request();
        let enc = encode_request(&req).unwrap();
        assert_eq!(decode_request(&enc).unwrap(), req);
    }

    #[test]
    fn empty_uri_round_trips() {
        let mut req = sample_request();
        req.ipfs_uri = String::new();
        let enc = encode_request(&req).unwrap();
        assert_eq!(decode_request(&enc).unwrap(), req);
    }

    #[test]
    fn oversize_data_is_rejected() {
        let mut req = sample_request();
        req.data = vec![0u8; MAX_FIELD_BYTES + 1];
        assert_eq!(encode_request(&req), Err(CodecError::Oversize("data")));
    }

    #[test]
    fn type_tags_are_distinct() {
        assert_ne!(*PCS_TYPE_TAG, *PRS_TYPE_TAG);
        assert_eq!(payload_kind(&PCS_TYPE_TAG), Some(PayloadKind::Pcs));
        assert_eq!(payload_kind(&PRS_TYPE_TAG), Some(PayloadKind::Prs));
        assert_eq!(payload_kind(&B256::ZERO), None);
    }

    #[test]
    fn unknown_tier_label_is_rejected() {
        // Same 7-tuple layout, but a label outside the closed set.
        let enc = (
            B256::repeat_byte(0x01),
            500u32,
            "Copper".to_string(),
            10u64,
            20u64,
            "v1".to_string(),
            Address::ZERO,
        )
            .abi_encode_params();
        assert_eq!(decode_pcs(&enc), Err(CodecError::InvalidLabel));
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode_request(&[0u8; 7]).is_err());
        assert!(decode_pcs(&[]).is_err());
        assert!(decode_prs(&[0xFF; 31]).is_err());
    }
}
