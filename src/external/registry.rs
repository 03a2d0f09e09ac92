// Copyright (c) 2026 Credence
// Licensed under the Apache License, Version 2.0

//! On-chain attestation registry contract.
//!
//! The registry accepts exactly the canonical request encoding plus the
//! 65-byte recoverable signature over its prefixed-message digest. Field
//! order, padding and the signature scheme are fixed; nothing here may be
//! re-encoded downstream.

#![forbid(unsafe_code)]

use crate::core::codec::{self, CodecError};
use crate::core::types::SignedAttestation;
use thiserror::Error;

/// Registry submission errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Attestation signature is not 65 bytes.
    #[error("malformed signature")]
    MalformedSignature,
    /// Canonical encoding failed.
    #[error("codec")]
    Codec(#[from] CodecError),
    /// The registry rejected the submission.
    #[error("submission rejected")]
    Rejected,
}

/// The exact byte pair a registry submission consists of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrySubmission {
    /// Canonical ABI encoding of the attestation request.
    pub payload: Vec<u8>,
    /// 65-byte recoverable signature (r || s || v).
    pub signature: [u8; 65],
}

/// Build the registry submission for a signed attestation.
pub fn build_submission(att: &SignedAttestation) -> Result<RegistrySubmission, RegistryError> {
    let signature = att
        .signature
        .as_fixed_bytes()
        .ok_or(RegistryError::MalformedSignature)?;
    let payload = codec::encode_request(&att.request)?;
    Ok(RegistrySubmission { payload, signature })
}

/// Sink for registry submissions. Implementations (RPC clients, relayers)
/// live outside the core.
pub trait AttestationRegistry: Send + Sync {
    /// Submit an attestation; the registry verifies the signature over the
    /// payload bytes as-is.
    fn submit(&self, submission: &RegistrySubmission) -> Result<(), RegistryError>;
}
