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

//! Recoverable ECDSA signing over prefixed-message digests.
//!
//! For a preimage P the signed prehash is
//! `keccak256("\x19Ethereum Signed Message:\n32" || keccak256(P))`; the
//! output is 65 bytes (r || s || v, v = 27 + recovery id). Verification
//! recovers the address and compares it to the expected signer.
//!
//! The private key is held in memory only, is never logged or serialized,
//! and has no read accessor. Signing passes through a rate limiter and a
//! digest-only audit trail.

use crate::core::types::RecoverableSignature;
use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use thiserror::Error;

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

// 32 MiB per generation, three generations kept on rotation.
const AUDIT_MAX_BYTES: u64 = 32 * 1024 * 1024;
const AUDIT_GENERATIONS: usize = 3;

/// Signer errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    /// Signature bytes are malformed or do not recover.
    #[error("bad signature")]
    BadSignature,
    /// Recovered address differs from the expected signer.
    #[error("unknown signer")]
    UnknownSigner,
    /// The 32-byte secret is not a valid scalar.
    #[error("invalid key")]
    InvalidKey,
    /// Signing failed inside the backend.
    #[error("signing")]
    Signing,
    /// Local signing rate limit exceeded.
    #[error("rate limited")]
    RateLimited,
}

/// The digest actually signed for a 32-byte message hash.
pub fn personal_message_hash(digest: B256) -> B256 {
    let mut buf = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 32);
    buf.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    buf.extend_from_slice(digest.as_slice());
    keccak256(buf)
}

/// Derive the 20-byte address of a secp256k1 verifying key.
pub fn address_from_verifying_key(vk: &VerifyingKey) -> Address {
    let point = vk.to_encoded_point(false);
    // keccak over the uncompressed point without the 0x04 prefix byte
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Recover the signing address for a message digest.
///
/// `digest` is the plain keccak of the preimage; the prefixed-message
/// transform is applied here. Accepts v in {0, 1, 27, 28}.
pub fn recover_signer(
    digest: B256,
    sig: &RecoverableSignature,
) -> Result<Address, SignerError> {
    let bytes = sig.as_fixed_bytes().ok_or(SignerError::BadSignature)?;
    let recid_byte = match bytes[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        _ => return Err(SignerError::BadSignature),
    };
    let recid = RecoveryId::from_byte(recid_byte).ok_or(SignerError::BadSignature)?;
    let signature =
        EcdsaSignature::from_slice(&bytes[..64]).map_err(|_| SignerError::BadSignature)?;
    let prehash = personal_message_hash(digest);
    let vk = VerifyingKey::recover_from_prehash(prehash.as_slice(), &signature, recid)
        .map_err(|_| SignerError::BadSignature)?;
    Ok(address_from_verifying_key(&vk))
}

/// Verify that a signature over `digest` recovers to `expected`.
pub fn verify_digest(
    digest: B256,
    sig: &RecoverableSignature,
    expected: Address,
) -> Result<(), SignerError> {
    let recovered = recover_signer(digest, sig)?;
    if recovered != expected {
        return Err(SignerError::UnknownSigner);
    }
    Ok(())
}

/// Key backend seam; file-based today, swappable for an HSM.
///
/// `sign_prehash` receives the exact 32-byte prehash to sign; prefixing is
/// the caller's concern.
pub trait SignerBackend: Send + Sync {
    /// Address derived from the backend's public key.
    fn address(&self) -> Address;
    /// Produce a 65-byte recoverable signature over the prehash.
    fn sign_prehash(&self, prehash: &B256) -> Result<RecoverableSignature, SignerError>;
}

/// In-memory secp256k1 backend.
pub struct InMemorySigner {
    key: SigningKey,
    address: Address,
}

impl InMemorySigner {
    /// Build from a raw 32-byte secret scalar.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, SignerError> {
        let key = SigningKey::from_slice(secret).map_err(|_| SignerError::InvalidKey)?;
        let address = address_from_verifying_key(key.verifying_key());
        Ok(Self { key, address })
    }
}

impl fmt::Debug for InMemorySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never expose key material, even accidentally through logs
        f.debug_struct("InMemorySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl SignerBackend for InMemorySigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_prehash(&self, prehash: &B256) -> Result<RecoverableSignature, SignerError> {
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(prehash.as_slice())
            .map_err(|_| SignerError::Signing)?;
        // Registries reject high-s signatures; flip the recovery bit along
        // with the normalization.
        let (sig, recid) = match sig.normalize_s() {
            Some(normalized) => {
                let flipped =
                    RecoveryId::from_byte(recid.to_byte() ^ 1).ok_or(SignerError::Signing)?;
                (normalized, flipped)
            }
            None => (sig, recid),
        };
        let rs = sig.to_bytes();
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(rs.as_slice());
        out.push(27 + recid.to_byte());
        Ok(RecoverableSignature(out))
    }
}

/// Per-second signing budget; the window resets lazily on the next
/// admission attempt.
#[derive(Debug)]
struct SigningThrottle {
    window: Instant,
    used: u32,
    budget: u32,
}

impl SigningThrottle {
    fn new(budget: u32) -> Self {
        Self {
            window: Instant::now(),
            used: 0,
            budget,
        }
    }

    fn admit(&mut self) -> bool {
        if self.window.elapsed() >= Duration::from_secs(1) {
            self.window = Instant::now();
            self.used = 0;
        }
        match self.used.checked_add(1) {
            Some(n) if n <= self.budget => {
                self.used = n;
                true
            }
            _ => false,
        }
    }
}

/// Operator signer: a backend plus rate limiting and an audit trail.
pub struct OperatorSigner {
    backend: Box<dyn SignerBackend>,
    throttle: Mutex<SigningThrottle>,
    audit_path: Option<PathBuf>,
}

impl OperatorSigner {
    /// Wrap a backend without an audit trail.
    pub fn new(backend: Box<dyn SignerBackend>) -> Self {
        Self {
            backend,
            throttle: Mutex::new(SigningThrottle::new(10_000)),
            audit_path: None,
        }
    }

    /// Wrap a backend and append audit lines to `audit_path`.
    pub fn with_audit(backend: Box<dyn SignerBackend>, audit_path: PathBuf) -> Self {
        Self {
            backend,
            throttle: Mutex::new(SigningThrottle::new(10_000)),
            audit_path: Some(audit_path),
        }
    }

    /// Operator address.
    pub fn address(&self) -> Address {
        self.backend.address()
    }

    /// Sign the keccak digest of `preimage` under the prefixed-message
    /// convention.
    pub fn sign_preimage(&self, preimage: &[u8]) -> Result<RecoverableSignature, SignerError> {
        self.sign_digest(keccak256(preimage))
    }

    /// Sign a precomputed 32-byte message digest under the
    /// prefixed-message convention.
    pub fn sign_digest(&self, digest: B256) -> Result<RecoverableSignature, SignerError> {
        {
            let mut guard = self.throttle.lock().map_err(|_| SignerError::RateLimited)?;
            if !guard.admit() {
                return Err(SignerError::RateLimited);
            }
        }
        if let Some(path) = &self.audit_path {
            let _ = append_audit(path, "sign", digest);
        }
        self.backend.sign_prehash(&personal_message_hash(digest))
    }
}

impl fmt::Debug for OperatorSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorSigner")
            .field("address", &self.backend.address())
            .finish_non_exhaustive()
    }
}

fn rotate_audit(path: &Path) {
    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if size <= AUDIT_MAX_BYTES {
        return;
    }
    let generation = |n: usize| PathBuf::from(format!("{}.{n}", path.display()));
    // the oldest generation drops off; rotation failures are ignored
    let _ = fs::remove_file(generation(AUDIT_GENERATIONS));
    for n in (1..AUDIT_GENERATIONS).rev() {
        let _ = fs::rename(generation(n), generation(n + 1));
    }
    let _ = fs::rename(path, generation(1));
}

fn append_audit(path: &Path, action: &str, digest: B256) -> std::io::Result<()> {
    rotate_audit(path);
    // digests only; the preimage may carry subject identifiers
    let line = format!("{{\"action\":\"{}\",\"digest\":\"{}\"}}\n", action, hex::encode(digest));
    let mut f = fs::OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(line.as_bytes())
}
