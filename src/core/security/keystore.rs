#![forbid(unsafe_code)]
#![deny(missing_docs)]
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

//! Keystore: secp256k1 operator key loading with at-rest encryption.
//!
//! The key file holds either the raw 32-byte secret scalar or, when
//! `CREDENCE_KEY_PASSPHRASE` is set, a sealed container:
//!
//! `MAGIC(8) || VERSION(1) || KDF_ITERS(4, big-endian) || SALT(16) ||
//! NONCE(12) || AES-256-GCM(secret)`
//!
//! The whole header doubles as AEAD associated data, so a container with
//! an altered version or iteration count fails to open. Iterations are
//! read back from the header at open time; the env override only affects
//! newly sealed files. Writes are staged-then-renamed with 0600
//! permissions, and secret buffers are wrapped in [`Zeroizing`].

use crate::core::security::signer::{InMemorySigner, OperatorSigner, SignerBackend, SignerError};
use crate::core::types::RecoverableSignature;
use alloy_primitives::{Address, B256};
use ring::{
    aead::{self, BoundKey, NonceSequence},
    error::Unspecified,
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};
use std::{
    fs,
    io::Write,
    num::NonZeroU32,
    path::{Path, PathBuf},
};
use thiserror::Error;
use zeroize::Zeroizing;

const PASSPHRASE_ENV: &str = "CREDENCE_KEY_PASSPHRASE";
const KDF_ITERS_ENV: &str = "CREDENCE_PBKDF2_ITERS";

const SEAL_MAGIC: &[u8; 8] = b"CREDSEAL";
const SEAL_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 8 + 1 + 4 + SALT_LEN + NONCE_LEN;

const SECRET_LEN: usize = 32;

// PBKDF2-HMAC-SHA256 work factor. 100k is the floor for server-side
// passphrases; the env override is bounded on both ends.
const KDF_ITERS_DEFAULT: u32 = 100_000;
const KDF_ITERS_MIN: u32 = 20_000;
const KDF_ITERS_MAX: u32 = 4_000_000;

/// Keystore errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// File IO failed.
    #[error("io")]
    Io,
    /// Stored bytes are not a valid secret scalar or container.
    #[error("invalid key encoding")]
    InvalidKey,
    /// Encrypted key present but no passphrase in the environment.
    #[error("missing passphrase (set CREDENCE_KEY_PASSPHRASE)")]
    MissingPassphrase,
    /// AEAD/KDF failure.
    #[error("crypto")]
    Crypto,
}

impl From<SignerError> for KeystoreError {
    fn from(_: SignerError) -> Self {
        KeystoreError::InvalidKey
    }
}

fn passphrase_from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSPHRASE_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(Zeroizing::new)
}

/// Passphrase key derivation with a bounded work factor.
struct Kdf {
    iters: NonZeroU32,
}

impl Kdf {
    fn bounded(requested: u32) -> Self {
        let iters = requested.clamp(KDF_ITERS_MIN, KDF_ITERS_MAX);
        Self {
            // the clamp floor keeps this nonzero
            iters: NonZeroU32::new(iters).unwrap_or(NonZeroU32::MIN),
        }
    }

    fn from_env() -> Self {
        let requested = std::env::var(KDF_ITERS_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(KDF_ITERS_DEFAULT);
        Self::bounded(requested)
    }

    fn derive(&self, passphrase: &[u8], salt: &[u8]) -> Zeroizing<[u8; 32]> {
        let mut key = Zeroizing::new([0u8; 32]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iters,
            salt,
            passphrase,
            &mut key[..],
        );
        key
    }
}

/// Yields its nonce exactly once; a second use is an error by design.
struct SingleNonce(Option<aead::Nonce>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<aead::Nonce, Unspecified> {
        self.0.take().ok_or(Unspecified)
    }
}

fn aes_key(key: &[u8; 32], nonce: [u8; NONCE_LEN]) -> Result<(aead::UnboundKey, SingleNonce), KeystoreError> {
    let unbound =
        aead::UnboundKey::new(&aead::AES_256_GCM, key).map_err(|_| KeystoreError::Crypto)?;
    let nonce = SingleNonce(Some(aead::Nonce::assume_unique_for_key(nonce)));
    Ok((unbound, nonce))
}

/// Seal a secret under a passphrase into the versioned container.
fn seal_secret(passphrase: &[u8], secret: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let rng = SystemRandom::new();
    let kdf = Kdf::from_env();

    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt).map_err(|_| KeystoreError::Crypto)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes).map_err(|_| KeystoreError::Crypto)?;

    let mut container = Vec::with_capacity(HEADER_LEN + secret.len() + aead::AES_256_GCM.tag_len());
    container.extend_from_slice(SEAL_MAGIC);
    container.push(SEAL_VERSION);
    container.extend_from_slice(&kdf.iters.get().to_be_bytes());
    container.extend_from_slice(&salt);
    container.extend_from_slice(&nonce_bytes);

    let key = kdf.derive(passphrase, &salt);
    let (unbound, nonce) = aes_key(&key, nonce_bytes)?;
    let mut sealing = aead::SealingKey::new(unbound, nonce);

    let mut body = secret.to_vec();
    sealing
        .seal_in_place_append_tag(aead::Aad::from(&container[..HEADER_LEN]), &mut body)
        .map_err(|_| KeystoreError::Crypto)?;

    container.append(&mut body);
    Ok(container)
}

/// Open a sealed container. The KDF work factor comes from the header,
/// which is authenticated together with the ciphertext.
fn open_secret(passphrase: &[u8], container: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    if container.len() < HEADER_LEN + aead::AES_256_GCM.tag_len() {
        return Err(KeystoreError::InvalidKey);
    }
    let (header, body) = container.split_at(HEADER_LEN);
    if &header[..8] != SEAL_MAGIC || header[8] != SEAL_VERSION {
        return Err(KeystoreError::InvalidKey);
    }
    let iters = u32::from_be_bytes(
        header[9..13].try_into().map_err(|_| KeystoreError::InvalidKey)?,
    );
    let salt = &header[13..13 + SALT_LEN];
    let nonce_bytes: [u8; NONCE_LEN] = header[HEADER_LEN - NONCE_LEN..]
        .try_into()
        .map_err(|_| KeystoreError::InvalidKey)?;

    let key = Kdf::bounded(iters).derive(passphrase, salt);
    let (unbound, nonce) = aes_key(&key, nonce_bytes)?;
    let mut opening = aead::OpeningKey::new(unbound, nonce);

    let mut buf = body.to_vec();
    let plain = opening
        .open_in_place(aead::Aad::from(header), &mut buf)
        .map_err(|_| KeystoreError::Crypto)?;
    Ok(Zeroizing::new(plain.to_vec()))
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

/// Stage the bytes next to the target, tighten permissions, then rename
/// into place so readers never observe a partial key file.
fn write_key_file(path: &Path, bytes: &[u8]) -> Result<(), KeystoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|_| KeystoreError::Io)?;
    }

    let staged = path.with_extension("partial");
    {
        let mut f = fs::File::create(&staged).map_err(|_| KeystoreError::Io)?;
        f.write_all(bytes).map_err(|_| KeystoreError::Io)?;
        let _ = f.sync_all();
    }
    restrict_permissions(&staged);
    fs::rename(&staged, path).map_err(|_| KeystoreError::Io)?;
    restrict_permissions(path);
    Ok(())
}

/// Generate a fresh 32-byte secret that parses as a valid scalar.
pub fn generate_secret() -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    let rng = SystemRandom::new();
    // rejection sampling: all-zero or >= group order draws are retried
    for _ in 0..64 {
        let mut candidate = Zeroizing::new([0u8; SECRET_LEN]);
        rng.fill(&mut candidate[..]).map_err(|_| KeystoreError::Crypto)?;
        if InMemorySigner::from_secret_bytes(&candidate[..]).is_ok() {
            return Ok(Zeroizing::new(candidate.to_vec()));
        }
    }
    Err(KeystoreError::Crypto)
}

fn read_secret(path: &Path, pass: Option<&str>) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    let raw = fs::read(path).map_err(|_| KeystoreError::Io)?;
    if !raw.starts_with(SEAL_MAGIC) {
        // legacy plaintext scalar
        return Ok(Zeroizing::new(raw));
    }
    let pass = pass.ok_or(KeystoreError::MissingPassphrase)?;
    open_secret(pass.as_bytes(), &raw)
}

fn create_secret(path: &Path, pass: Option<&str>) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    let secret = generate_secret()?;
    let on_disk = match pass {
        Some(p) => seal_secret(p.as_bytes(), &secret)?,
        None => secret.to_vec(),
    };
    write_key_file(path, &on_disk)?;
    Ok(secret)
}

/// File-backed secp256k1 backend.
pub struct FileKeyBackend {
    inner: InMemorySigner,
}

impl FileKeyBackend {
    /// Load or create the operator key file.
    ///
    /// If `CREDENCE_KEY_PASSPHRASE` is set, new key files are sealed at
    /// rest; a sealed file without the passphrase is an error.
    pub fn load_or_create(path: &Path) -> Result<Self, KeystoreError> {
        let pass = passphrase_from_env();
        let pass = pass.as_deref().map(String::as_str);
        let secret = if path.exists() {
            read_secret(path, pass)?
        } else {
            create_secret(path, pass)?
        };
        if secret.len() != SECRET_LEN {
            return Err(KeystoreError::InvalidKey);
        }
        let inner = InMemorySigner::from_secret_bytes(&secret)?;
        Ok(Self { inner })
    }
}

impl SignerBackend for FileKeyBackend {
    fn address(&self) -> Address {
        self.inner.address()
    }

    fn sign_prehash(&self, prehash: &B256) -> Result<RecoverableSignature, SignerError> {
        self.inner.sign_prehash(prehash)
    }
}

/// Open the operator signer rooted at `data_dir`: key material from
/// `data_dir/operator.key`, audit trail in `data_dir/audit.log`.
pub fn open_operator_signer(data_dir: &str) -> Result<OperatorSigner, KeystoreError> {
    let mut key_path = PathBuf::from(data_dir);
    key_path.push("operator.key");

    let mut audit_path = PathBuf::from(data_dir);
    audit_path.push("audit.log");

    let backend = FileKeyBackend::load_or_create(&key_path)?;
    Ok(OperatorSigner::with_audit(Box::new(backend), audit_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_create_round_trips_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operator.key");

        let first = FileKeyBackend::load_or_create(&path).unwrap();
        let second = FileKeyBackend::load_or_create(&path).unwrap();
        assert_eq!(first.address(), second.address());
        assert!(path.exists());
    }

    #[test]
    fn short_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operator.key");
        fs::write(&path, [1u8; 16]).unwrap();
        assert!(matches!(
            FileKeyBackend::load_or_create(&path),
            Err(KeystoreError::InvalidKey)
        ));
    }

    #[test]
    fn sealed_container_round_trips() {
        let secret = generate_secret().unwrap();
        let sealed = seal_secret(b"passphrase", &secret).unwrap();
        assert!(sealed.starts_with(SEAL_MAGIC));
        assert_eq!(sealed[8], SEAL_VERSION);

        let opened = open_secret(b"passphrase", &sealed).unwrap();
        assert_eq!(&opened[..], &secret[..]);
        assert!(open_secret(b"wrong", &sealed).is_err());
    }

    #[test]
    fn tampered_header_fails_to_open() {
        let secret = generate_secret().unwrap();
        let mut sealed = seal_secret(b"passphrase", &secret).unwrap();
        // bump the recorded iteration count; the header is authenticated
        sealed[12] ^= 0x01;
        assert!(matches!(
            open_secret(b"passphrase", &sealed),
            Err(KeystoreError::Crypto)
        ));
    }

    #[test]
    fn kdf_work_factor_is_bounded() {
        assert_eq!(Kdf::bounded(0).iters.get(), KDF_ITERS_MIN);
        assert_eq!(Kdf::bounded(u32::MAX).iters.get(), KDF_ITERS_MAX);
        assert_eq!(
            Kdf::bounded(KDF_ITERS_DEFAULT).iters.get(),
            KDF_ITERS_DEFAULT
        );
    }

    #[test]
    fn generated_secrets_are_valid_scalars() {
        for _ in 0..8 {
            let s = generate_secret().unwrap();
            assert_eq!(s.len(), SECRET_LEN);
            assert!(InMemorySigner::from_secret_bytes(&s).is_ok());
        }
    }
}
