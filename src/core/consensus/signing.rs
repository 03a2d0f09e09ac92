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

//! Signing bytes for task responses.
//!
//! The response preimage is the tight packed encoding
//! `uint256(taskId) || responseBytes`; its keccak digest is signed under
//! the prefixed-message convention shared with attestation issuance.

use crate::core::security::signer::{self, OperatorSigner, SignerError};
use crate::core::types::RecoverableSignature;
use alloy_primitives::{keccak256, Address, B256, U256};

/// Tight packed response preimage: 32-byte big-endian task id followed by
/// the raw response bytes.
pub fn response_preimage(task_id: u64, response: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + response.len());
    out.extend_from_slice(&U256::from(task_id).to_be_bytes::<32>());
    out.extend_from_slice(response);
    out
}

/// Keccak digest of the response preimage.
pub fn response_digest(task_id: u64, response: &[u8]) -> B256 {
    keccak256(response_preimage(task_id, response))
}

/// Sign a task response with the local operator signer.
pub fn sign_response(
    signer: &OperatorSigner,
    task_id: u64,
    response: &[u8],
) -> Result<RecoverableSignature, SignerError> {
    signer.sign_digest(response_digest(task_id, response))
}

/// Verify that a response signature recovers to the claimed operator.
pub fn verify_response(
    task_id: u64,
    response: &[u8],
    signature: &RecoverableSignature,
    expected: Address,
) -> Result<(), SignerError> {
    signer::verify_digest(response_digest(task_id, response), signature, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::security::signer::{InMemorySigner, SignerBackend};

    #[test]
    fn preimage_is_id_then_raw_bytes() {
        let pre = response_preimage(0x0102, b"ok");
        assert_eq!(pre.len(), 34);
        assert!(pre[..30].iter().all(|b| *b == 0));
        assert_eq!(&pre[30..32], &[0x01, 0x02]);
        assert_eq!(&pre[32..], b"ok");
    }

    #[test]
    fn response_signatures_bind_the_task_id() {
        let mut secret = [0u8; 32];
        secret[31] = 3;
        let backend = InMemorySigner::from_secret_bytes(&secret).unwrap();
        let address = backend.address();
        let signer = OperatorSigner::new(Box::new(backend));

        let sig = sign_response(&signer, 7, b"score:640").unwrap();
        assert!(verify_response(7, b"score:640", &sig, address).is_ok());
        // same bytes under a different task id must not verify
        assert!(verify_response(8, b"score:640", &sig, address).is_err());
    }
}
