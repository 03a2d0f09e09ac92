#![no_main]
use alloy_primitives::keccak256;
use credence::core::security::signer::recover_signer;
use credence::core::types::RecoverableSignature;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary signature bytes must be rejected cleanly, never panic.
    let sig = RecoverableSignature(data.to_vec());
    let _ = recover_signer(keccak256(b"fuzz-digest"), &sig);
});
