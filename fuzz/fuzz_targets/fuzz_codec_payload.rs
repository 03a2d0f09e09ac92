#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = credence::core::codec::decode_pcs(data);
    let _ = credence::core::codec::decode_prs(data);
});
