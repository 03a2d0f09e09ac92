#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic; re-encoding anything
    // that decoded must reproduce a decodable request.
    if let Ok(req) = credence::core::codec::decode_request(data) {
        let enc = credence::core::codec::encode_request(&req).expect("re-encode");
        let again = credence::core::codec::decode_request(&enc).expect("re-decode");
        assert_eq!(req, again);
    }
});
