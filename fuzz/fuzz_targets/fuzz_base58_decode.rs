#![no_main]

use libfuzzer_sys::fuzz_target;
use mint_core::base58;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must encode within the advertised capacity
    let encoded = base58::encode(data).unwrap();
    assert!(encoded.len() <= base58::encoded_capacity(data.len()));
    assert_eq!(base58::decode(&encoded).unwrap(), data);

    // Arbitrary strings must never panic the decoders
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(decoded) = base58::decode(s) {
            // Canonical strings re-encode to themselves
            let reencoded = base58::encode(&decoded).unwrap();
            assert_eq!(base58::decode(&reencoded).unwrap(), decoded);
        }
        let _ = base58::decode_check(s);
    }
});
