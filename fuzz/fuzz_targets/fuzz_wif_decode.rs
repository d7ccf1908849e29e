#![no_main]

use libfuzzer_sys::fuzz_target;
use mint_core::wif;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(decoded) = wif::decode(s) {
            // Whatever decodes must encode back to the same string
            let reencoded = wif::encode(decoded.key.expose(), decoded.compressed, decoded.prefix)
                .unwrap();
            assert_eq!(reencoded.as_str(), s);
        }
    }

    // Any 32-byte key encodes, and decodes back to itself
    if data.len() >= 33 {
        let mut key = [0u8; 32];
        key.copy_from_slice(&data[1..33]);
        let compressed = data[0] & 1 == 1;
        let encoded = wif::encode(&key, compressed, data[0]).unwrap();
        let decoded = wif::decode(&encoded).unwrap();
        assert_eq!(decoded.key.expose(), &key);
        assert_eq!(decoded.compressed, compressed);
        assert_eq!(decoded.prefix, data[0]);
    }
});
