//! Property tests for the encoders and the entropy health check

use proptest::prelude::*;
use mint_core::{
    base58,
    crypto::DerivationPath,
    entropy::{count_ones, frequency_check},
    wif, Network,
};

fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..96)
}

fn arb_prefix() -> impl Strategy<Value = u8> {
    prop_oneof![
        Just(Network::Mainnet.wif_prefix()),
        Just(Network::Testnet.wif_prefix()),
        any::<u8>(),
    ]
}

fn arb_level() -> impl Strategy<Value = u32> {
    prop_oneof![
        0u32..1_000,
        (0u32..1_000).prop_map(|i| i | DerivationPath::HARDENED),
        any::<u32>(),
    ]
}

fn arb_path() -> impl Strategy<Value = DerivationPath> {
    prop::collection::vec(arb_level(), 0..=DerivationPath::MAX_DEPTH)
        .prop_map(|levels| DerivationPath::new(&levels).unwrap())
}

proptest! {
    // base58 properties

    #[test]
    fn base58_roundtrip(payload in arb_payload()) {
        let encoded = base58::encode(&payload).unwrap();
        let decoded = base58::decode(&encoded).unwrap();
        prop_assert_eq!(payload, decoded);
    }

    #[test]
    fn base58_one_per_leading_zero(
        zeros in 0usize..16,
        first in 1u8..=255,
        tail in prop::collection::vec(any::<u8>(), 0..32),
    ) {
        let mut payload = vec![0u8; zeros];
        payload.push(first);
        payload.extend_from_slice(&tail);

        let encoded = base58::encode(&payload).unwrap();
        let ones = encoded.chars().take_while(|&c| c == '1').count();
        prop_assert_eq!(ones, zeros);
    }

    #[test]
    fn base58_output_within_capacity(payload in arb_payload()) {
        let encoded = base58::encode(&payload).unwrap();
        prop_assert!(encoded.len() <= base58::encoded_capacity(payload.len()));
        prop_assert!(encoded.bytes().all(|b| base58::ALPHABET.contains(&b)));
    }

    #[test]
    fn base58check_roundtrip(payload in arb_payload()) {
        let encoded = base58::encode_check(&payload).unwrap();
        prop_assert_eq!(base58::decode_check(&encoded).unwrap(), payload);
    }

    // wif properties

    #[test]
    fn wif_is_deterministic(key in any::<[u8; 32]>(), compressed in any::<bool>(), prefix in arb_prefix()) {
        let first = wif::encode(&key, compressed, prefix).unwrap();
        let second = wif::encode(&key, compressed, prefix).unwrap();
        prop_assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn wif_changes_with_any_key_byte(
        key in any::<[u8; 32]>(),
        index in 0usize..32,
        delta in 1u8..=255,
        compressed in any::<bool>(),
    ) {
        let mut altered = key;
        altered[index] ^= delta;
        let original = wif::encode(&key, compressed, 0x80).unwrap();
        let changed = wif::encode(&altered, compressed, 0x80).unwrap();
        prop_assert_ne!(original.as_str(), changed.as_str());
    }

    #[test]
    fn wif_changes_with_prefix_and_flag(key in any::<[u8; 32]>(), prefix in any::<u8>(), other in any::<u8>()) {
        prop_assume!(prefix != other);
        let a = wif::encode(&key, true, prefix).unwrap();
        let b = wif::encode(&key, true, other).unwrap();
        let c = wif::encode(&key, false, prefix).unwrap();
        prop_assert_ne!(a.as_str(), b.as_str());
        prop_assert_ne!(a.as_str(), c.as_str());
    }

    #[test]
    fn wif_decode_recovers_key(key in any::<[u8; 32]>(), compressed in any::<bool>(), prefix in arb_prefix()) {
        let encoded = wif::encode(&key, compressed, prefix).unwrap();
        let decoded = wif::decode(&encoded).unwrap();
        prop_assert_eq!(decoded.key.expose(), &key);
        prop_assert_eq!(decoded.compressed, compressed);
        prop_assert_eq!(decoded.prefix, prefix);
    }

    // derivation path properties

    #[test]
    fn derivation_path_renders_parseably(path in arb_path()) {
        let recovered: DerivationPath = path.to_string().parse().unwrap();
        prop_assert_eq!(recovered.indices(), path.indices());
    }

    #[test]
    fn derivation_path_rejects_extra_levels(levels in prop::collection::vec(arb_level(), 6..10)) {
        prop_assert!(DerivationPath::new(&levels).is_err());
    }

    // entropy health properties

    #[test]
    fn frequency_check_matches_bounds(bytes in prop::collection::vec(any::<u8>(), 16..=32)) {
        let ones = count_ones(&bytes);
        let bits = bytes.len() * 8;
        let within = ones * 100 >= 45 * bits && ones * 100 <= 55 * bits;
        prop_assert_eq!(frequency_check(&bytes).is_ok(), within);
    }
}
