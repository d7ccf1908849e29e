#![no_main]

use libfuzzer_sys::fuzz_target;
use mint_core::DerivationPath;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(path) = DerivationPath::parse(text) {
            assert!(path.depth() <= DerivationPath::MAX_DEPTH);

            // Whatever parsed must render to a form that parses back identically
            let rendered = path.to_string();
            assert_eq!(rendered.parse::<DerivationPath>().unwrap(), path);
        }
    }

    let indices: Vec<u32> = data
        .chunks_exact(4)
        .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
        .collect();
    match DerivationPath::new(&indices) {
        Ok(path) => {
            assert_eq!(path.indices(), indices.as_slice());
            assert_eq!(DerivationPath::parse(&path.to_string()).unwrap(), path);
        }
        Err(_) => assert!(indices.len() > DerivationPath::MAX_DEPTH),
    }
});
