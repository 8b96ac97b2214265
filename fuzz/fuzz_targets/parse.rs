#![no_main]
use libfuzzer_sys::fuzz_target;
use riff_pack::{parse, ParseOptions, TagRegistry};

fuzz_target!(|data: &[u8]| {
    let opts = ParseOptions {
        registry: TagRegistry::cdr(),
        max_inflated_size: 1 << 20,
        ..ParseOptions::default()
    };
    if let Ok(tree) = parse(data, &opts) {
        assert_eq!(tree.serialize(), data);
    }
});
