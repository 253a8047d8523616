//! Fuzz test for cache entry decoding
//!
//! Shared tiers can hold bytes written by other processes or other
//! versions. Decoding them must return an entry, `None`, or a decode
//! error. Anything else (a panic, or a non-decode error) is a bug.
//!
//! Run with: cargo +nightly fuzz run entry_decode_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use tiercache_core::SemanticType;
use tiercache_storage::EntryCodec;
use tiercache_test_utils::fixtures;

fuzz_target!(|data: &[u8]| {
    let marshaller = fixtures::zoo_marshaller();
    for ty in [
        SemanticType::Mapping,
        SemanticType::object("Person"),
        SemanticType::list(SemanticType::Integer),
    ] {
        let codec = EntryCodec::new(marshaller.clone(), ty);
        if let Err(e) = codec.decode(data) {
            assert!(e.is_decode(), "non-decode error from entry bytes: {}", e);
        }
    }
});
