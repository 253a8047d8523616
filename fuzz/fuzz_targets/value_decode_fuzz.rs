//! Fuzz test for the binary value decoder
//!
//! Feeds arbitrary bytes to the marshaller under several declared types to
//! find panics and runaway allocations from forged length prefixes.
//!
//! Run with: cargo +nightly fuzz run value_decode_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use tiercache_core::SemanticType;
use tiercache_test_utils::fixtures;

fuzz_target!(|data: &[u8]| {
    let marshaller = fixtures::zoo_marshaller();
    let group = match marshaller.schemas().group("animal") {
        Ok(group) => group,
        Err(_) => return,
    };

    let types = [
        SemanticType::Integer,
        SemanticType::Text,
        SemanticType::Mapping,
        SemanticType::Timestamp,
        SemanticType::list(SemanticType::Bytes),
        SemanticType::object("Person"),
        SemanticType::list(SemanticType::OneOf(group)),
        SemanticType::Union(vec![SemanticType::Integer, SemanticType::Text]),
    ];

    for ty in &types {
        match marshaller.from_bytes(ty, data) {
            Ok(value) if ty.is_primitive() => {
                assert!(ty.conforms(&value) || value.is_null(), "decoded {} does not conform", ty);
            }
            Ok(_) => {}
            Err(e) => assert!(e.is_decode(), "non-decode error for {}: {}", ty, e),
        }
    }
});
