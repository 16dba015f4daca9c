#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must fail cleanly, never panic
    let _ = docshard::utils::decode_postings(data);
    let mut cursor = docshard::utils::ByteCursor::new(data);
    while !cursor.is_empty() {
        if cursor.read_str().is_err() {
            break;
        }
    }
});
