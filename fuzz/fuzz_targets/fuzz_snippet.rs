#![no_main]

use arbitrary::Arbitrary;
use docshard::query::SnippetBuilder;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    text: &'a str,
    query: &'a str,
    match_case: bool,
    before: u8,
    after: u8,
}

fuzz_target!(|input: Input| {
    // Snippet windows must always land on char boundaries
    let builder = SnippetBuilder::new(input.before as usize, input.after as usize);
    let _ = builder.build(input.text, input.query, input.match_case);
    let _ = docshard::utils::tokenize(input.text);
});
