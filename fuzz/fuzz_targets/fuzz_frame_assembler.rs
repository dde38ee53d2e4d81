#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use presence_gateway::{checksum, FrameAssembler};

#[derive(Debug, Arbitrary)]
struct Input {
    max_buffered: u8,
    chunks: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let cap = (input.max_buffered as usize).max(8);
    let mut assembler = FrameAssembler::with_max_buffered(cap);

    for chunk in &input.chunks {
        for frame in assembler.push(chunk) {
            assert!(checksum::verify(frame.as_bytes()));
            assert!(frame.len() >= 5);
        }
        assert!(assembler.buffered() <= cap);
    }
});
