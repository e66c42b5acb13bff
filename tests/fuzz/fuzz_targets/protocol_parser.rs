#![no_main]

use libfuzzer_sys::fuzz_target;
use proto::framing::{Frame, LineFramer};

fuzz_target!(|data: &[u8]| {
    // This fuzz target feeds arbitrary byte slices into the line framer that
    // sits ahead of the (excluded) G-code parser. The goal is to ensure that
    // no input - no matter how malformed, how long, or how many immediate
    // controls are interleaved mid-line - can cause a panic.

    let mut framer: LineFramer<255> = LineFramer::new();
    framer.feed(data, |frame| {
        if let Ok(Frame::Line(line)) = frame {
            // Lines handed to callers must never exceed the framer's
            // configured capacity.
            assert!(line.len() <= 255);
        }
    });
});
