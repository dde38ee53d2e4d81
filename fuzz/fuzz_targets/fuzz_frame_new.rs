#![no_main]

use libfuzzer_sys::fuzz_target;
use presence_gateway::Frame;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::new(data.to_vec()) {
        let _ = frame.address();
        let _ = frame.function_code();
        let _ = frame.is_exception();
        assert_eq!(frame.payload().len(), frame.len() - 4);
    }
});
