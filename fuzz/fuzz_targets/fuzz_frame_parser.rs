#![no_main]
use libfuzzer_sys::fuzz_target;
use smokewatch_core::frame::{classify_line, Line};

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    match classify_line(line) {
        Line::Data(frame) => {
            assert!(frame.values.all(|v| v.is_none_or(|v| v > 0)));
            assert_eq!(smokewatch_core::parse_frame(line), Some(frame));
        }
        Line::Status(_) | Line::Invalid(_) => {
            assert!(smokewatch_core::parse_frame(line).is_none());
        }
    }
});
