#![no_main]

use libfuzzer_sys::fuzz_target;

use diagflow_core::event::{EventData, LogLevel};
use diagflow_event_pipeline::FilterParser;

fuzz_target!(|data: &[u8]| {
    let Ok(expression) = std::str::from_utf8(data) else {
        return;
    };

    // 파싱은 에러를 반환할 뿐 패닉하지 않아야 함
    let Ok(node) = FilterParser::parse(expression) else {
        return;
    };

    let event = EventData::new("fuzz", LogLevel::Warning)
        .with_keywords(0xff)
        .with_payload("Message", "fuzz message")
        .with_payload("Count", 42u32)
        .with_payload("Ratio", 0.5f64);

    let _ = node.evaluate(&event);
    let _ = node.semantics_string();
});
