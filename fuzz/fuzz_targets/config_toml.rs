#![no_main]

use libfuzzer_sys::fuzz_target;

use diagflow_core::config::DiagflowConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(config) = DiagflowConfig::parse(content) {
            let _ = config.validate();
        }
    }
});
