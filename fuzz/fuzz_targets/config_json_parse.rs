//! Fuzz target for configuration file parsing.
//!
//! This fuzzer feeds arbitrary UTF-8 documents to the JSON config loader,
//! checking for panics, crashes, or hangs.

#![no_main]

use autolabel::config::fuzz_parse_config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_parse_config(raw);
});
