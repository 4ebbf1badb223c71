//! Fuzz target for prompt list parsing and validation.
//!
//! This fuzzer feeds arbitrary UTF-8 strings to the comma-separated prompt
//! parser, checking for panics, crashes, or hangs.

#![no_main]

use autolabel::validate::fuzz_parse_prompt_list;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_parse_prompt_list(raw);
});
