#![no_main]

use libfuzzer_sys::fuzz_target;
use sewdle_relay::fuzz_api::parse_payload;

fuzz_target!(|data: &[u8]| {
    let _ = parse_payload(data);
});
