#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sewdle_relay::fuzz_api::validate_webhook_signature;

#[derive(Arbitrary, Debug)]
struct Input {
    app_secret: String,
    header: String,
    payload: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let _ = validate_webhook_signature(&input.app_secret, &input.header, &input.payload);
});
