#![warn(clippy::pedantic)]
// Doc/signature lints would require annotating every pub function
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Keep format!("{}", x) over format!("{x}") for complex exprs
#![allow(clippy::uninlined_format_args)]
// Row counts and byte limits cross between i64/u64/usize at the SQLite and HTTP edges
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod messages;
pub mod provider;
pub mod relay;
pub mod storage;
pub mod store;
pub(crate) mod utils;

/// Re-exports for fuzz targets. Not part of the public API.
#[doc(hidden)]
pub mod fuzz_api {
    /// Wrapper around `gateway::validate_webhook_signature` for fuzz targets.
    pub fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
        crate::gateway::validate_webhook_signature(secret, signature, body)
    }

    /// Parse a webhook body with a default provider config.
    pub fn parse_payload(body: &[u8]) -> usize {
        let provider = crate::config::ProviderConfig::default();
        crate::gateway::payload::parse_payload(body, &provider)
            .map(|batch| batch.messages.len() + batch.skipped)
            .unwrap_or(0)
    }
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
