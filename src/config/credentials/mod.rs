use super::schema::Config;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any `SEWDLE_RELAY_*` env var that is set and non-empty overwrites the
        /// corresponding config field, so secrets can be injected by the
        /// hosting platform without touching the config file.
        pub fn apply_env_overrides(config: &mut Config) {
            $(
                if let Ok(val) = std::env::var($env) {
                    if !val.is_empty() {
                        config.$($path).+ = val;
                    }
                }
            )*
        }
    };
}

define_credentials! {
    "provider-access-token", "SEWDLE_RELAY_ACCESS_TOKEN"   => provider.access_token;
    "provider-app-secret",   "SEWDLE_RELAY_APP_SECRET"     => provider.app_secret;
    "provider-verify-token", "SEWDLE_RELAY_VERIFY_TOKEN"   => provider.verify_token;
    "storage-service-key",   "SEWDLE_RELAY_STORAGE_KEY"    => storage.service_key;
}
