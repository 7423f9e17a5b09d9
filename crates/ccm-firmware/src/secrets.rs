//! Settings baked in at build time
//!
//! `build.rs` forwards every `CCM_*` key found in the environment or in
//! `.env`. Keys left unset fall back to the [`CcmConfig`] defaults.

use ccm_core::CcmConfig;
use ccm_core::config::{
    ConfigError, KEY_CLOUD_WAIT_MS, KEY_ENDPOINT, KEY_FLOW, KEY_MODIFY_SSID, KEY_PASSPHRASE,
    KEY_PING_HOST, KEY_POLL_INTERVAL_MS, KEY_SSID, KEY_WIFI_ONBOARDING, KEY_WIFI_WAIT_MS,
};

/// `AT+CONNECT` retries before the run is aborted
pub const CONNECT_RETRIES: u8 = match option_env!("CCM_CONNECT_RETRIES") {
    Some(value) => parse_u8(value),
    None => 3,
};

const fn parse_u8(value: &str) -> u8 {
    let bytes = value.as_bytes();
    let mut n: u8 = 0;
    let mut i = 0;
    while i < bytes.len() {
        assert!(bytes[i].is_ascii_digit(), "CCM_CONNECT_RETRIES must be a number");
        n = n * 10 + (bytes[i] - b'0');
        i += 1;
    }
    n
}

fn build_time(key: &str) -> Option<&'static str> {
    match key {
        KEY_FLOW => option_env!("CCM_FLOW"),
        KEY_WIFI_ONBOARDING => option_env!("CCM_WIFI_ONBOARDING"),
        KEY_MODIFY_SSID => option_env!("CCM_MODIFY_SSID"),
        KEY_SSID => option_env!("CCM_SSID"),
        KEY_PASSPHRASE => option_env!("CCM_PASSPHRASE"),
        KEY_ENDPOINT => option_env!("CCM_ENDPOINT"),
        KEY_PING_HOST => option_env!("CCM_PING_HOST"),
        KEY_WIFI_WAIT_MS => option_env!("CCM_WIFI_WAIT_MS"),
        KEY_CLOUD_WAIT_MS => option_env!("CCM_CLOUD_WAIT_MS"),
        KEY_POLL_INTERVAL_MS => option_env!("CCM_POLL_INTERVAL_MS"),
        _ => None,
    }
}

/// The sequencer config this image was built with.
pub fn config() -> Result<CcmConfig, ConfigError> {
    CcmConfig::from_lookup(build_time)
}
