//! Startup configuration for the onboarding sequence
//!
//! Replaces compile-time feature switches with one record that
//! is resolved before the sequencer starts and then passed to it by
//! reference. The same `CCM_*` keys are read by the firmware (at build
//! time) and by the simulator (at run time).

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

pub const KEY_FLOW: &str = "CCM_FLOW";
pub const KEY_WIFI_ONBOARDING: &str = "CCM_WIFI_ONBOARDING";
pub const KEY_MODIFY_SSID: &str = "CCM_MODIFY_SSID";
pub const KEY_SSID: &str = "CCM_SSID";
pub const KEY_PASSPHRASE: &str = "CCM_PASSPHRASE";
pub const KEY_ENDPOINT: &str = "CCM_ENDPOINT";
pub const KEY_PING_HOST: &str = "CCM_PING_HOST";
pub const KEY_WIFI_WAIT_MS: &str = "CCM_WIFI_WAIT_MS";
pub const KEY_CLOUD_WAIT_MS: &str = "CCM_CLOUD_WAIT_MS";
pub const KEY_POLL_INTERVAL_MS: &str = "CCM_POLL_INTERVAL_MS";

pub type Ssid = heapless::String<32>;
pub type Passphrase = heapless::String<64>;
pub type Endpoint = heapless::String<128>;
pub type Host = heapless::String<64>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}")]
    InvalidValue { key: &'static str },
    #[error("value for {key} is too long")]
    TooLong { key: &'static str },
}

/// How the module reaches its final MQTT endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CloudFlow {
    /// Provisioned directly against AWS IoT with a configured endpoint
    AwsDirect,
    /// Connect to the staging endpoint, then let the onboarding cloud redirect
    #[default]
    CloudSync,
}

impl FromStr for CloudFlow {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "aws" | "aws-direct" => Ok(Self::AwsDirect),
            "cloud-sync" | "cirrent" => Ok(Self::CloudSync),
            _ => Err(ConfigError::InvalidValue { key: KEY_FLOW }),
        }
    }
}

/// How Wi-Fi credentials reach the module.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WifiOnboarding {
    /// The operator picks the network from the companion mobile app
    AppAssisted,
    /// SSID and passphrase are pushed with `AT+CONF`
    #[default]
    Credentials,
}

impl FromStr for WifiOnboarding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "app" | "app-assisted" => Ok(Self::AppAssisted),
            "credentials" => Ok(Self::Credentials),
            _ => Err(ConfigError::InvalidValue {
                key: KEY_WIFI_ONBOARDING,
            }),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Credentials {
    pub ssid: Ssid,
    pub passphrase: Passphrase,
    pub endpoint: Endpoint,
}

/// Bounds for a status poll.
///
/// A `timeout_ms` of zero waits forever. The wait can still be
/// cancelled.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct WaitPolicy {
    pub timeout_ms: u32,
    pub poll_interval_ms: u32,
}

impl WaitPolicy {
    pub const UNBOUNDED: u32 = 0;

    pub const fn is_unbounded(&self) -> bool {
        self.timeout_ms == Self::UNBOUNDED
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            poll_interval_ms: 1_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CcmConfig {
    pub flow: CloudFlow,
    pub onboarding: WifiOnboarding,
    /// Drop the current Wi-Fi association before anything else
    pub modify_ssid_after_connected: bool,
    pub credentials: Credentials,
    pub wifi_wait: WaitPolicy,
    pub cloud_wait: WaitPolicy,
    /// Target of the `AT+DIAG PING` Wi-Fi check
    pub ping_host: Host,
}

impl Default for CcmConfig {
    fn default() -> Self {
        let mut ping_host = Host::new();
        // "8.8.8.8" always fits in 64 bytes
        let _ = ping_host.push_str("8.8.8.8");

        Self {
            flow: CloudFlow::default(),
            onboarding: WifiOnboarding::default(),
            modify_ssid_after_connected: false,
            credentials: Credentials::default(),
            wifi_wait: WaitPolicy::default(),
            cloud_wait: WaitPolicy::default(),
            ping_host,
        }
    }
}

impl CcmConfig {
    /// Build a config from `CCM_*` keys, falling back to defaults for
    /// anything the lookup does not know.
    ///
    /// The lookup is a closure so the firmware can feed compile-time
    /// constants and the simulator can feed environment variables.
    pub fn from_lookup<F, S>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&'static str) -> Option<S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(KEY_FLOW) {
            config.flow = value.as_ref().parse()?;
        }
        if let Some(value) = lookup(KEY_WIFI_ONBOARDING) {
            config.onboarding = value.as_ref().parse()?;
        }
        if let Some(value) = lookup(KEY_MODIFY_SSID) {
            config.modify_ssid_after_connected = parse_flag(KEY_MODIFY_SSID, value.as_ref())?;
        }
        if let Some(value) = lookup(KEY_SSID) {
            config.credentials.ssid = bounded(KEY_SSID, value.as_ref())?;
        }
        if let Some(value) = lookup(KEY_PASSPHRASE) {
            config.credentials.passphrase = bounded(KEY_PASSPHRASE, value.as_ref())?;
        }
        if let Some(value) = lookup(KEY_ENDPOINT) {
            config.credentials.endpoint = bounded(KEY_ENDPOINT, value.as_ref())?;
        }
        if let Some(value) = lookup(KEY_PING_HOST) {
            config.ping_host = bounded(KEY_PING_HOST, value.as_ref())?;
        }
        if let Some(value) = lookup(KEY_WIFI_WAIT_MS) {
            config.wifi_wait.timeout_ms = parse_ms(KEY_WIFI_WAIT_MS, value.as_ref())?;
        }
        if let Some(value) = lookup(KEY_CLOUD_WAIT_MS) {
            config.cloud_wait.timeout_ms = parse_ms(KEY_CLOUD_WAIT_MS, value.as_ref())?;
        }
        if let Some(value) = lookup(KEY_POLL_INTERVAL_MS) {
            let interval = parse_ms(KEY_POLL_INTERVAL_MS, value.as_ref())?;
            config.wifi_wait.poll_interval_ms = interval;
            config.cloud_wait.poll_interval_ms = interval;
        }

        Ok(config)
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key }),
    }
}

fn parse_ms(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key })
}

fn bounded<const N: usize>(
    key: &'static str,
    value: &str,
) -> Result<heapless::String<N>, ConfigError> {
    heapless::String::from_str(value).map_err(|_| ConfigError::TooLong { key })
}
