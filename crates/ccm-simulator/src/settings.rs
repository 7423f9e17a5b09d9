//! Simulator configuration
//!
//! The sequencer config comes from a JSON file when one is given on the
//! command line, otherwise from `CCM_*` environment variables (with
//! `.env` loaded first). A few extra keys only make sense here:
//!
//! | Key                     | Values                                  | Default   |
//! |-------------------------|-----------------------------------------|-----------|
//! | `CCM_SIM_SCENARIO`      | `fresh`, `wifi-ready`, `provisioned`, `flaky-connect`, `rejects-connect` | `fresh` |
//! | `CCM_SIM_TIME_SCALE`    | wall-clock seconds per simulated second, `0` to `10` | `0.001` |
//! | `CCM_ON_CONNECT_ERROR`  | `abort`, `continue`, `retry`            | `retry`   |
//! | `CCM_CONNECT_RETRIES`   | retries before `retry` gives up         | `3`       |

use std::path::Path;
use std::time::Duration;

use ccm_core::handler::{AbortOnError, ContinueOnError, RetryThenAbort};
use ccm_core::{CcmConfig, ConnectFailure, ErrorDecision, ErrorHandler};
use embedded_hal_async::delay::DelayNs;
use log::debug;
use thiserror_no_std::Error;

use crate::module::Scenario;

pub const KEY_SCENARIO: &str = "CCM_SIM_SCENARIO";
pub const KEY_TIME_SCALE: &str = "CCM_SIM_TIME_SCALE";
pub const KEY_ON_CONNECT_ERROR: &str = "CCM_ON_CONNECT_ERROR";
pub const KEY_CONNECT_RETRIES: &str = "CCM_CONNECT_RETRIES";

const DEFAULT_TIME_SCALE: f64 = 0.001;
/// Slowest accepted scale; keeps every scaled sleep representable
const MAX_TIME_SCALE: f64 = 10.0;
const DEFAULT_CONNECT_RETRIES: u8 = 3;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("cannot read {path}: {reason}")]
    ReadFile { path: String, reason: String },

    #[error("invalid config file: {0}")]
    Json(String),

    #[error("{0}")]
    Config(ccm_core::config::ConfigError),

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// [`DelayNs`] that sleeps the calling thread for a scaled duration.
///
/// A scale of 0 (or NaN) never sleeps.
#[derive(Debug, Clone, Copy)]
pub struct SimDelay {
    scale: f64,
}

impl SimDelay {
    pub fn new(scale: f64) -> Self {
        let scale = if scale.is_nan() {
            0.0
        } else {
            scale.clamp(0.0, MAX_TIME_SCALE)
        };
        Self { scale }
    }

    pub fn instant() -> Self {
        Self::new(0.0)
    }

    fn sleep(&self, nanos: u64) {
        if self.scale == 0.0 {
            return;
        }
        std::thread::sleep(Duration::from_nanos(nanos).mul_f64(self.scale));
    }
}

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.sleep(u64::from(ns));
    }

    async fn delay_ms(&mut self, ms: u32) {
        if ms >= 10_000 {
            debug!("Simulating a {} s sleep", ms / 1000);
        }
        self.sleep(u64::from(ms) * 1_000_000);
    }
}

// ---------------------------------------------------------------------------
// Connect failure policy
// ---------------------------------------------------------------------------

/// Error handler picked at runtime from `CCM_ON_CONNECT_ERROR`
#[derive(Debug, Clone, Copy)]
pub enum ConnectPolicy {
    Abort(AbortOnError),
    Continue(ContinueOnError),
    Retry(RetryThenAbort),
}

impl ConnectPolicy {
    fn parse(value: &str, retries: u8) -> Option<Self> {
        match value.trim() {
            "abort" => Some(Self::Abort(AbortOnError)),
            "continue" => Some(Self::Continue(ContinueOnError)),
            "retry" => Some(Self::Retry(RetryThenAbort::new(retries))),
            _ => None,
        }
    }
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self::Retry(RetryThenAbort::new(DEFAULT_CONNECT_RETRIES))
    }
}

impl ErrorHandler for ConnectPolicy {
    fn on_connect_failure(&mut self, failure: &ConnectFailure) -> ErrorDecision {
        match self {
            Self::Abort(h) => h.on_connect_failure(failure),
            Self::Continue(h) => h.on_connect_failure(failure),
            Self::Retry(h) => h.on_connect_failure(failure),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Settings {
    pub config: CcmConfig,
    pub scenario: Scenario,
    pub time_scale: f64,
    pub policy: ConnectPolicy,
}

impl Settings {
    /// Load from the process environment and an optional JSON file.
    pub fn load(config_path: Option<&Path>) -> Result<Self, SettingsError> {
        let json = config_path
            .map(|path| {
                std::fs::read_to_string(path).map_err(|e| SettingsError::ReadFile {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Self::from_sources(json.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(json: Option<&str>, mut lookup: F) -> Result<Self, SettingsError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let config = match json {
            Some(text) => serde_json::from_str::<CcmConfig>(text)
                .map_err(|e| SettingsError::Json(e.to_string()))?,
            None => CcmConfig::from_lookup(&mut lookup).map_err(SettingsError::Config)?,
        };

        let scenario = match lookup(KEY_SCENARIO) {
            Some(value) => value.parse().map_err(|_| SettingsError::InvalidValue {
                key: KEY_SCENARIO,
                value,
            })?,
            None => Scenario::default(),
        };

        let time_scale = match lookup(KEY_TIME_SCALE) {
            Some(value) => match value.trim().parse::<f64>() {
                Ok(scale) if (0.0..=MAX_TIME_SCALE).contains(&scale) => scale,
                _ => {
                    return Err(SettingsError::InvalidValue {
                        key: KEY_TIME_SCALE,
                        value,
                    });
                }
            },
            None => DEFAULT_TIME_SCALE,
        };

        let retries = match lookup(KEY_CONNECT_RETRIES) {
            Some(value) => value
                .trim()
                .parse::<u8>()
                .map_err(|_| SettingsError::InvalidValue {
                    key: KEY_CONNECT_RETRIES,
                    value,
                })?,
            None => DEFAULT_CONNECT_RETRIES,
        };

        let policy = match lookup(KEY_ON_CONNECT_ERROR) {
            Some(value) => {
                ConnectPolicy::parse(&value, retries).ok_or(SettingsError::InvalidValue {
                    key: KEY_ON_CONNECT_ERROR,
                    value,
                })?
            }
            None => ConnectPolicy::Retry(RetryThenAbort::new(retries)),
        };

        Ok(Self {
            config,
            scenario,
            time_scale,
            policy,
        })
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay::new(self.time_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccm_core::{CloudFlow, WifiOnboarding};

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl FnMut(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn defaults_without_any_source() {
        let settings = Settings::from_sources(None, env(&[])).unwrap();

        assert_eq!(settings.config, CcmConfig::default());
        assert_eq!(settings.scenario, Scenario::Fresh);
        assert_eq!(settings.time_scale, DEFAULT_TIME_SCALE);
        assert!(matches!(
            settings.policy,
            ConnectPolicy::Retry(RetryThenAbort {
                max_retries: DEFAULT_CONNECT_RETRIES
            })
        ));
    }

    #[test]
    fn simulator_keys_are_read() {
        let settings = Settings::from_sources(
            None,
            env(&[
                ("CCM_FLOW", "aws-direct"),
                (KEY_SCENARIO, "flaky-connect"),
                (KEY_TIME_SCALE, "0"),
                (KEY_ON_CONNECT_ERROR, "retry"),
                (KEY_CONNECT_RETRIES, "1"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.config.flow, CloudFlow::AwsDirect);
        assert_eq!(settings.scenario, Scenario::FlakyConnect);
        assert_eq!(settings.time_scale, 0.0);
        assert!(matches!(
            settings.policy,
            ConnectPolicy::Retry(RetryThenAbort { max_retries: 1 })
        ));
    }

    #[test]
    fn json_file_replaces_ccm_keys() {
        let json = r#"{
            "flow": "aws-direct",
            "onboarding": "app-assisted",
            "modify_ssid_after_connected": true
        }"#;
        // CCM_FLOW is ignored once a file is given
        let settings =
            Settings::from_sources(Some(json), env(&[("CCM_FLOW", "cloud-sync")])).unwrap();

        assert_eq!(settings.config.flow, CloudFlow::AwsDirect);
        assert_eq!(settings.config.onboarding, WifiOnboarding::AppAssisted);
        assert!(settings.config.modify_ssid_after_connected);
    }

    #[test]
    fn bad_values_name_their_key() {
        let err = Settings::from_sources(None, env(&[(KEY_ON_CONNECT_ERROR, "panic")]))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue {
                key: KEY_ON_CONNECT_ERROR,
                ..
            }
        ));

        let err =
            Settings::from_sources(None, env(&[(KEY_TIME_SCALE, "-1")])).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue {
                key: KEY_TIME_SCALE,
                ..
            }
        ));

        assert!(matches!(
            Settings::from_sources(Some("{ not json"), env(&[])),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn time_scale_is_bounded() {
        for value in ["1e300", "inf", "NaN", "10.5"] {
            let err = Settings::from_sources(None, env(&[(KEY_TIME_SCALE, value)])).unwrap_err();
            assert!(
                matches!(err, SettingsError::InvalidValue { key: KEY_TIME_SCALE, .. }),
                "{value}"
            );
        }

        let settings = Settings::from_sources(None, env(&[(KEY_TIME_SCALE, "10")])).unwrap();
        assert_eq!(settings.time_scale, MAX_TIME_SCALE);
    }

    #[test]
    fn delay_clamps_its_scale() {
        assert_eq!(SimDelay::new(1e300).scale, MAX_TIME_SCALE);
        assert_eq!(SimDelay::new(-1.0).scale, 0.0);
        assert_eq!(SimDelay::new(f64::NAN).scale, 0.0);
    }
}
