//! Bakes the `CCM_*` settings into the firmware.
//!
//! Values come from the environment, with `.env` (searched upwards from
//! this crate) filling in anything unset. Each key that has a value is
//! re-exported to rustc so `option_env!` sees it.

const KEYS: &[&str] = &[
    "CCM_FLOW",
    "CCM_WIFI_ONBOARDING",
    "CCM_MODIFY_SSID",
    "CCM_SSID",
    "CCM_PASSPHRASE",
    "CCM_ENDPOINT",
    "CCM_PING_HOST",
    "CCM_WIFI_WAIT_MS",
    "CCM_CLOUD_WAIT_MS",
    "CCM_POLL_INTERVAL_MS",
    "CCM_CONNECT_RETRIES",
];

fn main() {
    match dotenvy::dotenv() {
        Ok(path) => println!("cargo:rerun-if-changed={}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => println!("cargo:warning=ignoring .env: {e}"),
    }

    for key in KEYS {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }

    if std::env::var("TARGET").is_ok_and(|target| target.starts_with("xtensa")) {
        println!("cargo:rustc-link-arg=-Tlinkall.x");
    }
}
